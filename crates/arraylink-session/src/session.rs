//! Session lifecycle.
//!
//! A [`SessionManager`] owns the access token of one client instance. The
//! token moves through three states:
//!
//! ```text
//!            login                 expiry reported
//!   Unset ─────────────▶ Valid ─────────────────────▶ Expired
//!                         ▲  │ probe ok                  │
//!                         │  └──────┘                    │
//!                         └──────────── re-login ────────┘
//! ```
//!
//! Every refresh runs through the single-flight coordinator, keyed on the
//! client id, so any number of concurrent expiry detections (on this node or
//! on other nodes sharing the cluster channel) cost one login.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use arraylink_flight::SingleFlight;
use arraylink_types::{ClientId, Credentials, OperationKey, SessionToken};
use tracing::{debug, info, instrument, warn};

use crate::auth::{Login, LoginReply, Probe};
use crate::request::Request;
use crate::transport::{Envelope, Reply, Transport};
use crate::{ClientError, Result};

/// Operation name refresh flights are keyed on.
pub const REFRESH_OPERATION: &str = "refresh-session";

/// Default bound a caller waits on somebody else's refresh.
pub const DEFAULT_REFRESH_WAIT: Duration = Duration::from_secs(30);

/// Coordinator shared by every session manager whose refreshes must collapse.
pub type RefreshFlights = SingleFlight<SessionToken, ClientError>;

/// Where the session of a client instance stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No token has been obtained yet.
    Unset,
    /// The token was issued or last probed successfully.
    Valid(SessionToken),
    /// The array reported this token expired.
    Expired(SessionToken),
}

/// Owns and refreshes the session of one client instance.
pub struct SessionManager {
    client: ClientId,
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    flights: Arc<RefreshFlights>,
    state: RwLock<SessionState>,
    refresh_wait: Duration,
}

impl SessionManager {
    pub fn new(
        client: ClientId,
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        flights: Arc<RefreshFlights>,
    ) -> Self {
        Self {
            client,
            credentials,
            transport,
            flights,
            state: RwLock::new(SessionState::Unset),
            refresh_wait: DEFAULT_REFRESH_WAIT,
        }
    }

    /// Sets how long a caller waits on a refresh already in flight.
    #[must_use]
    pub fn with_refresh_wait(mut self, wait: Duration) -> Self {
        self.refresh_wait = wait;
        self
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Key every refresh of this client is deduplicated on.
    pub fn key(&self) -> OperationKey {
        OperationKey::new(REFRESH_OPERATION, self.client.as_str())
    }

    pub fn state(&self) -> SessionState {
        self.read().clone()
    }

    /// Returns the token if the session is believed valid.
    pub fn current_token(&self) -> Option<SessionToken> {
        match &*self.read() {
            SessionState::Valid(token) => Some(token.clone()),
            SessionState::Unset | SessionState::Expired(_) => None,
        }
    }

    /// Returns a token believed valid, refreshing first if there is none.
    ///
    /// Costs no round trip while the session is valid.
    pub async fn ensure_valid_session(&self) -> Result<SessionToken> {
        if let Some(token) = self.current_token() {
            return Ok(token);
        }
        self.refresh().await
    }

    /// Refreshes the session, joining a refresh already in flight.
    ///
    /// A token that is held but not known to be expired is probed first and
    /// kept if the array still accepts it.
    #[instrument(skip_all, fields(client = %self.client))]
    pub async fn refresh(&self) -> Result<SessionToken> {
        let key = self.key();
        let settled = AtomicBool::new(false);

        let result = self
            .flights
            .execute_settled(
                &key,
                self.refresh_wait,
                || self.refresh_in_flight(),
                |result| {
                    settled.store(true, Ordering::Release);
                    if let Ok(token) = result {
                        *self.write() = SessionState::Valid(token.clone());
                    }
                },
            )
            .await;

        // Waiters did not run the settle step; adopt the executor's token.
        if let Ok(token) = &result {
            if !settled.load(Ordering::Acquire) {
                self.adopt(token);
            }
        }

        result
    }

    /// Records that the array rejected `stale` as expired.
    ///
    /// Only acts if `stale` is still the current token, so a late report
    /// about a token that was already replaced is ignored. Returns true if
    /// the state changed.
    pub fn mark_expired(&self, stale: &SessionToken) -> bool {
        let mut state = self.write();
        match &*state {
            SessionState::Valid(current) if current == stale => {
                *state = SessionState::Expired(stale.clone());
                debug!(client = %self.client, "session marked expired");
                true
            }
            _ => false,
        }
    }

    async fn refresh_in_flight(&self) -> Result<SessionToken> {
        let held = self.state();
        match held {
            SessionState::Valid(token) => {
                if self.probe(&token).await {
                    debug!("held session still valid");
                    Ok(token)
                } else {
                    info!("held session expired; logging in");
                    self.login().await
                }
            }
            SessionState::Expired(_) | SessionState::Unset => self.login().await,
        }
    }

    /// Returns false only if the array explicitly reports the token expired.
    async fn probe(&self, token: &SessionToken) -> bool {
        let envelope = Envelope::new(Probe::OPERATION, serde_json::Value::Null)
            .with_session(token.clone());

        match self.transport.send(envelope).await {
            Ok(reply) => !reply.is_session_expired(),
            Err(e) => {
                warn!(error = %e, "session probe failed; keeping held token");
                true
            }
        }
    }

    async fn login(&self) -> Result<SessionToken> {
        let params = serde_json::to_value(Login::new(&self.credentials)).map_err(|e| {
            ClientError::Encode {
                operation: Login::OPERATION.to_string(),
                reason: e.to_string(),
            }
        })?;

        let reply = self
            .transport
            .send(Envelope::new(Login::OPERATION, params))
            .await
            .inspect_err(|e| warn!(error = %e, "login could not reach the array"))?;

        match reply {
            Reply::Success(payload) => {
                let reply: LoginReply = serde_json::from_value(payload)
                    .map_err(|e| ClientError::Decode {
                        operation: Login::OPERATION.to_string(),
                        reason: e.to_string(),
                    })?;
                info!(user = %self.credentials.username(), "logged in");
                Ok(reply.access_token)
            }
            Reply::Rejected(e) => {
                warn!(user = %self.credentials.username(), code = %e.code, "login rejected");
                Err(ClientError::Authentication {
                    username: self.credentials.username().to_string(),
                    code: e.code,
                    message: e.message,
                })
            }
        }
    }

    fn adopt(&self, token: &SessionToken) {
        let mut state = self.write();
        match &*state {
            SessionState::Valid(_) => {}
            SessionState::Expired(expired) if expired == token => {}
            SessionState::Expired(_) | SessionState::Unset => {
                *state = SessionState::Valid(token.clone());
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
