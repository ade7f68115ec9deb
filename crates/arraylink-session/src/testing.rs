//! Scripted in-memory array for tests.
//!
//! [`FakeArray`] implements [`Transport`] with the session behavior of a real
//! array: `login` issues `token-1`, `token-2`, ...; every other operation is
//! rejected with the session-expired code unless it carries a live token.
//! Past the session check, replies come from per-operation scripts, then
//! routes, then per-operation defaults, then `null`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arraylink_types::BusinessError;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::auth::Login;
use crate::request::Request;
use crate::transport::{Envelope, Reply, Transport, TransportError};

/// One request the fake received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: String,
    pub session: Option<String>,
    pub params: Value,
}

type Route = Arc<dyn Fn(&Value) -> Reply + Send + Sync>;

#[derive(Default)]
struct State {
    issued: u64,
    logins: usize,
    live: HashSet<String>,
    login_rejection: Option<BusinessError>,
    scripts: HashMap<String, VecDeque<Result<Reply, TransportError>>>,
    routes: HashMap<String, Route>,
    defaults: HashMap<String, Value>,
    calls: Vec<RecordedCall>,
}

#[derive(Default)]
pub struct FakeArray {
    login_delay: Duration,
    state: Mutex<State>,
}

impl FakeArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every login take `delay`, widening the window for overlap.
    #[must_use]
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = delay;
        self
    }

    /// Rejects every following login with `error`.
    pub fn reject_logins(&self, error: BusinessError) {
        self.lock().login_rejection = Some(error);
    }

    pub fn accept_logins(&self) {
        self.lock().login_rejection = None;
    }

    /// Invalidates every token issued so far.
    pub fn expire_sessions(&self) {
        self.lock().live.clear();
    }

    /// Queues `reply` for the next authenticated call of `operation`.
    pub fn script(&self, operation: &str, reply: Reply) {
        self.push(operation, Ok(reply));
    }

    /// Queues a rejection for the next authenticated call of `operation`.
    pub fn reject_next(&self, operation: &str, error: BusinessError) {
        self.push(operation, Ok(Reply::Rejected(error)));
    }

    /// Fails the next authenticated call of `operation` without a reply.
    pub fn fail_next(&self, operation: &str, cause: &str) {
        self.push(operation, Err(TransportError::new(cause)));
    }

    /// Answers every unscripted call of `operation` with `payload`.
    pub fn respond(&self, operation: &str, payload: Value) {
        self.lock().defaults.insert(operation.to_string(), payload);
    }

    /// Answers every unscripted call of `operation` by running `route` on
    /// the request parameters.
    pub fn route(
        &self,
        operation: &str,
        route: impl Fn(&Value) -> Reply + Send + Sync + 'static,
    ) {
        self.lock()
            .routes
            .insert(operation.to_string(), Arc::new(route));
    }

    /// Number of login attempts, successful or not.
    pub fn logins(&self) -> usize {
        self.lock().logins
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    fn push(&self, operation: &str, reply: Result<Reply, TransportError>) {
        self.lock()
            .scripts
            .entry(operation.to_string())
            .or_default()
            .push_back(reply);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn login(&self) -> Reply {
        let mut state = self.lock();
        state.logins += 1;

        if let Some(error) = &state.login_rejection {
            return Reply::Rejected(error.clone());
        }

        state.issued += 1;
        let token = format!("token-{}", state.issued);
        state.live.insert(token.clone());
        Reply::Success(json!({ "access_token": token }))
    }

    fn serve(&self, envelope: &Envelope) -> Result<Reply, TransportError> {
        let mut state = self.lock();

        let authenticated = envelope
            .session
            .as_ref()
            .is_some_and(|token| state.live.contains(token.expose()));
        if !authenticated {
            return Ok(Reply::Rejected(BusinessError::session_expired()));
        }

        if let Some(reply) = state
            .scripts
            .get_mut(envelope.operation)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }

        if let Some(route) = state.routes.get(envelope.operation).cloned() {
            drop(state);
            return Ok(route(&envelope.params));
        }

        Ok(Reply::Success(
            state
                .defaults
                .get(envelope.operation)
                .cloned()
                .unwrap_or(Value::Null),
        ))
    }
}

#[async_trait]
impl Transport for FakeArray {
    async fn send(&self, envelope: Envelope) -> Result<Reply, TransportError> {
        self.lock().calls.push(RecordedCall {
            operation: envelope.operation.to_string(),
            session: envelope.session.as_ref().map(|t| t.expose().to_string()),
            params: envelope.params.clone(),
        });

        if envelope.operation == Login::OPERATION {
            if !self.login_delay.is_zero() {
                tokio::time::sleep(self.login_delay).await;
            }
            return Ok(self.login());
        }

        self.serve(&envelope)
    }
}
