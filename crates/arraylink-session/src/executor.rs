//! Remote calls that survive session expiry.

use std::sync::Arc;

use arraylink_types::{BusinessError, ErrorCode, SessionToken};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::request::{Outcome, QueryRequest, Request};
use crate::session::SessionManager;
use crate::transport::{Envelope, Reply};
use crate::{ClientError, Result};

/// Sends requests under the current session and classifies the replies.
///
/// A session-expired reply triggers one coordinated refresh and exactly one
/// retry. Business errors are then either handed back as
/// [`Outcome::Rejected`] or raised as [`ClientError::Remote`], depending on
/// which entry point was used. Transport failures are never retried here.
#[derive(Clone)]
pub struct ResilientExecutor {
    session: Arc<SessionManager>,
}

impl ResilientExecutor {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Sends `request`, handing every business error back to the caller.
    pub async fn call<R: Request>(&self, request: &R) -> Result<Outcome<R::Response>> {
        self.call_tolerating(request, |_| true).await
    }

    /// Sends `request`, raising on any business error.
    pub async fn call_strict<R: Request>(&self, request: &R) -> Result<R::Response> {
        match self.call_tolerating(request, |_| false).await? {
            Outcome::Success(response) => Ok(response),
            Outcome::Rejected(e) => Err(ClientError::remote(R::OPERATION, e)),
        }
    }

    /// Sends `request`; errors with one of `codes` are returned as
    /// [`Outcome::Rejected`], any other business error is raised.
    pub async fn call_ignoring<R: Request>(
        &self,
        request: &R,
        codes: &[ErrorCode],
    ) -> Result<Outcome<R::Response>> {
        self.call_tolerating(request, |e| e.is_any(codes)).await
    }

    /// Sends `request`; errors accepted by `tolerate` are returned as
    /// [`Outcome::Rejected`], any other business error is raised.
    #[instrument(skip_all, fields(operation = R::OPERATION))]
    pub async fn call_tolerating<R, P>(&self, request: &R, tolerate: P) -> Result<Outcome<R::Response>>
    where
        R: Request,
        P: Fn(&BusinessError) -> bool + Send,
    {
        let params = serde_json::to_value(request).map_err(|e| ClientError::Encode {
            operation: R::OPERATION.to_string(),
            reason: e.to_string(),
        })?;

        match self.send_with_retry(R::OPERATION, params).await? {
            Reply::Success(payload) => {
                let response = serde_json::from_value(payload).map_err(|e| ClientError::Decode {
                    operation: R::OPERATION.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Outcome::Success(response))
            }
            Reply::Rejected(e) if tolerate(&e) => {
                debug!(code = %e.code, "tolerated rejection");
                Ok(Outcome::Rejected(e))
            }
            Reply::Rejected(e) => Err(ClientError::remote(R::OPERATION, e)),
        }
    }

    /// Runs a listing, handing every business error back to the caller.
    pub async fn query<R: QueryRequest>(&self, request: &R) -> Result<Outcome<R::Response>> {
        let params = request.query_params();
        debug!(limit = params.limit, start = params.start, "query");
        self.call(request).await
    }

    /// Runs a listing, raising on any business error.
    pub async fn query_strict<R: QueryRequest>(&self, request: &R) -> Result<R::Response> {
        let params = request.query_params();
        debug!(limit = params.limit, start = params.start, "query");
        self.call_strict(request).await
    }

    async fn send_with_retry(&self, operation: &'static str, params: Value) -> Result<Reply> {
        let token = self.session.ensure_valid_session().await?;
        let reply = self.send(operation, params.clone(), token.clone()).await?;

        if !reply.is_session_expired() {
            return Ok(reply);
        }

        warn!("session expired; refreshing and retrying once");
        self.session.mark_expired(&token);
        let token = self.session.ensure_valid_session().await?;

        match self.send(operation, params, token).await? {
            Reply::Rejected(e) if e.is_session_expired() => {
                warn!("session expired again after refresh");
                Err(ClientError::remote(operation, e))
            }
            reply => Ok(reply),
        }
    }

    async fn send(&self, operation: &'static str, params: Value, token: SessionToken) -> Result<Reply> {
        let envelope = Envelope::new(operation, params).with_session(token);
        Ok(self.session.transport().send(envelope).await?)
    }
}
