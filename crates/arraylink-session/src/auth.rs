//! Requests the session manager itself issues.

use arraylink_types::{Credentials, SessionToken};
use serde::{Deserialize, Serialize};

use crate::request::{Ack, Request};

/// Exchanges credentials for a session token.
#[derive(Serialize)]
pub struct Login<'a> {
    pub name: &'a str,
    pub password: &'a str,
}

impl<'a> Login<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self {
            name: credentials.username(),
            password: credentials.password(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginReply {
    pub access_token: SessionToken,
}

impl Request for Login<'_> {
    const OPERATION: &'static str = "login";
    type Response = LoginReply;
}

/// Cheap authenticated read used to check whether a session is still alive.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Probe;

impl Request for Probe {
    const OPERATION: &'static str = "query-cluster";
    type Response = Ack;
}
