//! # arraylink-types: Core types for `arraylink`
//!
//! This crate contains shared types used across the `arraylink` crates:
//! - Identity ([`NodeId`], [`ClientId`])
//! - Single-flight scoping ([`OperationKey`])
//! - Remote error reporting ([`ErrorCode`], [`BusinessError`])
//! - Secrets ([`SessionToken`], [`Credentials`])

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Identity
// ============================================================================

/// Identifier of a management node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u64 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Identifier of one client instance talking to one storage array.
///
/// Every node that manages the same array must derive the same id, otherwise
/// their session refreshes are keyed differently and no longer deduplicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives a stable id from the array's management endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// # use arraylink_types::ClientId;
    /// let a = ClientId::for_endpoint("array-01.example.net");
    /// let b = ClientId::for_endpoint("array-01.example.net");
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str().len(), 32);
    /// ```
    pub fn for_endpoint(endpoint: &str) -> Self {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_DNS, endpoint.as_bytes());
        Self(id.simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// OperationKey
// ============================================================================

/// Scope of single-flight deduplication.
///
/// Combines a logical operation name with the id of the resource that owns
/// it. Identical keys collapse into one execution; any difference in either
/// part makes the keys independent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    operation: String,
    owner: String,
}

impl OperationKey {
    pub fn new(operation: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            owner: owner.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.operation, self.owner)
    }
}

// ============================================================================
// Remote errors
// ============================================================================

/// Machine-readable error code returned by the array API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(u32);

impl ErrorCode {
    /// Reserved code the array uses to report an expired or unknown session.
    pub const SESSION_EXPIRED: ErrorCode = ErrorCode(100_401);

    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_session_expired(self) -> bool {
        self == Self::SESSION_EXPIRED
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ErrorCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// A business-level rejection from the array: the request arrived and was
/// understood, but the array refused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessError {
    pub code: ErrorCode,
    pub message: String,
}

impl BusinessError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn session_expired() -> Self {
        Self::new(ErrorCode::SESSION_EXPIRED, "session expired")
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    pub fn is_any(&self, codes: &[ErrorCode]) -> bool {
        codes.contains(&self.code)
    }

    pub fn is_session_expired(&self) -> bool {
        self.code.is_session_expired()
    }
}

impl Display for BusinessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code {}, message: {}", self.code, self.message)
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// Access token issued by the array on login.
///
/// Zeroed on drop; `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for placing it on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Account used to log in to the array.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn operation_key_display() {
        let key = OperationKey::new("refresh-session", "abc");
        assert_eq!(key.to_string(), "refresh-session@abc");
        assert_eq!(key.operation(), "refresh-session");
        assert_eq!(key.owner(), "abc");
    }

    #[test_case("refresh-session", "a", "refresh-session", "a", true; "identical keys")]
    #[test_case("refresh-session", "a", "refresh-session", "b", false; "different owner")]
    #[test_case("refresh-session", "a", "login", "a", false; "different operation")]
    fn operation_key_equality(op1: &str, owner1: &str, op2: &str, owner2: &str, equal: bool) {
        assert_eq!(
            OperationKey::new(op1, owner1) == OperationKey::new(op2, owner2),
            equal
        );
    }

    #[test]
    fn client_id_is_stable_per_endpoint() {
        let a = ClientId::for_endpoint("10.0.0.1");
        let b = ClientId::for_endpoint("10.0.0.1");
        let c = ClientId::for_endpoint("10.0.0.2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.as_str().contains('-'));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let token = SessionToken::new("s3cr3t");
        assert_eq!(format!("{token:?}"), "SessionToken(***)");

        let creds = Credentials::new("admin", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn token_serializes_as_plain_string() {
        let token = SessionToken::new("abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc\"");
    }

    #[test]
    fn business_error_classification() {
        let err = BusinessError::session_expired();
        assert!(err.is_session_expired());
        assert!(err.is(ErrorCode::SESSION_EXPIRED));

        let other = BusinessError::new(ErrorCode::new(200_502), "Black list not exist");
        assert!(!other.is_session_expired());
        assert!(other.is_any(&[ErrorCode::new(1), ErrorCode::new(200_502)]));
        assert_eq!(other.to_string(), "code 200502, message: Black list not exist");
    }

    proptest! {
        #[test]
        fn operation_key_survives_postcard(op in "[a-z-]{1,24}", owner in "[a-f0-9]{1,32}") {
            let key = OperationKey::new(op, owner);
            let bytes = postcard::to_allocvec(&key).unwrap();
            let decoded: OperationKey = postcard::from_bytes(&bytes).unwrap();
            prop_assert_eq!(key, decoded);
        }
    }
}
