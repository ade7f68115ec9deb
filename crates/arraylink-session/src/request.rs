//! Typed requests and their outcomes.

use arraylink_types::{BusinessError, ErrorCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};

/// A call the array understands.
///
/// The request body is the serde serialization of the implementing type; the
/// array's success payload is decoded into [`Request::Response`].
pub trait Request: Serialize + Send + Sync {
    /// Operation name the array dispatches on.
    const OPERATION: &'static str;

    type Response: DeserializeOwned + Send;
}

/// A paged listing.
pub trait QueryRequest: Request {
    fn query_params(&self) -> &QueryParams;
}

/// Filter and paging shared by every listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    pub limit: u32,
    pub start: u32,
}

impl QueryParams {
    pub const DEFAULT_LIMIT: u32 = 100;

    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            limit: Self::DEFAULT_LIMIT,
            start: 0,
        }
    }

    /// Adds a `field:value` condition.
    #[must_use]
    pub fn condition(mut self, field: &str, value: impl std::fmt::Display) -> Self {
        self.conditions.push(format!("{field}:{value}"));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    /// Parameters for the page after this one.
    #[must_use]
    pub fn next_page(&self) -> Self {
        let mut next = self.clone();
        next.start = self.start.saturating_add(self.limit);
        next
    }
}

impl Default for QueryParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Response of calls whose payload carries nothing of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack;

impl<'de> Deserialize<'de> for Ack {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Ack)
    }
}

/// Result of a call that did not fail outright.
///
/// `Rejected` is only produced for business errors the caller chose to
/// accept; everything else surfaces as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Rejected(BusinessError),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if the call was rejected with `code`.
    pub fn is_rejected_with(&self, code: ErrorCode) -> bool {
        matches!(self, Self::Rejected(e) if e.is(code))
    }

    pub fn rejection(&self) -> Option<&BusinessError> {
        match self {
            Self::Success(_) => None,
            Self::Rejected(e) => Some(e),
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Rejected(e) => Outcome::Rejected(e),
        }
    }
}
