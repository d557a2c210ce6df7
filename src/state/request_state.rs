/// Request label and lifecycle state definitions
///
/// This module defines how a request is routed and every state a request
/// can be in while the crawl runs.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Determines which handler processes a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestLabel {
    /// A listing page linking to many item pages, paged via a "next" control
    Listing,

    /// A single product page, source of one extracted record
    Item,
}

impl RequestLabel {
    /// Converts the label to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Item => "item",
        }
    }

    /// Parses a label from its database string representation
    ///
    /// Returns None if the string doesn't match any known label.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "item" => Some(Self::Item),
            _ => None,
        }
    }
}

impl fmt::Display for RequestLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Represents where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    // ===== Active States =====
    /// Request is waiting in the queue
    Pending,

    /// Request has been handed to a worker
    InFlight,

    // ===== Terminal States =====
    /// Request was processed successfully
    Handled,

    /// Request exhausted its retries
    Failed,
}

impl RequestState {
    /// Returns true if no further processing will happen for this request
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Handled | Self::Failed)
    }

    /// Converts the state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Handled => "handled",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "handled" => Some(Self::Handled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible request states
    pub fn all_states() -> Vec<Self> {
        vec![Self::Pending, Self::InFlight, Self::Handled, Self::Failed]
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
