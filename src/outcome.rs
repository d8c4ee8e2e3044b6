//! Outcome classification for transaction attempts.
//!
//! Every attempt against the target ends in exactly one [`OutcomeCategory`].
//! Classification distinguishes business-logic rejections (inventory sold out)
//! from infrastructure failures (database connection exhaustion) and from
//! anything unrecognised, using the response status and a substring match on
//! the response body.

use std::fmt;

use crate::errors::TransportErrorKind;

/// Body phrase reported by the target when inventory is exhausted.
pub const SOLD_OUT_PHRASE: &str = "sold out";

/// Body phrases that indicate the target's database ran out of connections.
pub const RESOURCE_EXHAUSTION_PHRASES: [&str; 2] = ["connection refused", "too many clients"];

/// The closed set of outcome categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutcomeCategory {
    /// HTTP 200
    Success,

    /// Non-200 response whose body says the inventory is sold out
    SoldOut,

    /// Non-200 response whose body points at database connection exhaustion
    ResourceExhaustion,

    /// No response could be obtained (refused, timed out, DNS, TLS, body read)
    TransportFailure,

    /// Any other non-200 response
    Other,
}

impl OutcomeCategory {
    /// Number of categories. The set is fixed at compile time.
    pub const COUNT: usize = 5;

    /// All categories in reporting order.
    pub const ALL: [OutcomeCategory; Self::COUNT] = [
        OutcomeCategory::Success,
        OutcomeCategory::SoldOut,
        OutcomeCategory::ResourceExhaustion,
        OutcomeCategory::TransportFailure,
        OutcomeCategory::Other,
    ];

    /// Stable index into per-category storage.
    pub const fn index(self) -> usize {
        match self {
            OutcomeCategory::Success => 0,
            OutcomeCategory::SoldOut => 1,
            OutcomeCategory::ResourceExhaustion => 2,
            OutcomeCategory::TransportFailure => 3,
            OutcomeCategory::Other => 4,
        }
    }

    /// Get the category name used in reports and as the Prometheus label.
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeCategory::Success => "Success",
            OutcomeCategory::SoldOut => "SoldOut",
            OutcomeCategory::ResourceExhaustion => "ResourceExhaustion",
            OutcomeCategory::TransportFailure => "TransportFailure",
            OutcomeCategory::Other => "Other",
        }
    }

    /// Get the public error bucket this category is reported under.
    ///
    /// Transport failures and unrecognised responses share `errors_other`;
    /// successes are not an error bucket.
    pub fn error_bucket(&self) -> Option<&'static str> {
        match self {
            OutcomeCategory::Success => None,
            OutcomeCategory::SoldOut => Some("errors_sold_out"),
            OutcomeCategory::ResourceExhaustion => Some("errors_db_connection"),
            OutcomeCategory::TransportFailure | OutcomeCategory::Other => Some("errors_other"),
        }
    }

    /// Get a human-readable description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            OutcomeCategory::Success => "Transaction accepted",
            OutcomeCategory::SoldOut => "Rejected: inventory sold out",
            OutcomeCategory::ResourceExhaustion => "Rejected: database connections exhausted",
            OutcomeCategory::TransportFailure => "No response (transport failure)",
            OutcomeCategory::Other => "Unrecognised failure",
        }
    }
}

impl fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What came back from one transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResponse {
    /// The target answered with a status line and a body.
    Completed { status: u16, body: String },

    /// No response could be obtained.
    TransportError {
        kind: TransportErrorKind,
        message: String,
    },
}

impl TransactionResponse {
    pub fn completed(status: u16, body: impl Into<String>) -> Self {
        TransactionResponse::Completed {
            status,
            body: body.into(),
        }
    }

    pub fn transport_error(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransactionResponse::TransportError {
            kind,
            message: message.into(),
        }
    }

    /// HTTP status code, if a response was obtained.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransactionResponse::Completed { status, .. } => Some(*status),
            TransactionResponse::TransportError { .. } => None,
        }
    }
}

/// Classify a transaction response.
///
/// Order matters: a missing response wins, then status 200, then the body
/// phrases. Matching is case-sensitive substring containment.
pub fn classify(response: &TransactionResponse) -> OutcomeCategory {
    match response {
        TransactionResponse::TransportError { .. } => OutcomeCategory::TransportFailure,
        TransactionResponse::Completed { status: 200, .. } => OutcomeCategory::Success,
        TransactionResponse::Completed { body, .. } => classify_failure_body(body),
    }
}

/// Classify the body of a non-200 response.
pub fn classify_failure_body(body: &str) -> OutcomeCategory {
    if body.contains(SOLD_OUT_PHRASE) {
        OutcomeCategory::SoldOut
    } else if RESOURCE_EXHAUSTION_PHRASES
        .iter()
        .any(|phrase| body.contains(phrase))
    {
        OutcomeCategory::ResourceExhaustion
    } else {
        OutcomeCategory::Other
    }
}
