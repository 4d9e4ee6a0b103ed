//! Error types for the bid-aggregation service.
//!
//! This module defines the central `Error` enum, which captures every
//! recoverable and reportable failure inside the relay. Failures are scoped to
//! the single request or vendor call they belong to; none of them abort the
//! process. `From<Error>` for `tonic::Status` lets handlers surface them to
//! clients with an appropriate gRPC code.
//!
//! ## Error Cases
//! - `VendorUnavailable`: The vendor could not be reached or did not answer
//!   before the deadline.
//! - `VendorStatus`: The vendor answered with a non-OK gRPC status.
//! - `InvalidEndpoint`: A registry line is not a usable vendor address.
//! - `Registry`: The vendor registry could not be read.
//! - `UnexpectedCompletion`: A completion event arrived that does not fit the
//!   call's current lifecycle state.
//! - `ChannelError`: An internal communication failure between tasks or
//!   threads.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the bid-aggregation service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Connecting to, or calling, the vendor failed at the transport level.
    #[error("Vendor {endpoint} unavailable: {reason}")]
    VendorUnavailable { endpoint: String, reason: String },

    /// The vendor answered, but with an error status.
    #[error("Vendor {endpoint} returned {code:?}: {message}")]
    VendorStatus {
        endpoint: String,
        code: Code,
        message: String,
    },

    /// The endpoint string cannot be turned into a URI.
    #[error("Invalid vendor endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The vendor registry file is missing or unreadable.
    #[error("Vendor registry {path} unreadable: {reason}")]
    Registry { path: String, reason: String },

    /// A completion was delivered to a call that was not waiting for it.
    #[error("Unexpected {completion} completion for call {tag} in state {state}")]
    UnexpectedCompletion {
        tag: u64,
        completion: &'static str,
        state: &'static str,
    },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Returns `true` for failures that belong to a single vendor and should
    /// only drop that vendor's bid.
    pub const fn is_vendor_failure(&self) -> bool {
        matches!(
            self,
            Self::VendorUnavailable { .. } | Self::VendorStatus { .. } | Self::InvalidEndpoint { .. }
        )
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::VendorUnavailable { endpoint, reason } => {
                Status::unavailable(format!("Vendor {endpoint} unavailable: {reason}"))
            }
            Error::VendorStatus {
                endpoint,
                code,
                message,
            } => Status::internal(format!("Vendor {endpoint} returned {code:?}: {message}")),
            Error::InvalidEndpoint { endpoint, reason } => {
                Status::invalid_argument(format!("Invalid vendor endpoint {endpoint:?}: {reason}"))
            }
            Error::Registry { path, reason } => {
                Status::failed_precondition(format!("Vendor registry {path} unreadable: {reason}"))
            }
            Error::UnexpectedCompletion { .. } => Status::internal(err.to_string()),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_failures_are_classified() {
        let unavailable = Error::VendorUnavailable {
            endpoint: "vendorA:9001".into(),
            reason: "connection refused".into(),
        };
        let rejected = Error::VendorStatus {
            endpoint: "vendorB:9002".into(),
            code: Code::NotFound,
            message: "no such product".into(),
        };
        assert!(unavailable.is_vendor_failure());
        assert!(rejected.is_vendor_failure());
        assert!(!Error::ServiceShutdown.is_vendor_failure());
        assert!(
            !Error::Registry {
                path: "vendors.txt".into(),
                reason: "missing".into()
            }
            .is_vendor_failure()
        );
    }

    #[test]
    fn status_codes() {
        let status: Status = Error::ServiceShutdown.into();
        assert_eq!(status.code(), Code::Unavailable);

        let status: Status = Error::Registry {
            path: "vendors.txt".into(),
            reason: "No such file or directory".into(),
        }
        .into();
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert!(status.message().contains("vendors.txt"));

        let status: Status = Error::UnexpectedCompletion {
            tag: 7,
            completion: "write",
            state: "process",
        }
        .into();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("call 7"));
    }
}
