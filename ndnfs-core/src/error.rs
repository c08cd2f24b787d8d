//! Error taxonomy for fetching named data.

use crate::name::Name;
use crate::packet::NackReason;
use crate::tlv::NniError;

/// Everything the pipeline can report through its failure stream.
///
/// Variants that carry a [`Name`] refer to a single request; the remaining
/// ones are protocol violations or pipeline-wide conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("reached the maximum number of congestion Nack retries ({max}) for {name}")]
    CongestionRetries { name: Name, max: u32 },

    #[error("reached the maximum number of duplicate Nack retries ({max}) for {name}")]
    DuplicateRetries { name: Name, max: u32 },

    #[error("reached the maximum number of timeout retries ({max}) for {name}")]
    TimeoutRetries { name: Name, max: u32 },

    #[error("nack reason {reason} for {name}")]
    Nack { name: Name, reason: NackReason },

    #[error("application-level nack for {name} with errcode {code}")]
    Application { name: Name, code: u64 },

    #[error("malformed application error code for {name}: {source}")]
    MalformedErrorCode { name: Name, source: NniError },

    #[error("{0} was not expressed by this pipeline")]
    UnknownName(Name),

    #[error("unsupported packet type: {0}")]
    UnsupportedPacket(String),

    #[error("pipeline closed")]
    Closed,
}

impl FetchError {
    /// Name of the request this error belongs to, if any.
    pub fn name(&self) -> Option<&Name> {
        match self {
            FetchError::CongestionRetries { name, .. }
            | FetchError::DuplicateRetries { name, .. }
            | FetchError::TimeoutRetries { name, .. }
            | FetchError::Nack { name, .. }
            | FetchError::Application { name, .. }
            | FetchError::MalformedErrorCode { name, .. }
            | FetchError::UnknownName(name) => Some(name),
            FetchError::UnsupportedPacket(_) | FetchError::Closed => None,
        }
    }

    /// Name of the request this error resolved, if it resolved one.
    /// Violations such as [`FetchError::UnknownName`] name no request and
    /// must not be taken as the outcome of one.
    pub fn request(&self) -> Option<&Name> {
        match self {
            FetchError::UnknownName(_) => None,
            other => other.name(),
        }
    }

    /// True when a retry budget was exhausted.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(
            self,
            FetchError::CongestionRetries { .. }
                | FetchError::DuplicateRetries { .. }
                | FetchError::TimeoutRetries { .. }
        )
    }
}

/// Rejected pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("window capacity must be at least 1")]
    ZeroWindow,
    #[error("segment size must be at least 1 byte")]
    ZeroSegmentSize,
    #[error("sweep interval must be shorter than the interest lifetime")]
    SweepNotShorterThanLifetime,
    #[error("congestion backoff base exceeds its cap")]
    BackoffBaseAboveCap,
    #[error("queue depth must be at least 1")]
    ZeroQueue,
}
