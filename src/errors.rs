// ABOUTME: Structured error types for provider fetches, token refresh, and sync orchestration
// ABOUTME: Carries retry classification so callers can distinguish transient faults from terminal ones
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::models::DataFamily;
use thiserror::Error;

/// Result alias for provider and sync operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error taxonomy for everything between the orchestrator and a provider API.
///
/// The taxonomy drives three decisions made elsewhere in the crate:
/// whether an operation is worth retrying ([`ProviderError::is_retryable`]),
/// whether the user has to act before the connection can recover
/// ([`ProviderError::requires_user_action`]), and whether a failure should
/// count against connection health ([`ProviderError::counts_against_health`]).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Access token rejected by the provider. Triggers one refresh-then-retry
    /// cycle before escalating.
    #[error("{provider} rejected the access token: {reason}")]
    TokenRejected {
        /// Provider that rejected the token
        provider: String,
        /// Provider-supplied rejection detail
        reason: String,
    },

    /// The refresh token itself was rejected. Terminal for automatic retry;
    /// the user must re-authenticate the device.
    #[error("{provider} refresh token is no longer valid: {reason}")]
    ReauthRequired {
        /// Provider that rejected the refresh token
        provider: String,
        /// Provider-supplied rejection detail
        reason: String,
    },

    /// Connection has an expired access token and no refresh token on file
    #[error("device {device_id} has no refresh token; re-authentication required")]
    NoRefreshToken {
        /// Device whose connection is missing a refresh token
        device_id: String,
    },

    /// Provider throttled the request. Backs off scheduling for this provider
    /// and does not count toward connection health.
    #[error("{provider} rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Throttling provider
        provider: String,
        /// Seconds the provider asked us to wait
        retry_after_secs: u64,
    },

    /// Network failure or provider 5xx; eligible for retry
    #[error("transient {provider} failure: {message}")]
    Transient {
        /// Provider the request was bound for
        provider: String,
        /// Underlying failure detail
        message: String,
    },

    /// Payload did not match the provider's documented shape. Permanent for
    /// this fetch cycle; logged and skipped, never retried.
    #[error("{provider} returned a malformed {context} payload: {message}")]
    MalformedResponse {
        /// Provider that produced the payload
        provider: String,
        /// What was being parsed (a data family name or "token refresh")
        context: String,
        /// Parse failure detail
        message: String,
    },

    /// A per-family fetch did not finish within the sync fan-out budget
    #[error("{family} fetch timed out after {timeout_secs}s")]
    Timeout {
        /// Data family whose fetch was abandoned
        family: DataFamily,
        /// Budget that elapsed
        timeout_secs: u64,
    },

    /// Device type has no registered adapter. Fatal at registration time,
    /// never surfaced at sync time.
    #[error("unsupported device type: {device_type}")]
    UnsupportedDevice {
        /// The unrecognized device type string
        device_type: String,
    },

    /// Provider configuration is unusable (missing client credentials, bad URL)
    #[error("{provider} configuration error: {details}")]
    Configuration {
        /// Misconfigured provider
        provider: String,
        /// What is wrong with the configuration
        details: String,
    },

    /// Sync requested for a device that is not registered or not active
    #[error("Device not found or inactive: {device_id}")]
    DeviceNotFound {
        /// The unknown or deactivated device id
        device_id: String,
    },

    /// The storage collaborator rejected a persist call
    #[error("storage rejected samples for device {device_id}: {message}")]
    Store {
        /// Device whose samples could not be persisted
        device_id: String,
        /// Storage failure detail
        message: String,
    },
}

impl ProviderError {
    /// Whether a retry of the same operation could plausibly succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::TokenRejected { .. }
        )
    }

    /// Whether recovery requires explicit user action (reconnect flow)
    #[must_use]
    pub const fn requires_user_action(&self) -> bool {
        matches!(self, Self::ReauthRequired { .. } | Self::NoRefreshToken { .. })
    }

    /// Whether this failure should increment a connection's failure counter.
    ///
    /// Rate limiting is provider-side congestion, not a broken connection,
    /// so it throttles scheduling instead of feeding the health monitor.
    #[must_use]
    pub const fn counts_against_health(&self) -> bool {
        !matches!(self, Self::RateLimited { .. })
    }

    /// Build a transient error from a reqwest failure
    pub fn transient(provider: &str, err: &reqwest::Error) -> Self {
        Self::Transient {
            provider: provider.to_owned(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_timeout_are_retryable() {
        let err = ProviderError::Transient {
            provider: "fitbit".to_owned(),
            message: "connection reset".to_owned(),
        };
        assert!(err.is_retryable());

        let err = ProviderError::Timeout {
            family: DataFamily::Sleep,
            timeout_secs: 30,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn reauth_required_is_terminal_and_user_facing() {
        let err = ProviderError::ReauthRequired {
            provider: "whoop".to_owned(),
            reason: "invalid_grant".to_owned(),
        };
        assert!(!err.is_retryable());
        assert!(err.requires_user_action());
    }

    #[test]
    fn rate_limiting_does_not_count_against_health() {
        let err = ProviderError::RateLimited {
            provider: "fitbit".to_owned(),
            retry_after_secs: 60,
        };
        assert!(!err.counts_against_health());
        assert!(err.is_retryable());

        let err = ProviderError::Transient {
            provider: "fitbit".to_owned(),
            message: "502".to_owned(),
        };
        assert!(err.counts_against_health());
    }

    #[test]
    fn device_not_found_message_is_caller_visible() {
        let err = ProviderError::DeviceNotFound {
            device_id: "dev-1".to_owned(),
        };
        assert!(err.to_string().contains("Device not found or inactive"));
    }
}
