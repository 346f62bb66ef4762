// ABOUTME: Core adapter trait and shared request/response types for wearable providers
// ABOUTME: Defines fetch/transform/refresh contract every brand adapter implements
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::errors::{ProviderError, ProviderResult};
use crate::models::{CanonicalSample, DataFamily, DeviceConnection, DeviceType};
use crate::providers::http;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Static rate-limit budget an adapter declares for its provider.
///
/// Enforcement happens in the orchestrator's token bucket, shared across all
/// connections of the provider; the adapter only declares the numbers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBudget {
    /// Requests allowed per period
    pub requests: u32,
    /// Budget period
    pub per: Duration,
}

impl RateLimitBudget {
    /// Budget of `requests` per hour
    #[must_use]
    pub const fn per_hour(requests: u32) -> Self {
        Self {
            requests,
            per: Duration::from_secs(3_600),
        }
    }

    /// Budget of `requests` per minute
    #[must_use]
    pub const fn per_minute(requests: u32) -> Self {
        Self {
            requests,
            per: Duration::from_secs(60),
        }
    }
}

/// How a provider expects per-request authentication
#[derive(Debug, Clone)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>` (OAuth2 providers)
    Bearer,
    /// Access token sent in a provider-specific header
    ApiKeyHeader {
        /// Header name carrying the token
        header: String,
    },
}

/// Static configuration for one provider adapter
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider name, matching [`DeviceType::as_str`]
    pub name: String,
    /// OAuth token endpoint used for refresh exchanges
    pub token_url: String,
    /// Base URL for data API calls
    pub api_base_url: String,
    /// Optional token revocation endpoint
    pub revoke_url: Option<String>,
    /// Cheapest authenticated path, used by the liveness probe
    pub probe_path: String,
    /// OAuth client id (absent until configured via environment)
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Per-request authentication scheme
    pub auth: AuthScheme,
    /// Declared rate-limit budget
    pub rate_limit: RateLimitBudget,
}

impl ProviderConfig {
    /// Join the API base URL with an endpoint path
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Tokens produced by a successful refresh exchange
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    /// New access token
    pub access_token: String,
    /// Rotated refresh token, when the provider issued one
    pub refresh_token: Option<String>,
    /// New expiry
    pub expires_at: DateTime<Utc>,
}

/// Time window a fetch covers, from the last sync up to now
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    /// Window start (exclusive of already-synced data)
    pub since: DateTime<Utc>,
    /// Window end
    pub until: DateTime<Utc>,
}

impl FetchWindow {
    /// Window start as a calendar date
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.since.date_naive()
    }

    /// Window end as a calendar date
    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.until.date_naive()
    }

    /// Window start in RFC 3339 with millisecond precision
    #[must_use]
    pub fn since_rfc3339(&self) -> String {
        self.since.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }

    /// Window end in RFC 3339 with millisecond precision
    #[must_use]
    pub fn until_rfc3339(&self) -> String {
        self.until.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

/// Parse a provider timestamp leniently: RFC 3339 first, then naive datetime
/// (with or without fractional seconds) assumed UTC.
#[must_use]
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|naive| naive.and_utc())
                .ok()
        })
}

/// Parse a provider calendar date (`YYYY-MM-DD`)
#[must_use]
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Wire shape of a standard OAuth2 refresh response
#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Capability interface every wearable brand implements.
///
/// Adapters are stateless beyond [`ProviderConfig`]: credentials arrive with
/// the [`DeviceConnection`] on every call, so one adapter instance serves all
/// connections of its brand concurrently.
#[async_trait]
pub trait WearableProvider: Send + Sync {
    /// The device type this adapter serves
    fn device_type(&self) -> DeviceType;

    /// Static endpoint, auth, and rate-limit configuration
    fn config(&self) -> &ProviderConfig;

    /// Fetch the raw payload for one data family within the window.
    ///
    /// # Errors
    ///
    /// Maps provider responses onto the crate taxonomy: 401 becomes
    /// [`ProviderError::TokenRejected`], 429 [`ProviderError::RateLimited`],
    /// network/5xx [`ProviderError::Transient`], unparseable bodies
    /// [`ProviderError::MalformedResponse`].
    async fn fetch(
        &self,
        connection: &DeviceConnection,
        family: DataFamily,
        window: &FetchWindow,
    ) -> ProviderResult<Value>;

    /// Transform a raw payload into canonical samples.
    ///
    /// Pure and total for well-formed payloads: unknown or missing fields
    /// default to neutral values (missing quality score becomes 0, missing
    /// optional metrics become `None`) instead of failing the transform.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MalformedResponse`] only when the payload's
    /// top-level shape is unrecognizable.
    fn transform(&self, raw: &Value, family: DataFamily) -> ProviderResult<Vec<CanonicalSample>>;

    /// Exchange a refresh token for new access credentials.
    ///
    /// The default implementation performs a standard OAuth2
    /// `grant_type=refresh_token` form post against the configured token URL.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ReauthRequired`] when the provider rejects the
    /// refresh token and [`ProviderError::Configuration`] when client
    /// credentials are missing.
    async fn exchange_refresh_token(&self, refresh_token: &str) -> ProviderResult<RefreshedTokens> {
        let config = self.config();
        let client_id = config.client_id.as_deref().ok_or_else(|| {
            ProviderError::Configuration {
                provider: config.name.clone(),
                details: "client_id is not configured".to_owned(),
            }
        })?;
        let client_secret = config.client_secret.as_deref().ok_or_else(|| {
            ProviderError::Configuration {
                provider: config.name.clone(),
                details: "client_secret is not configured".to_owned(),
            }
        })?;

        let body = http::post_refresh_form(
            &config.name,
            &config.token_url,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
        )
        .await?;

        let token: OAuthTokenResponse =
            serde_json::from_value(body).map_err(|e| ProviderError::MalformedResponse {
                provider: config.name.clone(),
                context: "token refresh".to_owned(),
                message: e.to_string(),
            })?;

        Ok(RefreshedTokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    /// Lightweight liveness check: one cheap authenticated request.
    ///
    /// Not a data sync; primarily validates that the access token is alive.
    ///
    /// # Errors
    ///
    /// Same status mapping as [`WearableProvider::fetch`].
    async fn probe(&self, connection: &DeviceConnection) -> ProviderResult<()> {
        let config = self.config();
        let url = config.api_url(&config.probe_path);
        http::get_ok(&config.name, &config.auth, &connection.access_token, &url).await
    }

    /// Best-effort token revocation at the provider, used when a device is
    /// removed. Providers without a revoke endpoint no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transient`] when the revoke request cannot be
    /// delivered; callers treat this as advisory.
    async fn revoke(&self, connection: &DeviceConnection) -> ProviderResult<()> {
        let config = self.config();
        let Some(revoke_url) = config.revoke_url.as_deref() else {
            return Ok(());
        };

        http::post_revoke_form(
            &config.name,
            revoke_url,
            &[("token", connection.access_token.as_str())],
        )
        .await
        .map_err(|e| {
            warn!(provider = %config.name, error = %e, "token revocation failed");
            e
        })
    }
}
