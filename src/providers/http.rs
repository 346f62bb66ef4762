// ABOUTME: Shared HTTP client with connection pooling and provider status-code mapping
// ABOUTME: Centralizes the translation from HTTP responses to the crate error taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::constants::http_defaults;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::DataFamily;
use crate::providers::core::AuthScheme;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Fallback wait when a 429 response carries no `Retry-After` header
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

static CLIENT_TIMEOUTS: OnceLock<(u64, u64)> = OnceLock::new();
static SHARED_CLIENT: OnceLock<Client> = OnceLock::new();

/// Configure the shared client's timeouts.
///
/// Must run before the first provider request; later calls are ignored.
pub fn initialize_shared_client(timeout_secs: u64, connect_timeout_secs: u64) {
    let _ = CLIENT_TIMEOUTS.set((timeout_secs, connect_timeout_secs));
}

/// The shared, connection-pooled HTTP client every adapter uses
pub fn shared_client() -> &'static Client {
    SHARED_CLIENT.get_or_init(|| {
        let (timeout, connect_timeout) = CLIENT_TIMEOUTS.get().copied().unwrap_or((
            http_defaults::REQUEST_TIMEOUT_SECS,
            http_defaults::CONNECT_TIMEOUT_SECS,
        ));

        ClientBuilder::new()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(connect_timeout))
            .build()
            .unwrap_or_else(|_| Client::new())
    })
}

/// Attach the provider's authentication scheme to a request
fn with_auth(builder: RequestBuilder, auth: &AuthScheme, access_token: &str) -> RequestBuilder {
    match auth {
        AuthScheme::Bearer => builder.header("Authorization", format!("Bearer {access_token}")),
        AuthScheme::ApiKeyHeader { header } => builder.header(header.as_str(), access_token),
    }
}

/// Seconds to wait from a 429 response's `Retry-After` header
fn retry_after_secs(response: &Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Map a non-success data-API status onto the error taxonomy
fn data_error_for_status(provider: &str, response: &Response) -> ProviderError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::TokenRejected {
            provider: provider.to_owned(),
            reason: "access token expired or invalid".to_owned(),
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            provider: provider.to_owned(),
            retry_after_secs: retry_after_secs(response),
        },
        s if s.is_server_error() => ProviderError::Transient {
            provider: provider.to_owned(),
            message: format!("provider returned {s}"),
        },
        s => ProviderError::Transient {
            provider: provider.to_owned(),
            message: format!("unexpected status {s}"),
        },
    }
}

/// Authenticated GET returning the parsed JSON body.
///
/// # Errors
///
/// Network failures become [`ProviderError::Transient`]; non-success statuses
/// map per the taxonomy; an unparseable body becomes
/// [`ProviderError::MalformedResponse`] tagged with the data family.
pub async fn get_json(
    provider: &str,
    family: DataFamily,
    auth: &AuthScheme,
    access_token: &str,
    url: &str,
) -> ProviderResult<Value> {
    debug!(provider, %family, url, "provider API request");

    let response = with_auth(shared_client().get(url), auth, access_token)
        .send()
        .await
        .map_err(|e| ProviderError::transient(provider, &e))?;

    if !response.status().is_success() {
        return Err(data_error_for_status(provider, &response));
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::MalformedResponse {
            provider: provider.to_owned(),
            context: family.as_str().to_owned(),
            message: e.to_string(),
        })
}

/// Authenticated GET that only checks the response status (liveness probes).
///
/// # Errors
///
/// Same status mapping as [`get_json`], without body parsing.
pub async fn get_ok(
    provider: &str,
    auth: &AuthScheme,
    access_token: &str,
    url: &str,
) -> ProviderResult<()> {
    let response = with_auth(shared_client().get(url), auth, access_token)
        .send()
        .await
        .map_err(|e| ProviderError::transient(provider, &e))?;

    if !response.status().is_success() {
        return Err(data_error_for_status(provider, &response));
    }
    Ok(())
}

/// OAuth2 refresh form post returning the parsed JSON body.
///
/// # Errors
///
/// A 4xx from the token endpoint means the refresh token itself was rejected
/// and becomes [`ProviderError::ReauthRequired`]; 429 and 5xx map as usual.
pub async fn post_refresh_form(
    provider: &str,
    token_url: &str,
    params: &[(&str, &str)],
) -> ProviderResult<Value> {
    let response = shared_client()
        .post(token_url)
        .form(params)
        .send()
        .await
        .map_err(|e| ProviderError::transient(provider, &e))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            provider: provider.to_owned(),
            retry_after_secs: retry_after_secs(&response),
        });
    }
    if status.is_client_error() {
        return Err(ProviderError::ReauthRequired {
            provider: provider.to_owned(),
            reason: format!("token endpoint returned {status}"),
        });
    }
    if !status.is_success() {
        return Err(ProviderError::Transient {
            provider: provider.to_owned(),
            message: format!("token endpoint returned {status}"),
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::MalformedResponse {
            provider: provider.to_owned(),
            context: "token refresh".to_owned(),
            message: e.to_string(),
        })
}

/// Token revocation form post; response body is ignored.
///
/// # Errors
///
/// Network failures and non-success statuses become
/// [`ProviderError::Transient`]; revocation is best-effort for callers.
pub async fn post_revoke_form(
    provider: &str,
    revoke_url: &str,
    params: &[(&str, &str)],
) -> ProviderResult<()> {
    let response = shared_client()
        .post(revoke_url)
        .form(params)
        .send()
        .await
        .map_err(|e| ProviderError::transient(provider, &e))?;

    if !response.status().is_success() {
        return Err(ProviderError::Transient {
            provider: provider.to_owned(),
            message: format!("revoke endpoint returned {}", response.status()),
        });
    }
    Ok(())
}
