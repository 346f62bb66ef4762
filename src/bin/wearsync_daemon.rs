// ABOUTME: Standalone sync daemon: schedules device syncs and health probes until interrupted
// ABOUTME: Environment-only configuration; in-memory storage for demo deployments
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use wearsync::constants::http_defaults;
use wearsync::logging::{init_logging, LoggingConfig};
use wearsync::providers::http::initialize_shared_client;
use wearsync::storage::InMemoryStore;
use wearsync::WearsyncService;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LoggingConfig::from_env())?;
    initialize_shared_client(
        http_defaults::REQUEST_TIMEOUT_SECS,
        http_defaults::CONNECT_TIMEOUT_SECS,
    );

    let service = WearsyncService::new(Arc::new(InMemoryStore::new()));
    service.start().await;
    info!("wearsync daemon running; ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested; draining in-flight syncs");
    service.shutdown().await;
    Ok(())
}
