// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Touch Debug Bridge

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use touch_debug_bridge::bluetooth::{self, Bridge, BluezTransport};
use touch_debug_bridge::cli::Cli;
use touch_debug_bridge::config::Config;
use touch_debug_bridge::console::{self, ConsoleAction};
use touch_debug_bridge::events::NoticeProcessor;
use touch_debug_bridge::payload::encode_hex;
use touch_debug_bridge::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("touch_debug_bridge={}", level).parse()?),
        )
        .init();

    info!("Starting Touch Debug Bridge v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.adapter.is_some() {
        config.bluetooth.adapter = cli.adapter.clone();
    }
    info!("Configuration loaded");

    let record = config.service.record();
    if cli.print_record {
        let encoded = record.encode().context("encoding service record")?;
        println!("{}", encode_hex(&encoded));
        return Ok(());
    }

    // Bring up the adapter and publish the service
    let session = bluer::Session::new().await?;
    let adapter = bluetooth::prepare_adapter(&session, &config.bluetooth).await?;
    info!("Using adapter {}", adapter.name());

    let mut published = match bluetooth::publish(&session, &record).await {
        Ok(published) => published,
        Err(e) => {
            error!("Failed to publish service record: {}", e);
            return Err(e.into());
        }
    };

    let transport = Arc::new(BluezTransport::new(adapter, published.take_requests()));

    // Create application state
    let state = AppState::new();

    // Start the bridge
    let (notice_tx, mut notice_rx) = tokio::sync::mpsc::channel(64);
    let (bridge, handle) = Bridge::new(
        transport,
        config.service.uuid,
        config.bridge.clone(),
        notice_tx,
    );
    bridge.begin_watching().await?;
    let bridge_task = tokio::spawn(bridge.run());

    // Handle bridge notices
    let processor = NoticeProcessor::new(state.clone());
    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            processor.process(notice);
        }
    });

    let mut action_rx = console::run_console();

    info!("Ready. {}", console::HELP);

    // Handle console actions
    loop {
        tokio::select! {
            Some(action) = action_rx.recv() => {
                match action {
                    ConsoleAction::Send(bytes) => {
                        match handle.write(bytes).await {
                            Ok(written) => {
                                info!("Sent {} bytes", written);
                                state.record_sent(written);
                            }
                            Err(e) => warn!("Write failed: {}", e),
                        }
                    }
                    ConsoleAction::Status => {
                        println!("{}", state.summary());
                    }
                    ConsoleAction::Help => {
                        println!("{}", console::HELP);
                    }
                    ConsoleAction::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    handle.shutdown().await;
    if let Err(e) = bridge_task.await {
        error!("Bridge task failed: {}", e);
    }
    drop(published);

    info!("Touch Debug Bridge stopped");
    Ok(())
}
