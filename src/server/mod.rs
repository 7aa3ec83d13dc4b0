// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

//! Hosting layer for the admission engine.
//!
//! # Overview
//!
//! - [`config`]: YAML configuration with environment overrides
//! - [`Housekeeper`]: periodic eviction of idle limiter entries
//! - [`command`]: the line protocol spoken by the `gatekeeper` binary
//! - [`serve`]: request loop tying the protocol to an engine
//!
//! # Example
//!
//! ```no_run
//! use gatekeeper::server::{build_engine, config::load_config, serve, Housekeeper};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(None)?;
//!     let engine = build_engine(&config)?;
//!     let housekeeper = Housekeeper::spawn(&engine, config.housekeeping_period());
//!
//!     serve(&engine, tokio::io::stdin(), tokio::io::stdout(), CancellationToken::new()).await?;
//!     housekeeper.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod maintenance;

pub use self::command::{handle_line, Command, Reply};
pub use self::maintenance::Housekeeper;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::engine::AdmissionEngine;
use self::config::GateFileConfig;

/// Build an engine from configuration, seeding the allow and deny lists.
pub fn build_engine(config: &GateFileConfig) -> Result<AdmissionEngine> {
    let engine = AdmissionEngine::with_lists(
        config.to_engine_config(),
        &config.lists.allow,
        &config.lists.deny,
    )
    .context("Failed to seed prefix lists")?;

    tracing::info!(
        allow = engine.allow_list().len(),
        deny = engine.deny_list().len(),
        "Admission engine ready"
    );
    Ok(engine)
}

/// Answer request lines from `reader` on `writer` until EOF or cancellation.
///
/// Returns the number of requests answered.
pub async fn serve<R, W>(
    engine: &AdmissionEngine,
    reader: R,
    mut writer: W,
    cancel_token: CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut answered = 0u64;

    loop {
        let line = tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!("Request loop cancelled");
                break;
            }
            line = lines.next_line() => line.context("Failed to read request")?,
        };

        let Some(line) = line else {
            tracing::debug!("Request stream closed");
            break;
        };

        if let Some(reply) = handle_line(engine, &line) {
            writer
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .context("Failed to write reply")?;
            writer.flush().await.context("Failed to flush reply")?;
            answered += 1;
        }
    }

    Ok(answered)
}
