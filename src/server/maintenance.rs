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

//! Periodic housekeeping of the admission engine's rate limiter caches.
//!
//! One task runs per dimension. Each task holds only an `Arc` of the cache it
//! maintains and never coordinates with the others.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::{AdmissionEngine, Dimension};
use crate::security::LimiterCache;

/// Handle to the running housekeeping tasks.
///
/// Dropping the handle cancels the tasks without waiting for them; call
/// [`Housekeeper::shutdown`] to wait until they have stopped.
#[derive(Debug)]
pub struct Housekeeper {
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Housekeeper {
    /// Start one housekeeping task per dimension of `engine`.
    ///
    /// The first pass runs one `period` after start.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero, or if called outside a tokio runtime.
    pub fn spawn(engine: &AdmissionEngine, period: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let handles = Dimension::ALL
            .into_iter()
            .map(|dimension| {
                spawn_task(
                    dimension,
                    Arc::clone(engine.limiter(dimension)),
                    period,
                    cancel_token.clone(),
                )
            })
            .collect();

        tracing::info!(period_secs = period.as_secs_f64(), "Housekeeping started");

        Self {
            cancel_token,
            handles,
        }
    }

    /// Token cancelled on shutdown. Child tokens can tie other work to the
    /// housekeeper's lifetime.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Stop all tasks and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Housekeeping task failed");
            }
        }
        tracing::info!("Housekeeping stopped");
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

fn spawn_task(
    dimension: Dimension,
    cache: Arc<LimiterCache>,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    // Runtime clock, so paused-time tests drive eviction too
                    let removed = cache.house_keep_at(Instant::now().into_std());
                    tracing::debug!(
                        dimension = %dimension,
                        removed,
                        remaining = cache.len(),
                        "Housekeeping pass"
                    );
                }
            }
        }
    })
}
