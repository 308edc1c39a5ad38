// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Expiry sweeper.
//!
//! One dedicated thread that periodically drives abandoned reservations
//! through the expire transition and reminds about overdue rentals. Runs
//! are sequential on the one thread, so sweeps never overlap. Reservations
//! forfeit the bicycle automatically; rentals are only flagged, never
//! force-returned.

use crate::engine::Engine;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to the background sweep thread.
///
/// Dropping the handle (or calling [`Sweeper::stop`]) shuts the thread
/// down; `stop` additionally joins it.
#[derive(Debug)]
pub struct Sweeper {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns the sweep thread, waking every `sweep_interval` from the
    /// engine's config.
    pub fn spawn(engine: Arc<Engine>) -> Self {
        let interval = engine.config().sweep_interval;
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    // Channel closed or an explicit stop: exit.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let report = engine.sweep();
                        if report.expired_reservations > 0 || report.overdue_rentals > 0 {
                            tracing::info!(
                                expired = report.expired_reservations,
                                overdue = report.overdue_rentals,
                                "sweep pass"
                            );
                        } else {
                            tracing::debug!("sweep pass: nothing due");
                        }
                    }
                }
            }
        });

        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Signals shutdown and waits for the thread to finish.
    pub fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("sweeper thread panicked");
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        // Closing the channel wakes the thread; no join here so drops in
        // panicking contexts stay cheap.
        self.shutdown.take();
    }
}
