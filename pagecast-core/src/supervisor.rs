//! Top-level restart loop
//!
//! Keeps one relay alive forever: any fatal error tears the relay
//! down, waits out the restart delay, and starts over from scratch.
//! Only the shutdown signal ends the loop, and teardown always
//! completes before it returns.

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::relay::Relay;

/// Restarts the relay after every fatal error
pub struct ProcessSupervisor {
    relay: Relay,
    restarts: u64,
}

impl ProcessSupervisor {
    pub fn new(relay: Relay) -> Self {
        Self { relay, restarts: 0 }
    }

    /// Lifetime restart count
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Run until the shutdown signal fires
    ///
    /// Returns only after the relay is fully torn down.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let restart_delay = self.relay.config().restart_delay;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.relay.start().await {
                Ok(()) => {
                    let stopped_by_signal = tokio::select! {
                        _ = shutdown.changed() => true,
                        fatal = self.relay.run() => {
                            error!("Relay failed: {}", fatal);
                            false
                        }
                    };
                    self.relay.stop().await;
                    if stopped_by_signal {
                        break;
                    }
                }
                Err(e) => {
                    // start() already tore down whatever came up
                    warn!("Relay start failed: {}", e);
                }
            }

            self.restarts += 1;
            info!(
                "Restarting relay in {:?} (restart #{})",
                restart_delay, self.restarts
            );
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(restart_delay) => {}
            }
        }

        self.relay.stop().await;
        info!("Supervisor shut down after {} restarts", self.restarts);
        Ok(())
    }
}
