use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::lifecycle::CallStore;
use crate::mailbox::SignalMailbox;

/// Periodic maintenance: reap expired signals and force-end calls left
/// ringing past the timeout. Both sweeps are idempotent and safe to run
/// concurrently with normal traffic; a problem with one record never
/// stops the rest of the sweep.
pub struct Reaper {
    calls: CallStore,
    mailbox: SignalMailbox,
    interval: Duration,
}

impl Reaper {
    pub fn new(calls: CallStore, mailbox: SignalMailbox, interval: Duration) -> Self {
        Self {
            calls,
            mailbox,
            interval,
        }
    }

    /// Run one pass of both sweeps.
    pub fn sweep(&self) -> (usize, usize) {
        let expired_signals = self.mailbox.sweep_expired();
        let stale_calls = self.calls.sweep_stale_calls();
        if expired_signals > 0 || stale_calls > 0 {
            debug!(expired_signals, stale_calls, "reaper pass finished");
        }
        (expired_signals, stale_calls)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}
