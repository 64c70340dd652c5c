// Debounced search input — coalesces keystrokes into settled search terms.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Input side of a debounce task.
///
/// Raw terms pushed here are held for the debounce interval; only the last
/// term seen before a quiet interval is forwarded on the settled receiver.
/// The channel never cancels fetches itself; the consumer of settled terms
/// decides what a settle means.
pub struct DebouncedSearchChannel {
    raw_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl DebouncedSearchChannel {
    /// Spawn the debounce task. Must be called from within a Tokio runtime.
    pub fn spawn(debounce: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(debounce_task(debounce, raw_rx, settled_tx, shutdown.clone()));

        (Self { raw_tx, shutdown }, settled_rx)
    }

    /// Feed one raw input event. Returns `false` once the channel is closed.
    pub fn push(&self, raw: impl Into<String>) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.raw_tx.send(raw.into()).is_ok()
    }

    /// Stop the task and drop any pending, unsettled input. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.raw_tx.is_closed()
    }
}

impl Drop for DebouncedSearchChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn debounce_task(
    debounce: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<String>,
    settled_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
) {
    loop {
        let mut term = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = raw_rx.recv() => match next {
                Some(term) => term,
                None => break,
            },
        };

        let mut coalesced = 0u32;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("search debounce closed with pending input");
                    return;
                }
                next = raw_rx.recv() => match next {
                    Some(newer) => {
                        term = newer;
                        coalesced += 1;
                    }
                    None => return,
                },
                _ = tokio::time::sleep(debounce) => break,
            }
        }

        debug!("search settled term={:?} coalesced={}", term, coalesced);
        if settled_tx.send(term).is_err() {
            break;
        }
    }
    debug!("search debounce task exited");
}
