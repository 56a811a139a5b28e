//! Loop handle: shutdown signal + join for a spawned background loop.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a background loop.
/// - `request_shutdown()` を呼ぶとループが止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    pub(crate) fn new(shutdown_tx: watch::Sender<bool>, join: JoinHandle<()>) -> Self {
        Self { shutdown_tx, join }
    }

    /// Request shutdown. Does not forcibly cancel an in-flight delivery;
    /// the loop stops at its next check.
    pub fn request_shutdown(&self) {
        // ignore send error: receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the loop to finish.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
