//! In-process message channel.
//!
//! Hosts a background context and its callers inside one process, and backs
//! the test suite.

use std::sync::Arc;
use std::sync::Mutex;

use portrpc::Message;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// A duplex channel transport using tokio mpsc channels.
///
/// Messages posted on one end appear on the other end's `recv` and vice versa.
pub struct LocalChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>,
}

impl LocalChannel {
    /// Creates a channel from separate tx and rx halves.
    pub fn new(
        tx: mpsc::UnboundedSender<Message>,
        rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    /// Creates a pair of ends connected to each other.
    ///
    /// Messages posted on `a` are received by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self::new(tx_a, rx_b);
        let b = Self::new(tx_b, rx_a);

        (a, b)
    }

    /// Takes the next queued message without waiting.
    ///
    /// Returns `None` when nothing is queued or another task is mid-`recv`.
    pub fn try_recv(&self) -> Option<Message> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait::async_trait]
impl Transport for LocalChannel {
    fn post(&self, message: Message) -> transport::Result<()> {
        let guard = self
            .tx
            .lock()
            .map_err(|_| transport::Error::Io("sender lock poisoned".into()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| transport::Error::ConnectionLost("Channel closed locally".into()))?;
        tx.send(message)
            .map_err(|_| transport::Error::ConnectionLost("Channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Message>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}
