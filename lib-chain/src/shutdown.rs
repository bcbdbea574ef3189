//! Controlled shutdown signal
//!
//! A ledger consistency fault must stop the node. The chain core never exits
//! the process itself: it triggers this signal, refuses further mutations and
//! leaves the exit to whoever owns the process (see the `chain-admin` binary).

use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

/// Shared one-shot shutdown trigger. The first reason wins.
#[derive(Debug, Clone)]
pub struct Shutdown {
    state: Arc<watch::Sender<Option<String>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state: Arc::new(state),
        }
    }

    /// Fire the signal. Later triggers keep the first reason.
    pub fn trigger(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let fired = self.state.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if fired {
            error!("Shutdown requested: {}", reason);
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.state.borrow().clone()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            state: self.state.subscribe(),
        }
    }
}

/// Awaitable side of [`Shutdown`]
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    state: watch::Receiver<Option<String>>,
}

impl ShutdownListener {
    /// Resolve with the shutdown reason once the signal fires
    pub async fn wait(&mut self) -> String {
        loop {
            if let Some(reason) = self.state.borrow_and_update().clone() {
                return reason;
            }
            if self.state.changed().await.is_err() {
                return "shutdown signal dropped".to_string();
            }
        }
    }
}
