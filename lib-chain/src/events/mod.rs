//! Chain Event Bus
//!
//! In-process fire-and-forget notifications for block persistence and block
//! relay. Listeners are awaited in subscription order; a failing listener is
//! logged and does not stop delivery to the others.
//!
//! The listener list is only locked long enough to snapshot it, so a
//! listener may subscribe others from inside `on_event`. Each listener is
//! locked while it handles an event: a listener that publishes to the same
//! bus from inside its own `on_event` deadlocks on itself.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::{BlockId, ReducedBlock, Transaction};

/// Events emitted by the chain core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainEvent {
    /// A block's transactions were committed to storage
    TransactionsSaved(Vec<Transaction>),

    /// A block is ready to be relayed to peers
    NewBlock {
        block: ReducedBlock,
        block_id: BlockId,
        broadcast: bool,
    },
}

impl ChainEvent {
    /// Bus topic name
    pub fn topic(&self) -> &'static str {
        match self {
            ChainEvent::TransactionsSaved(_) => "transactionsSaved",
            ChainEvent::NewBlock { .. } => "newBlock",
        }
    }
}

impl std::fmt::Display for ChainEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainEvent::TransactionsSaved(txs) => write!(f, "TransactionsSaved(count={})", txs.len()),
            ChainEvent::NewBlock { block_id, broadcast, .. } => {
                write!(f, "NewBlock(id={}, broadcast={})", block_id, broadcast)
            }
        }
    }
}

/// Receiver of chain events
#[async_trait]
pub trait ChainEventListener: Send {
    async fn on_event(&mut self, event: ChainEvent) -> Result<()>;
}

type SharedListener = Arc<Mutex<Box<dyn ChainEventListener>>>;

/// Shared publisher; cloning shares the listener list
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<SharedListener>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, listener: Box<dyn ChainEventListener>) {
        self.listeners.lock().await.push(Arc::new(Mutex::new(listener)));
    }

    /// Deliver one event to every listener subscribed when delivery starts
    pub async fn publish(&self, event: ChainEvent) {
        let listeners: Vec<SharedListener> = self.listeners.lock().await.clone();
        for listener in listeners {
            if let Err(e) = listener.lock().await.on_event(event.clone()).await {
                tracing::warn!("Event listener error on {}: {}", event.topic(), e);
            }
        }
    }

    /// Deliver a batch of events produced by one operation, in order
    pub async fn dispatch(&self, events: Vec<ChainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }
}

/// Listener that records every event it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    pub events: Arc<Mutex<Vec<ChainEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<ChainEvent> {
        self.events.lock().await.clone()
    }

    /// Recorded topics in arrival order
    pub async fn topics(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(ChainEvent::topic).collect()
    }
}

#[async_trait]
impl ChainEventListener for RecordingListener {
    async fn on_event(&mut self, event: ChainEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
