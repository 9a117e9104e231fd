use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tracing::{debug, error};

use tessera_types::events::MessagingEvent;

/// Reacts to committed domain events.
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;
    fn handle(&self, event: &MessagingEvent) -> Result<()>;
}

/// In-process publish/subscribe for domain events.
///
/// Events are published only after the command's transaction committed.
/// A failing subscriber is logged and skipped; the command that raised the
/// event has already succeeded and never sees the failure.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Arc<dyn EventSubscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscriber);
    }

    pub fn publish(&self, event: MessagingEvent) {
        // Snapshot so a subscriber may publish or subscribe re-entrantly
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        debug!(event = event.name(), subscribers = subscribers.len(), "publishing");

        for subscriber in subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber.handle(&event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(_) => "subscriber panicked".to_string(),
            };

            error!(
                subscriber = subscriber.name(),
                event = event.name(),
                conversation_id = ?event.conversation_id(),
                message_id = ?event.message_id(),
                "Event handler failed: {}",
                failure,
            );
        }
    }
}
