use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use tessera_messaging::RealtimeNotifier;
use tessera_types::models::{ChatMessage, Conversation};

use crate::update::RealtimeUpdate;

/// Routes realtime updates to connected users.
///
/// Each user has at most one live channel; registering again replaces the
/// previous one. Updates for users without a channel are dropped.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<RealtimeUpdate>)>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-user channel. Returns (conn_id, receiver).
    pub fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<RealtimeUpdate>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, (conn_id, tx));
        debug!(user_id = %user_id, conn_id = %conn_id, "Realtime channel registered");
        (conn_id, rx)
    }

    /// Unregister a per-user channel, but only if conn_id matches.
    pub fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self
            .inner
            .user_channels
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id) {
            channels.remove(&user_id);
        }
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner
            .user_channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&user_id)
    }

    /// Send a targeted update. Offline users are skipped; a channel whose
    /// receiver is gone is dropped and reported.
    pub fn send_to_user(&self, user_id: Uuid, update: RealtimeUpdate) -> Result<()> {
        let stale = {
            let channels = self
                .inner
                .user_channels
                .read()
                .unwrap_or_else(|e| e.into_inner());
            match channels.get(&user_id) {
                Some((conn_id, tx)) => tx.send(update).err().map(|_| *conn_id),
                None => return Ok(()),
            }
        };

        if let Some(conn_id) = stale {
            self.unregister(user_id, conn_id);
            bail!("realtime channel for user {} is closed", user_id);
        }
        Ok(())
    }
}

impl RealtimeNotifier for Hub {
    fn notify_new_message(&self, recipient_id: Uuid, message: &ChatMessage) -> Result<()> {
        self.send_to_user(
            recipient_id,
            RealtimeUpdate::NewMessage {
                message: message.clone(),
            },
        )
    }

    fn notify_unread_count_changed(&self, user_id: Uuid, count: u64) -> Result<()> {
        self.send_to_user(user_id, RealtimeUpdate::UnreadCount { count })
    }

    fn notify_new_conversation_request(&self, conversation: &Conversation) -> Result<()> {
        self.send_to_user(
            conversation.recipient_id,
            RealtimeUpdate::NewRequest {
                conversation_id: conversation.id,
                initiator_id: conversation.initiator_id,
            },
        )
    }

    fn notify_conversation_accepted(&self, conversation: &Conversation) -> Result<()> {
        self.send_to_user(
            conversation.initiator_id,
            RealtimeUpdate::Accepted {
                conversation_id: conversation.id,
            },
        )
    }

    fn notify_conversation_denied(&self, conversation: &Conversation) -> Result<()> {
        self.send_to_user(
            conversation.initiator_id,
            RealtimeUpdate::Denied {
                conversation_id: conversation.id,
            },
        )
    }

    fn notify_conversation_ignored(&self, conversation: &Conversation) -> Result<()> {
        self.send_to_user(
            conversation.initiator_id,
            RealtimeUpdate::Ignored {
                conversation_id: conversation.id,
            },
        )
    }

    fn notify_conversation_list_changed(&self, user_id: Uuid) -> Result<()> {
        self.send_to_user(user_id, RealtimeUpdate::ListChanged)
    }

    fn notify_messages_read(&self, sender_id: Uuid, conversation_id: Uuid) -> Result<()> {
        self.send_to_user(sender_id, RealtimeUpdate::Read { conversation_id })
    }
}
