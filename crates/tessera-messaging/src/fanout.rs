//! Turns committed domain events into realtime notifications.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};
use uuid::Uuid;

use tessera_db::{Database, conversations, messages};
use tessera_types::events::MessagingEvent;
use tessera_types::models::{ChatMessage, Conversation};

use crate::bus::EventSubscriber;

/// Push channel to connected clients. Best effort: an error here is logged
/// by the event bus and never reaches the command caller.
pub trait RealtimeNotifier: Send + Sync {
    /// `message` was delivered into a conversation `recipient_id` is part of.
    fn notify_new_message(&self, recipient_id: Uuid, message: &ChatMessage) -> Result<()>;
    fn notify_unread_count_changed(&self, user_id: Uuid, count: u64) -> Result<()>;
    /// Delivered to the request's recipient.
    fn notify_new_conversation_request(&self, conversation: &Conversation) -> Result<()>;
    /// Accepted, denied and ignored are delivered to the initiator.
    fn notify_conversation_accepted(&self, conversation: &Conversation) -> Result<()>;
    fn notify_conversation_denied(&self, conversation: &Conversation) -> Result<()>;
    fn notify_conversation_ignored(&self, conversation: &Conversation) -> Result<()>;
    fn notify_conversation_list_changed(&self, user_id: Uuid) -> Result<()>;
    /// The other side read what `sender_id` wrote in `conversation_id`.
    fn notify_messages_read(&self, sender_id: Uuid, conversation_id: Uuid) -> Result<()>;
}

/// Event subscriber that loads what each notification needs and forwards
/// it to a [`RealtimeNotifier`].
pub struct NotificationFanout {
    db: Arc<Database>,
    notifier: Arc<dyn RealtimeNotifier>,
}

impl NotificationFanout {
    pub fn new(db: Arc<Database>, notifier: Arc<dyn RealtimeNotifier>) -> Self {
        Self { db, notifier }
    }

    fn conversation(&self, id: Uuid) -> Result<Conversation> {
        self.db
            .with_conn(|conn| conversations::get(conn, id))?
            .ok_or_else(|| anyhow!("conversation {} vanished before fan-out", id))
    }

    fn message(&self, id: Uuid) -> Result<ChatMessage> {
        self.db
            .with_conn(|conn| messages::get(conn, id))?
            .ok_or_else(|| anyhow!("message {} vanished before fan-out", id))
    }

    fn push_unread_count(&self, user_id: Uuid) -> Result<()> {
        let count = self
            .db
            .with_conn(|conn| conversations::count_unread_for_user(conn, user_id))
            .context("counting unread conversations")?;
        self.notifier.notify_unread_count_changed(user_id, count)
    }
}

impl EventSubscriber for NotificationFanout {
    fn name(&self) -> &'static str {
        "notification_fanout"
    }

    fn handle(&self, event: &MessagingEvent) -> Result<()> {
        match *event {
            MessagingEvent::ConversationRequested {
                conversation_id,
                message_id,
                recipient_id,
                ..
            } => {
                let conversation = self.conversation(conversation_id)?;
                let message = self.message(message_id)?;
                self.notifier.notify_new_message(recipient_id, &message)?;
                self.notifier.notify_new_conversation_request(&conversation)?;
            }
            MessagingEvent::ChatMessageSent {
                message_id,
                recipient_id,
                ..
            } => {
                let message = self.message(message_id)?;
                self.notifier.notify_new_message(recipient_id, &message)?;
                self.push_unread_count(recipient_id)?;
            }
            MessagingEvent::ConversationAccepted { conversation_id, .. } => {
                let conversation = self.conversation(conversation_id)?;
                self.notifier.notify_conversation_accepted(&conversation)?;
            }
            MessagingEvent::ConversationDenied { conversation_id, .. } => {
                let conversation = self.conversation(conversation_id)?;
                self.notifier.notify_conversation_denied(&conversation)?;
            }
            MessagingEvent::ConversationIgnored { conversation_id, .. } => {
                let conversation = self.conversation(conversation_id)?;
                self.notifier.notify_conversation_ignored(&conversation)?;
            }
            MessagingEvent::ConversationListChanged { user_id } => {
                self.notifier.notify_conversation_list_changed(user_id)?;
            }
            MessagingEvent::MessagesRead {
                conversation_id,
                reader_id,
                sender_id,
                marked,
            } => {
                self.push_unread_count(reader_id)?;
                if marked > 0 {
                    self.notifier.notify_messages_read(sender_id, conversation_id)?;
                }
            }
        }
        Ok(())
    }
}

/// Notifier that only writes to the log. Used when no realtime transport
/// is attached.
pub struct TracingNotifier;

impl RealtimeNotifier for TracingNotifier {
    fn notify_new_message(&self, recipient_id: Uuid, message: &ChatMessage) -> Result<()> {
        debug!(
            recipient_id = %recipient_id,
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "new_message"
        );
        Ok(())
    }

    fn notify_unread_count_changed(&self, user_id: Uuid, count: u64) -> Result<()> {
        debug!(user_id = %user_id, count, "unread_count_changed");
        Ok(())
    }

    fn notify_new_conversation_request(&self, conversation: &Conversation) -> Result<()> {
        info!(
            conversation_id = %conversation.id,
            recipient_id = %conversation.recipient_id,
            "new_conversation_request"
        );
        Ok(())
    }

    fn notify_conversation_accepted(&self, conversation: &Conversation) -> Result<()> {
        info!(conversation_id = %conversation.id, "conversation_accepted");
        Ok(())
    }

    fn notify_conversation_denied(&self, conversation: &Conversation) -> Result<()> {
        info!(conversation_id = %conversation.id, "conversation_denied");
        Ok(())
    }

    fn notify_conversation_ignored(&self, conversation: &Conversation) -> Result<()> {
        info!(conversation_id = %conversation.id, "conversation_ignored");
        Ok(())
    }

    fn notify_conversation_list_changed(&self, user_id: Uuid) -> Result<()> {
        debug!(user_id = %user_id, "conversation_list_changed");
        Ok(())
    }

    fn notify_messages_read(&self, sender_id: Uuid, conversation_id: Uuid) -> Result<()> {
        debug!(sender_id = %sender_id, conversation_id = %conversation_id, "messages_read");
        Ok(())
    }
}

/// Discards every notification.
pub struct NullNotifier;

impl RealtimeNotifier for NullNotifier {
    fn notify_new_message(&self, _recipient_id: Uuid, _message: &ChatMessage) -> Result<()> {
        Ok(())
    }

    fn notify_unread_count_changed(&self, _user_id: Uuid, _count: u64) -> Result<()> {
        Ok(())
    }

    fn notify_new_conversation_request(&self, _conversation: &Conversation) -> Result<()> {
        Ok(())
    }

    fn notify_conversation_accepted(&self, _conversation: &Conversation) -> Result<()> {
        Ok(())
    }

    fn notify_conversation_denied(&self, _conversation: &Conversation) -> Result<()> {
        Ok(())
    }

    fn notify_conversation_ignored(&self, _conversation: &Conversation) -> Result<()> {
        Ok(())
    }

    fn notify_conversation_list_changed(&self, _user_id: Uuid) -> Result<()> {
        Ok(())
    }

    fn notify_messages_read(&self, _sender_id: Uuid, _conversation_id: Uuid) -> Result<()> {
        Ok(())
    }
}
