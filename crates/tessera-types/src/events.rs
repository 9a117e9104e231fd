use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain events published after a command has committed.
///
/// Events carry identifiers only; subscribers load whatever else they need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessagingEvent {
    /// A new request (or a listing thread that skipped the request step)
    /// was created together with its first message.
    ConversationRequested {
        conversation_id: Uuid,
        message_id: Uuid,
        initiator_id: Uuid,
        recipient_id: Uuid,
    },

    /// A message was stored in an existing conversation
    ChatMessageSent {
        conversation_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
    },

    ConversationAccepted {
        conversation_id: Uuid,
        initiator_id: Uuid,
        recipient_id: Uuid,
    },

    ConversationDenied {
        conversation_id: Uuid,
        initiator_id: Uuid,
        recipient_id: Uuid,
    },

    ConversationIgnored {
        conversation_id: Uuid,
        initiator_id: Uuid,
        recipient_id: Uuid,
    },

    /// The user's conversation list needs to be refreshed
    ConversationListChanged { user_id: Uuid },

    /// `reader_id` read the messages `sender_id` had sent
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
        sender_id: Uuid,
        marked: u64,
    },
}

impl MessagingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConversationRequested { .. } => "conversation_requested",
            Self::ChatMessageSent { .. } => "chat_message_sent",
            Self::ConversationAccepted { .. } => "conversation_accepted",
            Self::ConversationDenied { .. } => "conversation_denied",
            Self::ConversationIgnored { .. } => "conversation_ignored",
            Self::ConversationListChanged { .. } => "conversation_list_changed",
            Self::MessagesRead { .. } => "messages_read",
        }
    }

    /// Returns the conversation this event is about, if any.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::ConversationRequested { conversation_id, .. }
            | Self::ChatMessageSent { conversation_id, .. }
            | Self::ConversationAccepted { conversation_id, .. }
            | Self::ConversationDenied { conversation_id, .. }
            | Self::ConversationIgnored { conversation_id, .. }
            | Self::MessagesRead { conversation_id, .. } => Some(*conversation_id),
            Self::ConversationListChanged { .. } => None,
        }
    }

    pub fn message_id(&self) -> Option<Uuid> {
        match self {
            Self::ConversationRequested { message_id, .. }
            | Self::ChatMessageSent { message_id, .. } => Some(*message_id),
            _ => None,
        }
    }
}
