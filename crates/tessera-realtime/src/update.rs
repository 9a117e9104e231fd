use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tessera_types::models::ChatMessage;

/// Payload pushed to one connected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeUpdate {
    NewRequest {
        conversation_id: Uuid,
        initiator_id: Uuid,
    },
    Accepted {
        conversation_id: Uuid,
    },
    Denied {
        conversation_id: Uuid,
    },
    Ignored {
        conversation_id: Uuid,
    },
    NewMessage {
        message: ChatMessage,
    },
    /// Someone read the messages this user sent.
    Read {
        conversation_id: Uuid,
    },
    ListChanged,
    UnreadCount {
        count: u64,
    },
}
