use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tessera_db::{blocks, conversations, messages};
use tessera_types::MessagingError;
use tessera_types::api::{SendMessage, StartConversation, StartDisposition, StartOutcome};
use tessera_types::events::MessagingEvent;
use tessera_types::models::{
    ChatMessage, Conversation, ConversationFilter, ConversationOverview, ConversationStatus,
    Listing, MessageCursor, clamp_content,
};

use crate::context::SharedContext;

/// What `start_conversation` decided inside its transaction.
enum StartPlan {
    Created {
        conversation: Conversation,
        message: ChatMessage,
        disposition: StartDisposition,
    },
    Reuse(Uuid),
}

pub struct ConversationService {
    ctx: SharedContext,
}

impl ConversationService {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Open a conversation or, when the pair already talks, continue one.
    pub fn start_conversation(&self, cmd: StartConversation) -> Result<StartOutcome, MessagingError> {
        if cmd.initiator_id == cmd.recipient_id {
            return Err(MessagingError::SelfTarget);
        }

        let now = self.ctx.now();
        let initiator = self.ctx.user(cmd.initiator_id)?;
        let recipient = self.ctx.user(cmd.recipient_id)?;

        if initiator.is_messaging_muted(now) {
            return Err(MessagingError::MessagingMuted);
        }

        let listing = cmd
            .listing_id
            .map(|id| self.ctx.listing(id))
            .transpose()?;
        let content = clamp_content(&cmd.initial_message, self.ctx.config.max_message_chars);

        let plan = self.ctx.db.with_tx(|conn| -> Result<StartPlan, MessagingError> {
            if blocks::exists(conn, recipient.id, initiator.id)? {
                return Err(MessagingError::UserIsBlocked);
            }
            // Marketplace inquiries bypass the recipient's DM preference
            if listing.is_none() && !recipient.allow_direct_messages {
                return Err(MessagingError::DirectMessagesDisabled);
            }

            if let Some(listing) = &listing {
                if let Some(existing) =
                    conversations::find_accepted_for_listing(conn, initiator.id, recipient.id, listing.id)?
                {
                    return Ok(StartPlan::Reuse(existing.id));
                }
            }

            if let Some(existing) = conversations::find_accepted_between(conn, initiator.id, recipient.id)? {
                let Some(listing) = &listing else {
                    return Ok(StartPlan::Reuse(existing.id));
                };
                // The pair already trusts each other; each listing still gets
                // its own thread.
                return open_listing_thread(conn, initiator.id, recipient.id, listing, &content, now);
            }

            if conversations::find_pending_between(conn, initiator.id, recipient.id)?.is_some() {
                return Err(MessagingError::ConversationRequestAlreadyPending);
            }

            let conversation = Conversation {
                id: Uuid::now_v7(),
                initiator_id: initiator.id,
                recipient_id: recipient.id,
                status: ConversationStatus::Pending,
                created_at: now,
                responded_at: None,
                last_message_at: Some(now),
                listing_id: listing.as_ref().map(|l| l.id),
                puzzle_id: listing.as_ref().and_then(|l| l.puzzle_id),
            };
            if !conversations::insert(conn, &conversation)? {
                return Err(MessagingError::ConversationRequestAlreadyPending);
            }

            let message = first_message(conn, &conversation, &content, now)?;
            Ok(StartPlan::Created {
                conversation,
                message,
                disposition: StartDisposition::RequestCreated,
            })
        })?;

        match plan {
            StartPlan::Reuse(conversation_id) => {
                debug!(
                    conversation_id = %conversation_id,
                    "Start on existing thread, sending as a message"
                );
                let message = self.send_message(SendMessage {
                    conversation_id,
                    sender_id: cmd.initiator_id,
                    content: cmd.initial_message,
                })?;
                Ok(StartOutcome {
                    conversation_id,
                    message_id: message.id,
                    disposition: StartDisposition::ExistingThreadReused,
                })
            }
            StartPlan::Created {
                conversation,
                message,
                disposition,
            } => {
                info!(
                    conversation_id = %conversation.id,
                    initiator_id = %conversation.initiator_id,
                    recipient_id = %conversation.recipient_id,
                    status = %conversation.status,
                    "Conversation opened"
                );
                self.ctx.bus.publish(MessagingEvent::ConversationRequested {
                    conversation_id: conversation.id,
                    message_id: message.id,
                    initiator_id: conversation.initiator_id,
                    recipient_id: conversation.recipient_id,
                });
                Ok(StartOutcome {
                    conversation_id: conversation.id,
                    message_id: message.id,
                    disposition,
                })
            }
        }
    }

    pub fn send_message(&self, cmd: SendMessage) -> Result<ChatMessage, MessagingError> {
        // Looked up first so a missing thread wins over a missing sender
        let exists = self
            .ctx
            .db
            .with_conn(|conn| conversations::get(conn, cmd.conversation_id))?
            .is_some();
        if !exists {
            return Err(MessagingError::ConversationNotFound);
        }

        let sender = self.ctx.user(cmd.sender_id)?;
        let now = self.ctx.now();
        if sender.is_messaging_muted(now) {
            return Err(MessagingError::MessagingMuted);
        }

        let content = clamp_content(&cmd.content, self.ctx.config.max_message_chars);

        let (message, recipient_id) = self.ctx.db.with_tx(|conn| -> Result<_, MessagingError> {
            let conversation = conversations::get(conn, cmd.conversation_id)?
                .ok_or(MessagingError::ConversationNotFound)?;
            let recipient_id = conversation
                .other_participant(sender.id)
                .ok_or(MessagingError::ConversationNotFound)?;
            if !conversation.may_send(sender.id) {
                return Err(MessagingError::ConversationNotFound);
            }
            if blocks::exists(conn, recipient_id, sender.id)? {
                return Err(MessagingError::UserIsBlocked);
            }

            let message = ChatMessage {
                id: Uuid::now_v7(),
                conversation_id: conversation.id,
                sender_id: sender.id,
                content,
                sent_at: now,
                read_at: None,
            };
            messages::insert(conn, &message)?;
            conversations::touch_last_message(conn, conversation.id, now)?;
            Ok((message, recipient_id))
        })?;

        debug!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "Message sent"
        );
        self.ctx.bus.publish(MessagingEvent::ChatMessageSent {
            conversation_id: message.conversation_id,
            message_id: message.id,
            sender_id: message.sender_id,
            recipient_id,
        });
        Ok(message)
    }

    pub fn accept_conversation(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<Conversation, MessagingError> {
        self.respond(conversation_id, actor_id, ConversationStatus::Accepted)
    }

    pub fn deny_conversation(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<Conversation, MessagingError> {
        self.respond(conversation_id, actor_id, ConversationStatus::Denied)
    }

    pub fn ignore_conversation(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<Conversation, MessagingError> {
        self.respond(conversation_id, actor_id, ConversationStatus::Ignored)
    }

    fn respond(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
        next: ConversationStatus,
    ) -> Result<Conversation, MessagingError> {
        let now = self.ctx.now();
        let conversation = self.ctx.db.with_tx(|conn| -> Result<_, MessagingError> {
            let mut conversation =
                conversations::get(conn, conversation_id)?.ok_or(MessagingError::ConversationNotFound)?;
            conversation.respond(actor_id, next, now)?;
            conversations::save_response(conn, &conversation)?;
            Ok(conversation)
        })?;

        info!(conversation_id = %conversation.id, status = %conversation.status, "Request answered");

        let (id, initiator_id, recipient_id) =
            (conversation.id, conversation.initiator_id, conversation.recipient_id);
        let event = match next {
            ConversationStatus::Accepted => MessagingEvent::ConversationAccepted {
                conversation_id: id,
                initiator_id,
                recipient_id,
            },
            ConversationStatus::Denied => MessagingEvent::ConversationDenied {
                conversation_id: id,
                initiator_id,
                recipient_id,
            },
            ConversationStatus::Ignored => MessagingEvent::ConversationIgnored {
                conversation_id: id,
                initiator_id,
                recipient_id,
            },
            // respond() rejects every other target
            ConversationStatus::Pending => return Ok(conversation),
        };
        self.ctx.bus.publish(event);

        if next == ConversationStatus::Ignored {
            for user_id in [initiator_id, recipient_id] {
                self.ctx
                    .bus
                    .publish(MessagingEvent::ConversationListChanged { user_id });
            }
        }

        Ok(conversation)
    }

    /// Mark everything the other participant sent as read. Returns how many
    /// messages changed.
    pub fn mark_messages_as_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64, MessagingError> {
        let now = self.ctx.now();
        let outcome = self.ctx.db.with_tx(|conn| -> Result<_, MessagingError> {
            let conversation =
                conversations::get(conn, conversation_id)?.ok_or(MessagingError::ConversationNotFound)?;
            let Some(sender_id) = conversation.other_participant(reader_id) else {
                return Ok(None);
            };
            let marked = messages::mark_read(conn, conversation.id, reader_id, now)?;
            Ok(Some((sender_id, marked)))
        })?;

        let Some((sender_id, marked)) = outcome else {
            warn!(
                conversation_id = %conversation_id,
                reader_id = %reader_id,
                "Non-participant tried to mark messages read"
            );
            return Ok(0);
        };

        debug!(conversation_id = %conversation_id, marked, "Messages read");
        self.ctx.bus.publish(MessagingEvent::MessagesRead {
            conversation_id,
            reader_id,
            sender_id,
            marked,
        });
        Ok(marked)
    }

    pub fn conversations(
        &self,
        user_id: Uuid,
        filter: ConversationFilter,
    ) -> Result<Vec<ConversationOverview>, MessagingError> {
        Ok(self
            .ctx
            .db
            .with_conn(|conn| conversations::list_for_user(conn, user_id, filter))?)
    }

    /// Newest-first page of a conversation, visible to participants only.
    pub fn messages(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        limit: Option<u32>,
        before: Option<MessageCursor>,
    ) -> Result<Vec<ChatMessage>, MessagingError> {
        let limit = self.ctx.config.page_size(limit);
        self.ctx.db.with_conn(|conn| {
            let visible = conversations::get(conn, conversation_id)?
                .is_some_and(|c| c.is_participant(viewer_id));
            if !visible {
                return Ok(None);
            }
            messages::page(conn, conversation_id, limit, before).map(Some)
        })?
        .ok_or(MessagingError::ConversationNotFound)
    }

    pub fn unread_count(&self, user_id: Uuid) -> Result<u64, MessagingError> {
        Ok(self
            .ctx
            .db
            .with_conn(|conn| conversations::count_unread_for_user(conn, user_id))?)
    }
}

fn open_listing_thread(
    conn: &Connection,
    initiator_id: Uuid,
    recipient_id: Uuid,
    listing: &Listing,
    content: &str,
    now: DateTime<Utc>,
) -> Result<StartPlan, MessagingError> {
    let conversation = Conversation {
        id: Uuid::now_v7(),
        initiator_id,
        recipient_id,
        status: ConversationStatus::Accepted,
        created_at: now,
        responded_at: Some(now),
        last_message_at: Some(now),
        listing_id: Some(listing.id),
        puzzle_id: listing.puzzle_id,
    };

    if !conversations::insert(conn, &conversation)? {
        // Lost a race for the same (pair, listing) slot
        return match conversations::find_accepted_for_listing(conn, initiator_id, recipient_id, listing.id)? {
            Some(existing) => Ok(StartPlan::Reuse(existing.id)),
            None => Err(MessagingError::ConversationRequestAlreadyPending),
        };
    }

    let message = first_message(conn, &conversation, content, now)?;
    Ok(StartPlan::Created {
        conversation,
        message,
        disposition: StartDisposition::ListingThreadCreated,
    })
}

fn first_message(
    conn: &Connection,
    conversation: &Conversation,
    content: &str,
    now: DateTime<Utc>,
) -> Result<ChatMessage, MessagingError> {
    let message = ChatMessage {
        id: Uuid::now_v7(),
        conversation_id: conversation.id,
        sender_id: conversation.initiator_id,
        content: content.to_string(),
        sent_at: now,
        read_at: None,
    };
    messages::insert(conn, &message)?;
    Ok(message)
}
