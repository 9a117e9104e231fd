#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use tessera_db::Database;
use tessera_db::directory::{SqliteListingCatalog, SqliteUserDirectory};
use tessera_messaging::{
    BlockService, Clock, ConversationService, DigestBatcher, EventBus, ManualClock, Mailer,
    MessagingConfig, MessagingContext, ModerationService, NotificationFanout, OutboundEmail,
    RealtimeNotifier, ReportService,
};
use tessera_types::api::{StartConversation, StartOutcome};
use tessera_types::directory::UserDirectory;
use tessera_types::models::{ChatMessage, Conversation, Listing, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NewMessage { recipient_id: Uuid, message_id: Uuid },
    UnreadCount { user_id: Uuid, count: u64 },
    Request(Uuid),
    Accepted(Uuid),
    Denied(Uuid),
    Ignored(Uuid),
    ListChanged(Uuid),
    MessagesRead { sender_id: Uuid, conversation_id: Uuid },
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn record(&self, n: Notification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("realtime transport down");
        }
        self.sent.lock().unwrap().push(n);
        Ok(())
    }
}

impl RealtimeNotifier for RecordingNotifier {
    fn notify_new_message(&self, recipient_id: Uuid, message: &ChatMessage) -> Result<()> {
        self.record(Notification::NewMessage {
            recipient_id,
            message_id: message.id,
        })
    }

    fn notify_unread_count_changed(&self, user_id: Uuid, count: u64) -> Result<()> {
        self.record(Notification::UnreadCount { user_id, count })
    }

    fn notify_new_conversation_request(&self, conversation: &Conversation) -> Result<()> {
        self.record(Notification::Request(conversation.id))
    }

    fn notify_conversation_accepted(&self, conversation: &Conversation) -> Result<()> {
        self.record(Notification::Accepted(conversation.id))
    }

    fn notify_conversation_denied(&self, conversation: &Conversation) -> Result<()> {
        self.record(Notification::Denied(conversation.id))
    }

    fn notify_conversation_ignored(&self, conversation: &Conversation) -> Result<()> {
        self.record(Notification::Ignored(conversation.id))
    }

    fn notify_conversation_list_changed(&self, user_id: Uuid) -> Result<()> {
        self.record(Notification::ListChanged(user_id))
    }

    fn notify_messages_read(&self, sender_id: Uuid, conversation_id: Uuid) -> Result<()> {
        self.record(Notification::MessagesRead {
            sender_id,
            conversation_id,
        })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, email: &OutboundEmail) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("smtp relay refused connection");
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub struct Harness {
    pub db: Arc<Database>,
    pub users: Arc<SqliteUserDirectory>,
    pub listings: Arc<SqliteListingCatalog>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub mailer: Arc<RecordingMailer>,
    pub conversations: ConversationService,
    pub blocks: BlockService,
    pub moderation: ModerationService,
    pub reports: ReportService,
    pub digest: DigestBatcher,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let users = Arc::new(SqliteUserDirectory::new(db.clone()));
        let listings = Arc::new(SqliteListingCatalog::new(db.clone()));
        let clock = Arc::new(ManualClock::new(epoch()));
        let notifier = Arc::new(RecordingNotifier::default());
        let mailer = Arc::new(RecordingMailer::default());

        let bus = EventBus::new();
        bus.subscribe(Arc::new(NotificationFanout::new(db.clone(), notifier.clone())));

        let ctx = Arc::new(MessagingContext {
            db: db.clone(),
            users: users.clone(),
            listings: listings.clone(),
            clock: clock.clone(),
            bus,
            config: MessagingConfig::default(),
        });

        Self {
            conversations: ConversationService::new(ctx.clone()),
            blocks: BlockService::new(ctx.clone()),
            moderation: ModerationService::new(ctx.clone()),
            reports: ReportService::new(ctx.clone()),
            digest: DigestBatcher::new(ctx, mailer.clone()),
            db,
            users,
            listings,
            clock,
            notifier,
            mailer,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a user with default settings adjusted by `configure`.
    pub fn user_with(&self, configure: impl FnOnce(&mut User)) -> Uuid {
        let mut user = User::new(Uuid::new_v4());
        configure(&mut user);
        self.users.upsert(&user).unwrap();
        user.id
    }

    pub fn user(&self) -> Uuid {
        self.user_with(|_| {})
    }

    pub fn load_user(&self, id: Uuid) -> User {
        self.users.get(id).unwrap().unwrap()
    }

    pub fn listing(&self, seller_id: Uuid) -> Listing {
        let listing = Listing {
            id: Uuid::new_v4(),
            seller_id,
            puzzle_id: Some(Uuid::new_v4()),
        };
        self.listings.insert(&listing).unwrap();
        listing
    }

    pub fn start(&self, from: Uuid, to: Uuid, text: &str) -> StartOutcome {
        self.conversations
            .start_conversation(StartConversation {
                initiator_id: from,
                recipient_id: to,
                listing_id: None,
                initial_message: text.to_string(),
            })
            .unwrap()
    }

    pub fn start_about(&self, from: Uuid, to: Uuid, listing: &Listing, text: &str) -> StartOutcome {
        self.conversations
            .start_conversation(StartConversation {
                initiator_id: from,
                recipient_id: to,
                listing_id: Some(listing.id),
                initial_message: text.to_string(),
            })
            .unwrap()
    }

    /// Open and accept a general conversation between the two users.
    pub fn accepted(&self, from: Uuid, to: Uuid) -> Uuid {
        let outcome = self.start(from, to, "hello");
        self.conversations
            .accept_conversation(outcome.conversation_id, to)
            .unwrap();
        outcome.conversation_id
    }

    pub fn conversation(&self, id: Uuid) -> Conversation {
        self.db
            .with_conn(|conn| tessera_db::conversations::get(conn, id))
            .unwrap()
            .unwrap()
    }

    pub fn message_count(&self, conversation_id: Uuid) -> usize {
        self.db
            .with_conn(|conn| tessera_db::messages::page(conn, conversation_id, 1000, None))
            .unwrap()
            .len()
    }
}
