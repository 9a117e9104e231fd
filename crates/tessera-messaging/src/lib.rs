//! Direct-messaging core: conversation commands, blocking, moderation,
//! reports, notification fan-out and the unread digest.

pub mod blocking;
pub mod bus;
pub mod clock;
pub mod config;
pub mod context;
pub mod conversations;
pub mod digest;
pub mod fanout;
pub mod mailer;
pub mod moderation;
pub mod reports;

pub use blocking::BlockService;
pub use bus::{EventBus, EventSubscriber};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MessagingConfig;
pub use context::{MessagingContext, SharedContext};
pub use conversations::ConversationService;
pub use digest::DigestBatcher;
pub use fanout::{NotificationFanout, RealtimeNotifier};
pub use mailer::{Mailer, OutboundEmail};
pub use moderation::ModerationService;
pub use reports::ReportService;
