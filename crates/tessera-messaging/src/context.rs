use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tessera_db::Database;
use tessera_types::MessagingError;
use tessera_types::directory::{ListingCatalog, UserDirectory};
use tessera_types::models::{Listing, User};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::config::MessagingConfig;

/// Everything a service needs, shared between all of them.
pub struct MessagingContext {
    pub db: Arc<Database>,
    pub users: Arc<dyn UserDirectory>,
    pub listings: Arc<dyn ListingCatalog>,
    pub clock: Arc<dyn Clock>,
    pub bus: EventBus,
    pub config: MessagingConfig,
}

pub type SharedContext = Arc<MessagingContext>;

impl MessagingContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // Directory lookups must happen outside `Database::with_tx`: the
    // SQLite-backed directory shares the same connection.
    pub(crate) fn user(&self, user_id: Uuid) -> Result<User, MessagingError> {
        self.users.get(user_id)?.ok_or(MessagingError::UserNotFound)
    }

    pub(crate) fn listing(&self, listing_id: Uuid) -> Result<Listing, MessagingError> {
        self.listings
            .get(listing_id)?
            .ok_or(MessagingError::ListingNotFound)
    }
}
