//! Interfaces to collaborators that own data this subsystem only borrows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Listing, User};

/// User records, including the messaging attributes this subsystem writes
/// (mute expiry, marketplace ban). Implementations must not cache: these
/// values can change between two commands.
pub trait UserDirectory: Send + Sync {
    fn get(&self, user_id: Uuid) -> Result<Option<User>>;

    fn set_messaging_muted_until(&self, user_id: Uuid, until: Option<DateTime<Utc>>) -> Result<()>;

    fn set_marketplace_banned(&self, user_id: Uuid, banned: bool) -> Result<()>;
}

/// Marketplace listings, referenced by id for display context.
pub trait ListingCatalog: Send + Sync {
    /// Returns `None` for unknown or removed listings.
    fn get(&self, listing_id: Uuid) -> Result<Option<Listing>>;

    fn remove(&self, listing_id: Uuid) -> Result<()>;
}
