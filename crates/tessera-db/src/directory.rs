//! SQLite-backed user directory and listing catalog.
//!
//! Deployments that own users and listings elsewhere implement the traits
//! from `tessera_types::directory` themselves; these are the in-tree
//! implementations used by the `tessera` binary and the test suites.

use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use tessera_types::directory::{ListingCatalog, UserDirectory};
use tessera_types::models::{Listing, User};

use crate::Database;
use crate::models::{enum_at, opt_text, opt_uuid_at, uuid_at};

pub struct SqliteUserDirectory {
    db: Arc<Database>,
}

impl SqliteUserDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create or replace a user record.
    pub fn upsert(&self, user: &User) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users
                    (id, name, email, locale, allow_direct_messages, email_notifications_enabled,
                     email_notification_frequency, messaging_muted_until, marketplace_banned)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    locale = excluded.locale,
                    allow_direct_messages = excluded.allow_direct_messages,
                    email_notifications_enabled = excluded.email_notifications_enabled,
                    email_notification_frequency = excluded.email_notification_frequency,
                    messaging_muted_until = excluded.messaging_muted_until,
                    marketplace_banned = excluded.marketplace_banned",
                params![
                    user.id.to_string(),
                    user.name,
                    user.email,
                    user.locale,
                    user.allow_direct_messages,
                    user.email_notifications_enabled,
                    user.email_notification_frequency.as_str(),
                    user.messaging_muted_until,
                    user.marketplace_banned,
                ],
            )?;
            Ok(())
        })
    }
}

impl UserDirectory for SqliteUserDirectory {
    fn get(&self, user_id: Uuid) -> Result<Option<User>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, email, locale, allow_direct_messages, email_notifications_enabled,
                            email_notification_frequency, messaging_muted_until, marketplace_banned
                     FROM users WHERE id = ?1",
                    [user_id.to_string()],
                    |row| {
                        Ok(User {
                            id: uuid_at(row, 0)?,
                            name: row.get(1)?,
                            email: row.get(2)?,
                            locale: row.get(3)?,
                            allow_direct_messages: row.get(4)?,
                            email_notifications_enabled: row.get(5)?,
                            email_notification_frequency: enum_at(row, 6)?,
                            messaging_muted_until: row.get(7)?,
                            marketplace_banned: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    fn set_messaging_muted_until(&self, user_id: Uuid, until: Option<DateTime<Utc>>) -> Result<()> {
        let updated = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET messaging_muted_until = ?2 WHERE id = ?1",
                params![user_id.to_string(), until],
            )?)
        })?;
        if updated == 0 {
            bail!("user {} does not exist", user_id);
        }
        Ok(())
    }

    fn set_marketplace_banned(&self, user_id: Uuid, banned: bool) -> Result<()> {
        let updated = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET marketplace_banned = ?2 WHERE id = ?1",
                params![user_id.to_string(), banned],
            )?)
        })?;
        if updated == 0 {
            bail!("user {} does not exist", user_id);
        }
        Ok(())
    }
}

pub struct SqliteListingCatalog {
    db: Arc<Database>,
}

impl SqliteListingCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, listing: &Listing) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO listings (id, seller_id, puzzle_id) VALUES (?1, ?2, ?3)",
                params![
                    listing.id.to_string(),
                    listing.seller_id.to_string(),
                    opt_text(listing.puzzle_id),
                ],
            )?;
            Ok(())
        })
    }
}

impl ListingCatalog for SqliteListingCatalog {
    fn get(&self, listing_id: Uuid) -> Result<Option<Listing>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, seller_id, puzzle_id FROM listings
                     WHERE id = ?1 AND removed_at IS NULL",
                    [listing_id.to_string()],
                    |row| {
                        Ok(Listing {
                            id: uuid_at(row, 0)?,
                            seller_id: uuid_at(row, 1)?,
                            puzzle_id: opt_uuid_at(row, 2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    fn remove(&self, listing_id: Uuid) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE listings SET removed_at = ?2 WHERE id = ?1 AND removed_at IS NULL",
                params![listing_id.to_string(), Utc::now()],
            )?;
            Ok(())
        })
    }
}
