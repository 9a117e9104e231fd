use tracing::{debug, info};
use uuid::Uuid;

use tessera_db::blocks;
use tessera_types::MessagingError;
use tessera_types::models::UserBlock;

use crate::context::SharedContext;

pub struct BlockService {
    ctx: SharedContext,
}

impl BlockService {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Idempotent. Existing conversations and messages are left alone; the
    /// block only gates what the blocked user can send from now on.
    pub fn block_user(&self, blocker_id: Uuid, blocked_id: Uuid) -> Result<(), MessagingError> {
        if blocker_id == blocked_id {
            return Err(MessagingError::SelfTarget);
        }
        self.ctx.user(blocker_id)?;
        self.ctx.user(blocked_id)?;

        let now = self.ctx.now();
        let inserted = self
            .ctx
            .db
            .with_conn(|conn| blocks::insert(conn, blocker_id, blocked_id, now))?;

        if inserted {
            info!(blocker_id = %blocker_id, blocked_id = %blocked_id, "User blocked");
        } else {
            debug!(blocker_id = %blocker_id, blocked_id = %blocked_id, "Block already present");
        }
        Ok(())
    }

    pub fn unblock_user(&self, blocker_id: Uuid, blocked_id: Uuid) -> Result<(), MessagingError> {
        let removed = self
            .ctx
            .db
            .with_conn(|conn| blocks::delete(conn, blocker_id, blocked_id))?;
        if !removed {
            return Err(MessagingError::UserBlockNotFound);
        }

        info!(blocker_id = %blocker_id, blocked_id = %blocked_id, "User unblocked");
        Ok(())
    }

    /// Users `blocker_id` has blocked, most recent first.
    pub fn blocked_by(&self, blocker_id: Uuid) -> Result<Vec<UserBlock>, MessagingError> {
        Ok(self
            .ctx
            .db
            .with_conn(|conn| blocks::list_by_blocker(conn, blocker_id))?)
    }
}
