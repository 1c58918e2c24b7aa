//! User entity model.
//!
//! Account creation and authentication belong to the auth service; this
//! schema reads users for ownership checks and mutates only
//! `credits_balance`, always through the ledger's guarded update.

use sqlx::FromRow;
use stillpoint_core::types::{DbId, Timestamp};

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub email: String,
    /// 1 = user, 2 = admin.
    pub role_id: i16,
    pub credits_balance: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
