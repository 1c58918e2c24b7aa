//! Repository for the `users` table.
//!
//! Account lifecycle lives in the auth service; `create` exists for
//! tests and operational seeding. Balance mutation goes through
//! [`super::CreditRepo`] only.

use sqlx::PgPool;
use stillpoint_core::types::DbId;

use crate::models::user::User;

/// Column list for `users` queries.
const COLUMNS: &str = "id, email, role_id, credits_balance, created_at, updated_at";

/// Lookups (and test-only creation) for user accounts.
pub struct UserRepo;

impl UserRepo {
    /// Insert a user with an initial balance.
    pub async fn create(
        pool: &PgPool,
        email: &str,
        role_id: i16,
        credits_balance: i64,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, role_id, credits_balance) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .bind(role_id)
            .bind(credits_balance)
            .fetch_one(pool)
            .await
    }

    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
