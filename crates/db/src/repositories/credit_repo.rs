//! Credit ledger: atomic balance mutation plus the append-only
//! transaction log.
//!
//! The balance guard lives server-side in the UPDATE's WHERE clause.
//! Reading the balance first and deciding in application code would be
//! a TOCTOU race under concurrent submissions, so no method here ever
//! does that.

use sqlx::{PgConnection, PgPool};
use stillpoint_core::error::CoreError;
use stillpoint_core::types::DbId;

use crate::models::credit_transaction::CreditTransaction;
use crate::models::status::TxType;

/// Column list for `credit_transactions` queries.
const COLUMNS: &str = "id, user_id, amount, tx_type_id, description, external_ref, created_at";

/// Ledger operations over `users.credits_balance` and
/// `credit_transactions`.
pub struct CreditRepo;

impl CreditRepo {
    /// Atomically spend `amount` credits from a user's balance.
    ///
    /// Runs on a caller-supplied connection so the caller can make the
    /// reservation atomic with other writes (the submission service
    /// pairs it with the request insert in one transaction).
    ///
    /// The decrement only applies when `credits_balance >= amount`;
    /// zero affected rows means the balance was short and the call
    /// fails with [`CoreError::InsufficientCredits`] without writing
    /// anything. On success a matching `generation_spend` ledger row
    /// with `amount = -amount` is appended and the new balance
    /// returned.
    pub async fn reserve(
        conn: &mut PgConnection,
        user_id: DbId,
        amount: i64,
        description: &str,
    ) -> Result<i64, CoreError> {
        if amount <= 0 {
            return Err(CoreError::Validation(format!(
                "Reserve amount must be positive (got {amount})"
            )));
        }

        let new_balance: Option<i64> = sqlx::query_scalar(
            "UPDATE users \
             SET credits_balance = credits_balance - $2, updated_at = NOW() \
             WHERE id = $1 AND credits_balance >= $2 \
             RETURNING credits_balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await
        .map_err(internal)?;

        let Some(new_balance) = new_balance else {
            return Err(CoreError::InsufficientCredits { required: amount });
        };

        sqlx::query(
            "INSERT INTO credit_transactions (user_id, amount, tx_type_id, description) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(-amount)
        .bind(TxType::GenerationSpend.id())
        .bind(description)
        .execute(&mut *conn)
        .await
        .map_err(internal)?;

        Ok(new_balance)
    }

    /// Grant `amount` credits to a user (purchases, refunds).
    ///
    /// Increment and ledger append happen in one transaction.
    pub async fn grant(
        pool: &PgPool,
        user_id: DbId,
        amount: i64,
        tx_type: TxType,
        description: &str,
        external_ref: Option<&str>,
    ) -> Result<i64, CoreError> {
        if amount <= 0 {
            return Err(CoreError::Validation(format!(
                "Grant amount must be positive (got {amount})"
            )));
        }

        let mut tx = pool.begin().await.map_err(internal)?;

        let new_balance: Option<i64> = sqlx::query_scalar(
            "UPDATE users \
             SET credits_balance = credits_balance + $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING credits_balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?;

        let Some(new_balance) = new_balance else {
            return Err(CoreError::not_found("User", user_id));
        };

        sqlx::query(
            "INSERT INTO credit_transactions \
                 (user_id, amount, tx_type_id, description, external_ref) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(tx_type.id())
        .bind(description)
        .bind(external_ref)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        Ok(new_balance)
    }

    /// Current balance for a user.
    pub async fn balance_of(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT credits_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Ledger rows for a user, newest first.
    pub async fn transactions_for(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM credit_transactions \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Sum of all ledger amounts for a user. Equals the live balance at
    /// every committed state.
    pub async fn ledger_total(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM credit_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }
}

fn internal(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("Database error: {err}"))
}
