//! Credit ledger entity model.
//!
//! Rows are append-only; there is no update path anywhere in the code.

use sqlx::FromRow;
use stillpoint_core::types::{DbId, Timestamp};

use super::status::TxType;

/// A row from the `credit_transactions` table.
///
/// `amount` is signed: positive rows grant credits, negative rows spend
/// them.
#[derive(Debug, Clone, FromRow)]
pub struct CreditTransaction {
    pub id: DbId,
    pub user_id: DbId,
    pub amount: i64,
    pub tx_type_id: i16,
    pub description: String,
    /// Payment-provider reference for purchases.
    pub external_ref: Option<String>,
    pub created_at: Timestamp,
}

impl CreditTransaction {
    /// Typed view of the transaction type column.
    pub fn tx_type(&self) -> Option<TxType> {
        TxType::from_id(self.tx_type_id).ok()
    }
}
