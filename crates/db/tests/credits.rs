//! Integration tests for the credit ledger: guarded reservation,
//! append-only log, and balance/ledger agreement under concurrency.

use sqlx::PgPool;
use stillpoint_core::error::CoreError;
use stillpoint_db::models::status::TxType;
use stillpoint_db::repositories::{CreditRepo, UserRepo};

async fn user_with_balance(pool: &PgPool, email: &str, balance: i64) -> i64 {
    UserRepo::create(pool, email, 1, balance)
        .await
        .expect("user creation should succeed")
        .id
}

/// A successful reserve decrements the balance and appends exactly one
/// matching spend row.
#[sqlx::test(migrations = "./migrations")]
async fn reserve_decrements_and_logs(pool: PgPool) {
    let user_id = user_with_balance(&pool, "reserve@test.com", 100).await;

    let mut tx = pool.begin().await.unwrap();
    let new_balance = CreditRepo::reserve(&mut *tx, user_id, 5, "Video generation (60s)")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(new_balance, 95);
    assert_eq!(CreditRepo::balance_of(&pool, user_id).await.unwrap(), 95);

    let txs = CreditRepo::transactions_for(&pool, user_id).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].amount, -5);
    assert_eq!(txs[0].tx_type(), Some(TxType::GenerationSpend));
}

/// A short balance fails with InsufficientCredits and writes nothing.
#[sqlx::test(migrations = "./migrations")]
async fn reserve_rejects_short_balance(pool: PgPool) {
    let user_id = user_with_balance(&pool, "short@test.com", 3).await;

    let mut tx = pool.begin().await.unwrap();
    let err = CreditRepo::reserve(&mut *tx, user_id, 5, "Video generation (60s)")
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();

    match err {
        CoreError::InsufficientCredits { required } => assert_eq!(required, 5),
        other => panic!("expected InsufficientCredits, got {other:?}"),
    }

    assert_eq!(CreditRepo::balance_of(&pool, user_id).await.unwrap(), 3);
    assert!(CreditRepo::transactions_for(&pool, user_id)
        .await
        .unwrap()
        .is_empty());
}

/// Reserving exactly the full balance succeeds and leaves zero.
#[sqlx::test(migrations = "./migrations")]
async fn reserve_exact_balance_leaves_zero(pool: PgPool) {
    let user_id = user_with_balance(&pool, "exact@test.com", 8).await;

    let mut tx = pool.begin().await.unwrap();
    let new_balance = CreditRepo::reserve(&mut *tx, user_id, 8, "Video generation (120s)")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(new_balance, 0);
}

/// A rolled-back reservation leaves no trace in balance or ledger.
#[sqlx::test(migrations = "./migrations")]
async fn rolled_back_reserve_is_invisible(pool: PgPool) {
    let user_id = user_with_balance(&pool, "rollback@test.com", 50).await;

    let mut tx = pool.begin().await.unwrap();
    CreditRepo::reserve(&mut *tx, user_id, 10, "Video generation (180s)")
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(CreditRepo::balance_of(&pool, user_id).await.unwrap(), 50);
    assert!(CreditRepo::transactions_for(&pool, user_id)
        .await
        .unwrap()
        .is_empty());
}

/// Concurrent reservations against one account never over-spend: the
/// final balance equals the starting balance minus the successful
/// spends, the ledger sums to the balance, and the balance never goes
/// negative (the CHECK constraint would abort the transaction).
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_reserves_never_overspend(pool: PgPool) {
    // Balance 20 with 10 concurrent 5-credit spends: exactly 4 can win.
    let user_id = user_with_balance(&pool, "race@test.com", 20).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = pool.begin().await.unwrap();
            let result = CreditRepo::reserve(&mut *tx, user_id, 5, "Video generation (60s)").await;
            match result {
                Ok(_) => {
                    tx.commit().await.unwrap();
                    true
                }
                Err(CoreError::InsufficientCredits { .. }) => {
                    tx.rollback().await.unwrap();
                    false
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 4);
    assert_eq!(CreditRepo::balance_of(&pool, user_id).await.unwrap(), 0);
    assert_eq!(CreditRepo::ledger_total(&pool, user_id).await.unwrap(), -20);

    let txs = CreditRepo::transactions_for(&pool, user_id).await.unwrap();
    assert_eq!(txs.len(), 4);
    assert!(txs.iter().all(|t| t.amount == -5));
}

/// Grants increment the balance and append a positive ledger row.
#[sqlx::test(migrations = "./migrations")]
async fn grant_increments_and_logs(pool: PgPool) {
    let user_id = user_with_balance(&pool, "grant@test.com", 0).await;

    let new_balance = CreditRepo::grant(
        &pool,
        user_id,
        100,
        TxType::Purchase,
        "Credit pack purchase",
        Some("pay_abc123"),
    )
    .await
    .unwrap();

    assert_eq!(new_balance, 100);
    let txs = CreditRepo::transactions_for(&pool, user_id).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].amount, 100);
    assert_eq!(txs[0].tx_type(), Some(TxType::Purchase));
    assert_eq!(txs[0].external_ref.as_deref(), Some("pay_abc123"));
}

/// Grants to unknown users fail cleanly.
#[sqlx::test(migrations = "./migrations")]
async fn grant_unknown_user_fails(pool: PgPool) {
    let err = CreditRepo::grant(&pool, 9999, 10, TxType::Purchase, "Credit pack", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

/// Ledger totals equal the live balance after a mixed history.
#[sqlx::test(migrations = "./migrations")]
async fn ledger_total_tracks_balance(pool: PgPool) {
    let user_id = user_with_balance(&pool, "ledger@test.com", 0).await;

    CreditRepo::grant(&pool, user_id, 50, TxType::Purchase, "Credit pack", None)
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    CreditRepo::reserve(&mut *tx, user_id, 12, "Video generation (180s)")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    CreditRepo::grant(&pool, user_id, 12, TxType::Refund, "Support refund", None)
        .await
        .unwrap();

    let balance = CreditRepo::balance_of(&pool, user_id).await.unwrap();
    let total = CreditRepo::ledger_total(&pool, user_id).await.unwrap();
    assert_eq!(balance, 50);
    assert_eq!(total, balance);
}
