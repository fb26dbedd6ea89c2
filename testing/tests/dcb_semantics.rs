//! End-to-end DCB behavior against the in-memory backend.
//!
//! These are the core contract scenarios: commutative concurrent appends,
//! non-commutative conflicts, idempotent creation, multi-entity boundaries,
//! snapshot visibility, and ordering under contention. The same behavior is
//! exercised against `PostgreSQL` in the `dcb-postgres` integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use dcb_core::{
    AppendCondition, AppendOutcome, Cursor, EventLog, EventLogError, Position, Query, QueryItem,
    Tag,
};
use dcb_testing::fixtures::event;
use dcb_testing::InMemoryEventLog;
use futures::StreamExt;

fn wallet_tag(id: &str) -> Tag {
    Tag::new("wallet", id).expect("valid tag")
}

fn wallet_query(id: &str) -> Query {
    Query::of(QueryItem::tagged(wallet_tag(id)))
}

async fn collect(log: &InMemoryEventLog, query: Query) -> Vec<dcb_core::StoredEvent> {
    log.scan(query, Cursor::zero(), None)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|r| r.expect("scan should succeed"))
        .collect()
}

// Scenario: commutative concurrent deposits both land.
#[tokio::test]
async fn concurrent_unconditional_deposits_both_succeed() {
    let log = InMemoryEventLog::new();

    let (a, b) = tokio::join!(
        log.append_if(
            vec![event("DepositMade", &[("wallet", "w1")])],
            AppendCondition::Unconditional,
        ),
        log.append_if(
            vec![event("DepositMade", &[("wallet", "w1")])],
            AppendCondition::Unconditional,
        ),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert_ne!(a.events()[0].position, b.events()[0].position);

    let deposits = collect(&log, wallet_query("w1")).await;
    assert_eq!(deposits.len(), 2);
}

// Scenario: a stale cursor on a non-commutative operation conflicts.
#[tokio::test]
async fn stale_cursor_conflicts() {
    let log = InMemoryEventLog::new();
    log.append(vec![event("WalletOpened", &[("wallet", "w1")])])
        .await
        .unwrap();

    // Both sides observe the same state.
    let cursor = log.head().await.unwrap();

    // X withdraws first.
    let x = log
        .append_if(
            vec![event("WithdrawalMade", &[("wallet", "w1")])],
            AppendCondition::after(cursor.clone()).when_changed(wallet_query("w1")),
        )
        .await;
    assert!(matches!(x, Ok(AppendOutcome::Appended(_))));

    // Y's decision is now stale.
    let y = log
        .append_if(
            vec![event("WithdrawalMade", &[("wallet", "w1")])],
            AppendCondition::after(cursor).when_changed(wallet_query("w1")),
        )
        .await;
    match y {
        Err(EventLogError::ConcurrencyConflict {
            matching_count,
            first_conflicting_position,
        }) => {
            assert!(matching_count >= 1);
            assert_eq!(first_conflicting_position, Some(Position::new(2)));
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    // Nothing from the failed attempt landed.
    assert_eq!(log.len(), 2);
}

// Scenario: create-or-return semantics for entity creation.
#[tokio::test]
async fn idempotent_creation_returns_existing_event() {
    let log = InMemoryEventLog::new();
    let criterion = QueryItem::of_type("WalletOpened").with_tag(wallet_tag("w1"));

    let first = log
        .append_if(
            vec![event("WalletOpened", &[("wallet", "w1")])],
            AppendCondition::idempotent_create(criterion.clone()),
        )
        .await
        .unwrap();
    assert!(matches!(first, AppendOutcome::Appended(_)));
    assert_eq!(first.events()[0].position, Position::new(1));

    let second = log
        .append_if(
            vec![event("WalletOpened", &[("wallet", "w1")])],
            AppendCondition::idempotent_create(criterion),
        )
        .await
        .unwrap();
    assert!(second.is_replay());
    assert_eq!(second.events()[0].position, Position::new(1));

    // The log still has exactly one opening event; no position burned.
    assert_eq!(log.len(), 1);
    let next = log.append(vec![event("Other", &[])]).await.unwrap();
    assert_eq!(next[0].position, Position::new(2));
}

// Scenario: a combined two-wallet boundary conflicts on either member but
// not on unrelated entities.
#[tokio::test]
async fn transfer_boundary_spans_both_wallets_only() {
    let log = InMemoryEventLog::new();
    log.append(vec![
        event("WalletOpened", &[("wallet", "w1")]),
        event("WalletOpened", &[("wallet", "w2")]),
        event("WalletOpened", &[("wallet", "w3")]),
    ])
    .await
    .unwrap();

    let both = Query::any_of([
        QueryItem::tagged(wallet_tag("w1")),
        QueryItem::tagged(wallet_tag("w2")),
    ]);
    let cursor = log.head().await.unwrap();

    // Unrelated wallet w3 moves; the transfer must not conflict.
    log.append(vec![event("DepositMade", &[("wallet", "w3")])])
        .await
        .unwrap();

    let transfer = log
        .append_if(
            vec![event(
                "MoneyTransferred",
                &[("from", "w1"), ("to", "w2"), ("wallet", "w1"), ("wallet", "w2")],
            )],
            AppendCondition::after(cursor.clone()).when_changed(both.clone()),
        )
        .await;
    assert!(transfer.is_ok());

    // A second attempt from the same cursor now conflicts: the transfer
    // itself touched w1 and w2.
    let stale = log
        .append_if(
            vec![event("WithdrawalMade", &[("wallet", "w1")])],
            AppendCondition::after(cursor).when_changed(both),
        )
        .await;
    assert!(matches!(stale, Err(e) if e.is_conflict()));
}

// Scenario: a scan started before a commit does not observe it.
#[tokio::test]
async fn scan_reads_a_stable_snapshot() {
    let log = InMemoryEventLog::new();
    log.append(vec![event("A", &[])]).await.unwrap();

    let mut long_scan = log.scan(Query::all(), Cursor::zero(), None);
    log.append(vec![event("B", &[])]).await.unwrap();

    let mut seen = 0;
    while let Some(item) = long_scan.next().await {
        item.unwrap();
        seen += 1;
    }
    assert_eq!(seen, 1);

    // A scan started after the commit sees both.
    assert_eq!(collect(&log, Query::all()).await.len(), 2);
}

// Scenario: contended unconditional appends produce the contiguous
// position set 1..=N with no duplicates.
#[tokio::test]
async fn contended_appends_stay_gap_free() {
    let log = InMemoryEventLog::new();
    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let log = log.clone();
            tokio::spawn(async move {
                let worker = i.to_string();
                log.append(vec![event("Ping", &[("worker", worker.as_str())])])
                    .await
                    .unwrap()[0]
                    .position
                    .get()
            })
        })
        .collect();

    let mut positions = Vec::new();
    for task in tasks {
        positions.push(task.await.unwrap());
    }
    positions.sort_unstable();
    assert_eq!(positions, (1..=100).collect::<Vec<u64>>());
}

// A cursor past the end of the log trivially passes the conflict check.
#[tokio::test]
async fn future_cursor_does_not_conflict() {
    let log = InMemoryEventLog::new();
    log.append(vec![event("A", &[("wallet", "w1")])])
        .await
        .unwrap();

    let future = Cursor::new(
        Position::new(1_000),
        chrono::Utc::now(),
        dcb_core::TransactionId::new("999"),
    );
    let result = log
        .append_if(
            vec![event("B", &[("wallet", "w1")])],
            AppendCondition::after(future).when_changed(wallet_query("w1")),
        )
        .await;
    assert!(result.is_ok());
}

// An empty criterion with a non-zero cursor degenerates to unconditional.
#[tokio::test]
async fn empty_criterion_ignores_cursor() {
    let log = InMemoryEventLog::new();
    log.append(vec![event("A", &[])]).await.unwrap();

    let stale = Cursor::zero();
    let result = log
        .append_if(
            vec![event("B", &[])],
            AppendCondition::after(stale).when_changed(Query::empty()),
        )
        .await;
    assert!(matches!(result, Ok(AppendOutcome::Appended(_))));
}

// Scan restartability: paging by the last seen cursor covers the log
// exactly once.
#[tokio::test]
async fn scan_pages_restart_from_last_cursor() {
    let log = InMemoryEventLog::new();
    for i in 0..10 {
        let n = i.to_string();
        log.append(vec![event("E", &[("n", n.as_str())])])
            .await
            .unwrap();
    }

    let mut cursor = Cursor::zero();
    let mut positions = Vec::new();
    loop {
        let page: Vec<_> = log
            .scan(Query::all(), cursor.clone(), Some(3))
            .collect::<Vec<_>>()
            .await;
        if page.is_empty() {
            break;
        }
        for item in page {
            let stored = item.unwrap();
            cursor = Cursor::from_event(&stored);
            positions.push(stored.position.get());
        }
    }
    assert_eq!(positions, (1..=10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn empty_batch_is_rejected_without_io() {
    let log = InMemoryEventLog::new();
    let result = log
        .append_if(Vec::new(), AppendCondition::Unconditional)
        .await;
    assert!(matches!(result, Err(EventLogError::InvalidInput(_))));
    assert!(log.is_empty());
}
