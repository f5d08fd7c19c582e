//! Session behavior against the simulated cluster

mod common;

use metastore_core::abstractions::StoreDriver;
use metastore_core::error::BackendError;
use metastore_core::memory_backend::{FaultPoint, MemoryCluster};
use metastore_core::types::Predicate;
use metastore_core::{ErrorCategory, Key, LockMode, MetastoreError, Query, Record, Session, Zone};
use pretty_assertions::assert_eq;

async fn open_session(cluster: &MemoryCluster) -> Session {
    let client = cluster
        .connect(&common::zone_config(Zone::Local))
        .await
        .unwrap();
    Session::new(client.open_session().await.unwrap())
}

fn inode(id: i64, parent: i64, name: &str) -> Record {
    Record::new("inodes", id)
        .with("parent_id", parent)
        .with("name", name)
}

#[tokio::test]
async fn test_nested_transaction_is_rejected() {
    let cluster = MemoryCluster::new("local");
    let mut session = open_session(&cluster).await;

    session.begin_transaction().await.unwrap();
    let err = session.begin_transaction().await.unwrap_err();
    assert!(matches!(err, MetastoreError::TransactionAlreadyActive));

    // The outer transaction is still usable
    assert!(session.is_transaction_active());
    session.persist(inode(1, 0, "root")).await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(cluster.rows("inodes").len(), 1);
}

#[tokio::test]
async fn test_commit_and_rollback_require_a_transaction() {
    let cluster = MemoryCluster::new("local");
    let mut session = open_session(&cluster).await;

    assert!(matches!(
        session.commit().await,
        Err(MetastoreError::NoActiveTransaction)
    ));
    assert!(matches!(
        session.rollback().await,
        Err(MetastoreError::NoActiveTransaction)
    ));

    // Neither call reached the backend: a queued commit fault is still pending
    cluster.inject_fault(FaultPoint::Commit, BackendError::client("should stay queued"));
    assert!(matches!(
        session.commit().await,
        Err(MetastoreError::NoActiveTransaction)
    ));
    session.begin_transaction().await.unwrap();
    assert!(session.commit().await.is_err());
}

#[tokio::test]
async fn test_transaction_ends_even_when_commit_fails() {
    let cluster = MemoryCluster::new("local");
    let mut session = open_session(&cluster).await;

    session.begin_transaction().await.unwrap();
    session.save(inode(1, 0, "root")).await.unwrap();
    cluster.inject_fault(FaultPoint::Commit, BackendError::datastore(10, 266, "lock wait timeout"));

    let err = session.commit().await.unwrap_err();
    assert_eq!(err.category(), Some(ErrorCategory::Transient));
    assert!(err.is_retryable());
    assert!(!session.is_transaction_active());
    assert!(cluster.rows("inodes").is_empty());

    session.begin_transaction().await.unwrap();
}

#[tokio::test]
async fn test_failures_are_classified() {
    let cluster = MemoryCluster::new("local");
    cluster.seed(inode(1, 0, "root"));
    let mut session = open_session(&cluster).await;

    let err = session.persist(inode(1, 0, "again")).await.unwrap_err();
    assert_eq!(err.category(), Some(ErrorCategory::DuplicateKey));
    assert!(err.is_domain_error());

    cluster.inject_fault(
        FaultPoint::Operation,
        BackendError::datastore(3, 255, "foreign key constraint violation"),
    );
    let err = session.save(inode(2, 99, "orphan")).await.unwrap_err();
    assert_eq!(err.category(), Some(ErrorCategory::ForeignKeyViolation));

    cluster.inject_fault(FaultPoint::Operation, BackendError::client("driver bug"));
    let err = session.find("inodes", &Key::from(1)).await.unwrap_err();
    assert_eq!(err.category(), Some(ErrorCategory::Unknown));
    assert!(!err.is_retryable());

    cluster.go_down();
    let err = session.find("inodes", &Key::from(1)).await.unwrap_err();
    assert_eq!(err.category(), Some(ErrorCategory::ClusterFailure));
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_crud_and_batches() {
    let cluster = MemoryCluster::new("local");
    let mut session = open_session(&cluster).await;

    session
        .persist_all(vec![inode(1, 0, "root"), inode(2, 1, "a"), inode(3, 1, "b")])
        .await
        .unwrap();
    session
        .update(inode(2, 1, "renamed"))
        .await
        .unwrap();
    let found = session.find("inodes", &Key::from(2)).await.unwrap().unwrap();
    assert_eq!(found.get("name"), Some(&serde_json::json!("renamed")));

    let err = session.update(inode(9, 1, "missing")).await.unwrap_err();
    assert_eq!(err.category(), Some(ErrorCategory::Unknown));

    session.delete("inodes", Key::from(3)).await.unwrap();
    assert!(session.find("inodes", &Key::from(3)).await.unwrap().is_none());

    session
        .save_all(vec![inode(4, 1, "c"), inode(5, 1, "d")])
        .await
        .unwrap();
    session
        .delete_all("inodes", vec![Key::from(4), Key::from(5)])
        .await
        .unwrap();
    assert_eq!(cluster.rows("inodes").len(), 2);

    assert_eq!(session.delete_table("inodes").await.unwrap(), 2);
    assert!(cluster.rows("inodes").is_empty());
}

#[tokio::test]
async fn test_query_with_predicates_and_limit() {
    let cluster = MemoryCluster::new("local");
    for (id, parent, name) in [(1, 0, "root"), (2, 1, "a"), (3, 1, "b"), (4, 2, "c")] {
        cluster.seed(inode(id, parent, name));
    }
    let mut session = open_session(&cluster).await;

    let children = session
        .query(&Query::table("inodes").filter(Predicate::eq("parent_id", 1)))
        .await
        .unwrap();
    assert_eq!(children.len(), 2);

    let not_b = session
        .query(
            &Query::table("inodes")
                .filter(Predicate::eq("parent_id", 1))
                .filter(Predicate::eq("name", "b").negate()),
        )
        .await
        .unwrap();
    assert_eq!(not_b.len(), 1);
    assert_eq!(not_b[0].key, Key::from(2));

    let limited = session
        .query(&Query::table("inodes").limit(3))
        .await
        .unwrap();
    assert_eq!(limited.len(), 3);
}

#[tokio::test]
async fn test_lock_mode_defaults_to_read_committed() {
    let cluster = MemoryCluster::new("local");
    let mut session = open_session(&cluster).await;

    assert_eq!(session.lock_mode(), LockMode::ReadCommitted);
    session.set_lock_mode(LockMode::Exclusive).await.unwrap();
    assert_eq!(session.lock_mode(), LockMode::Exclusive);

    // A rejected change keeps the previous mode
    cluster.inject_fault(FaultPoint::Operation, BackendError::client("rejected"));
    assert!(session.set_lock_mode(LockMode::Shared).await.is_err());
    assert_eq!(session.lock_mode(), LockMode::Exclusive);
}

#[tokio::test]
async fn test_closed_session_rejects_operations() {
    let cluster = MemoryCluster::new("local");
    let mut session = open_session(&cluster).await;

    session.close().unwrap();
    session.close().unwrap();
    assert!(session.is_closed());
    assert_eq!(cluster.open_sessions(), 0);

    assert!(matches!(
        session.find("inodes", &Key::from(1)).await,
        Err(MetastoreError::SessionClosed)
    ));
    assert!(matches!(
        session.begin_transaction().await,
        Err(MetastoreError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_dropping_a_session_closes_it() {
    let cluster = MemoryCluster::new("local");
    {
        let _session = open_session(&cluster).await;
        assert_eq!(cluster.open_sessions(), 1);
    }
    assert_eq!(cluster.open_sessions(), 0);
}
