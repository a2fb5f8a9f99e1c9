mod helpers;

use helpers::{add_memory, test_db, tokenizer};
use hypnos::memory::snapshots::{list_snapshots, record_snapshot, rollback_snapshot};
use hypnos::memory::store::{delete_memory, get_memory, update_memory, MemoryUpdate};
use hypnos::memory::types::{MemoryType, SnapshotAction};

#[test]
fn snapshot_update_rollback_round_trip() {
    // Snapshot, update, roll back: original content restored AND a new
    // snapshot of the modified state exists.
    let conn = test_db();
    let tok = tokenizer();

    let m = add_memory(&conn, &tok, "default", "version one of the fact", MemoryType::Knowledge);
    let snap = record_snapshot(&conn, &m.id, &m.content, Some("sync"), SnapshotAction::Update)
        .unwrap();
    update_memory(
        &conn,
        &tok,
        "default",
        &m.id,
        &MemoryUpdate::content("version two of the fact"),
    )
    .unwrap();

    rollback_snapshot(&conn, &tok, "default", &snap).unwrap();

    let restored = get_memory(&conn, "default", &m.id).unwrap().unwrap();
    assert_eq!(restored.content, "version one of the fact");

    let history = list_snapshots(&conn, "default", &m.id).unwrap();
    assert!(
        history.iter().any(|s| s.content == "version two of the fact"),
        "the modified state must be snapshotted by the rollback"
    );
}

#[test]
fn rollback_resyncs_search_index() {
    let conn = test_db();
    let tok = tokenizer();

    let m = add_memory(&conn, &tok, "default", "original searchable walrus", MemoryType::Knowledge);
    let snap = record_snapshot(&conn, &m.id, &m.content, None, SnapshotAction::Update).unwrap();
    update_memory(
        &conn,
        &tok,
        "default",
        &m.id,
        &MemoryUpdate::content("replacement searchable heron"),
    )
    .unwrap();

    rollback_snapshot(&conn, &tok, "default", &snap).unwrap();

    let hits =
        hypnos::memory::search::search_bm25(&conn, &tok, "default", "walrus", 10, 0.0).unwrap();
    assert_eq!(hits.len(), 1);
    let hits =
        hypnos::memory::search::search_bm25(&conn, &tok, "default", "heron", 10, 0.0).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn delete_memory_purges_history() {
    let conn = test_db();
    let tok = tokenizer();

    let m = add_memory(&conn, &tok, "default", "short lived memory", MemoryType::Event);
    record_snapshot(&conn, &m.id, &m.content, None, SnapshotAction::Create).unwrap();
    record_snapshot(&conn, &m.id, "older draft", None, SnapshotAction::Update).unwrap();

    delete_memory(&conn, "default", &m.id).unwrap();

    let remaining: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM snapshots WHERE memory_id = ?1",
            rusqlite::params![m.id],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn snapshot_listing_is_tenant_guarded() {
    let conn = test_db();
    let tok = tokenizer();

    let m = add_memory(&conn, &tok, "default", "guarded history", MemoryType::Knowledge);
    record_snapshot(&conn, &m.id, &m.content, None, SnapshotAction::Create).unwrap();

    assert!(list_snapshots(&conn, "other", &m.id).is_err());
    assert_eq!(list_snapshots(&conn, "default", &m.id).unwrap().len(), 1);
}
