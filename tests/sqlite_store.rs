//! Integration tests for the SQLite document store.
//!
//! Most tests use an in-memory database; persistence tests use a scratch
//! directory so the file can be reopened.

use wildcat::catalog::{CatalogGateway, Collection, ContentRecord, RecordDraft};
use wildcat::store::{
    Direction, DocumentStore, MemoryBlobStore, SortField, SqliteDocumentStore, StoreError,
};

use std::sync::Arc;

async fn test_db() -> SqliteDocumentStore {
    SqliteDocumentStore::open(":memory:").await.unwrap()
}

fn record(title: &str, link: &str, date: i64) -> ContentRecord {
    ContentRecord {
        id: None,
        title: title.to_string(),
        description: format!("About {}", title),
        link: link.to_string(),
        date,
        youtube_id: None,
        local_path: None,
        checklist: None,
        cover_photo: None,
        thumbnail: None,
    }
}

#[tokio::test]
async fn test_query_orders_by_date_within_collection() {
    let db = test_db().await;
    db.insert(Collection::News, &record("mid", "", 2)).await.unwrap();
    db.insert(Collection::News, &record("new", "", 3)).await.unwrap();
    db.insert(Collection::News, &record("old", "", 1)).await.unwrap();
    db.insert(Collection::Videos, &record("other", "", 9)).await.unwrap();

    let desc = db
        .query(Collection::News, SortField::Date, Direction::Descending)
        .await
        .unwrap();
    let titles: Vec<&str> = desc.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["new", "mid", "old"]);

    let asc = db
        .query(Collection::News, SortField::Date, Direction::Ascending)
        .await
        .unwrap();
    let titles: Vec<&str> = asc.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["old", "mid", "new"]);
}

#[tokio::test]
async fn test_round_trip_keeps_kind_fields() {
    let db = test_db().await;
    let mut article = record("Trade report", "https://example.com/r", 7);
    article.checklist = Some("CITES Appendix I".to_string());
    article.cover_photo = Some("https://example.com/c.png".to_string());

    let id = db.insert(Collection::Articles, &article).await.unwrap();
    let stored = db
        .query(Collection::Articles, SortField::Date, Direction::Descending)
        .await
        .unwrap();

    assert_eq!(stored.len(), 1);
    article.id = Some(id);
    assert_eq!(stored[0], article);
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let db = test_db().await;
    let id = db.insert(Collection::Videos, &record("v", "", 1)).await.unwrap();

    // Ids are scoped to their collection.
    assert!(matches!(
        db.delete(Collection::News, &id).await,
        Err(StoreError::NotFound(_))
    ));
    db.delete(Collection::Videos, &id).await.unwrap();
    assert!(matches!(
        db.delete(Collection::Videos, &id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let path = path.to_str().unwrap();

    {
        let db = SqliteDocumentStore::open(path).await.unwrap();
        db.insert(Collection::News, &record("kept", "https://example.com/k", 1))
            .await
            .unwrap();
    }

    let db = SqliteDocumentStore::open(path).await.unwrap();
    assert_eq!(db.count().await.unwrap(), 1);
    let news = db
        .query(Collection::News, SortField::Date, Direction::Descending)
        .await
        .unwrap();
    assert_eq!(news[0].title, "kept");
}

#[cfg(unix)]
#[tokio::test]
async fn test_database_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let _db = SqliteDocumentStore::open(path.to_str().unwrap())
        .await
        .unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_gateway_over_sqlite_dedups_news() {
    let db = Arc::new(test_db().await);
    db.insert(Collection::News, &record("Rhino horn seizure", "https://example.com/a", 2))
        .await
        .unwrap();
    db.insert(Collection::News, &record("Rhino horn seizure", "https://example.com/b", 1))
        .await
        .unwrap();

    let gateway = CatalogGateway::new(
        db.clone(),
        Arc::new(MemoryBlobStore::new()),
        reqwest::Client::new(),
    );

    let loaded = gateway.load_collection("news").await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].link, "https://example.com/a");
    assert_eq!(db.count().await.unwrap(), 1);

    // Writing the surviving link again is refused.
    let draft = RecordDraft {
        title: Some("Repost".to_string()),
        link: Some("https://example.com/a".to_string()),
        ..RecordDraft::default()
    };
    assert!(!gateway.write_record("news", vec![draft]).await);
    assert_eq!(db.count().await.unwrap(), 1);
}
