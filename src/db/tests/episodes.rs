use crate::db::*;
use crate::types::{ItemId, ResumeToken};
use std::path::Path;
use tempfile::NamedTempFile;

fn item(n: u32) -> ItemId {
    ItemId::parse(&format!("https://cdn.example.com/show/ep{n}.mp3")).unwrap()
}

#[tokio::test]
async fn test_upsert_downloaded_and_get() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.upsert_downloaded(&item(1), item(1).as_str(), Path::new("/cache/one.mp3"))
        .await
        .unwrap();

    let row = db.get_episode(&item(1)).await.unwrap().unwrap();
    assert_eq!(row.item_id, item(1).as_str());
    assert_eq!(row.status, episode_status::DOWNLOADED);
    assert_eq!(row.local_path.as_deref(), Some("/cache/one.mp3"));
    assert!(row.resume_token.is_none());
    assert_eq!(row.progress, 1.0);

    db.close().await;
}

#[tokio::test]
async fn test_upsert_paused_keeps_token_bytes_verbatim() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let token = ResumeToken::from_bytes(vec![0, 1, 2, 254, 255]);
    db.upsert_paused(&item(1), item(1).as_str(), 0.5, &token)
        .await
        .unwrap();

    let row = db.get_episode(&item(1)).await.unwrap().unwrap();
    assert_eq!(row.status, episode_status::PAUSED);
    assert_eq!(row.progress, 0.5);
    assert_eq!(row.resume_token, Some(vec![0, 1, 2, 254, 255]));
    assert!(row.local_path.is_none());

    db.close().await;
}

#[tokio::test]
async fn test_upsert_replaces_previous_state() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let token = ResumeToken::from_bytes(b"token".to_vec());
    db.upsert_paused(&item(1), item(1).as_str(), 0.25, &token)
        .await
        .unwrap();
    db.upsert_downloaded(&item(1), item(1).as_str(), Path::new("/cache/one.mp3"))
        .await
        .unwrap();

    let rows = db.load_episodes().await.unwrap();
    assert_eq!(rows.len(), 1, "one row per item");
    assert_eq!(rows[0].status, episode_status::DOWNLOADED);
    assert!(
        rows[0].resume_token.is_none(),
        "downloaded row must not keep the old token"
    );

    db.close().await;
}

#[tokio::test]
async fn test_delete_episode() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.upsert_downloaded(&item(1), item(1).as_str(), Path::new("/cache/one.mp3"))
        .await
        .unwrap();

    assert!(db.delete_episode(&item(1)).await.unwrap());
    assert!(!db.delete_episode(&item(1)).await.unwrap());
    assert!(db.get_episode(&item(1)).await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_load_episodes_lists_every_item() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let token = ResumeToken::from_bytes(b"t".to_vec());
    db.upsert_downloaded(&item(1), item(1).as_str(), Path::new("/cache/one.mp3"))
        .await
        .unwrap();
    db.upsert_paused(&item(2), item(2).as_str(), 0.4, &token)
        .await
        .unwrap();
    db.upsert_paused(&item(3), item(3).as_str(), 0.1, &token)
        .await
        .unwrap();

    let mut ids: Vec<String> = db
        .load_episodes()
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.item_id)
        .collect();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            item(1).as_str().to_string(),
            item(2).as_str().to_string(),
            item(3).as_str().to_string()
        ]
    );

    db.close().await;
}

#[tokio::test]
async fn test_rows_survive_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let db = Database::new(temp_file.path()).await.unwrap();
        db.upsert_paused(
            &item(1),
            item(1).as_str(),
            0.5,
            &ResumeToken::from_bytes(b"resume".to_vec()),
        )
        .await
        .unwrap();
        db.close().await;
    }

    let db = Database::new(temp_file.path()).await.unwrap();
    let row = db.get_episode(&item(1)).await.unwrap().unwrap();
    assert_eq!(row.resume_token, Some(b"resume".to_vec()));
    db.close().await;
}
