//! Persisted episode states: downloaded files and paused transfers.

use crate::error::DatabaseError;
use crate::types::{ItemId, ResumeToken};
use crate::{Error, Result};
use std::path::Path;

use super::{Database, EpisodeRow, episode_status};

impl Database {
    /// Record an episode whose file is in the cache
    pub async fn upsert_downloaded(
        &self,
        id: &ItemId,
        source_url: &str,
        local_path: &Path,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let local_path = local_path.to_string_lossy().into_owned();

        sqlx::query(
            r#"
            INSERT INTO episodes (item_id, source_url, status, progress, local_path, resume_token, updated_at)
            VALUES (?, ?, ?, 1.0, ?, NULL, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                source_url = excluded.source_url,
                status = excluded.status,
                progress = excluded.progress,
                local_path = excluded.local_path,
                resume_token = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(source_url)
        .bind(episode_status::DOWNLOADED)
        .bind(&local_path)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record downloaded episode: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record a paused transfer with its resume token
    pub async fn upsert_paused(
        &self,
        id: &ItemId,
        source_url: &str,
        progress: f64,
        token: &ResumeToken,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO episodes (item_id, source_url, status, progress, local_path, resume_token, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                source_url = excluded.source_url,
                status = excluded.status,
                progress = excluded.progress,
                local_path = NULL,
                resume_token = excluded.resume_token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(source_url)
        .bind(episode_status::PAUSED)
        .bind(progress)
        .bind(token.as_bytes())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record paused episode: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Remove the stored state of an episode
    ///
    /// Returns whether a row existed.
    pub async fn delete_episode(&self, id: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM episodes WHERE item_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete episode: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the stored state of one episode
    pub async fn get_episode(&self, id: &ItemId) -> Result<Option<EpisodeRow>> {
        sqlx::query_as::<_, EpisodeRow>(
            r#"
            SELECT item_id, source_url, status, progress, local_path, resume_token, updated_at
            FROM episodes
            WHERE item_id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get episode: {}",
                e
            )))
        })
    }

    /// Every stored episode, oldest write first
    pub async fn load_episodes(&self) -> Result<Vec<EpisodeRow>> {
        sqlx::query_as::<_, EpisodeRow>(
            r#"
            SELECT item_id, source_url, status, progress, local_path, resume_token, updated_at
            FROM episodes
            ORDER BY updated_at ASC, item_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load episodes: {}",
                e
            )))
        })
    }
}
