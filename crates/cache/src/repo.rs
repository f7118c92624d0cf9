//! SQLite implementation of [`ContentCache`].

use crate::error::{ErrorKind, Result};
use crate::models::RecordRow;
use crate::{ContentCache, Database, FieldPatch, FileRecord, ProcessResult};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tome_extract::ContentKind;

/// Repository for file records in the cache database.
///
/// In dry-run mode every read works as normal, but writes are logged and
/// discarded.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    fn sqlx_hates_paths(path: impl AsRef<Path>) -> Result<String> {
        Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
    }

    fn json(value: &impl serde::Serialize, what: &'static str) -> Result<String> {
        serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData(what))
    }

    fn skip_write(&self, operation: &'static str) -> bool {
        if self.dry_run {
            tracing::debug!(operation, "dry run, skipping cache write");
        }
        self.dry_run
    }

    async fn upsert(&self, tx: &mut sqlx::SqliteConnection, result: &ProcessResult) -> Result<()> {
        let path = Self::sqlx_hates_paths(&result.path)?;
        let query = match &result.patch {
            FieldPatch::Tags(tags) => {
                sqlx::query(include_str!("../queries/upsert_tags.sql")).bind(path).bind(Self::json(tags, "tags")?)
            },
            FieldPatch::Preview(preview) => {
                sqlx::query(include_str!("../queries/upsert_preview.sql")).bind(path).bind(preview.clone())
            },
            FieldPatch::Metadata(metadata) => sqlx::query(include_str!("../queries/upsert_metadata.sql"))
                .bind(path)
                .bind(Self::json(metadata, "metadata")?),
            FieldPatch::FeatureImage(feature) => {
                let provider = feature.provider.as_deref().map(Self::sqlx_hates_paths).transpose()?;
                sqlx::query(include_str!("../queries/upsert_feature_image.sql"))
                    .bind(path)
                    .bind(feature.image.clone())
                    .bind(feature.resized.clone())
                    .bind(provider)
            },
        };
        query.execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[async_trait]
impl ContentCache for Repository {
    async fn get_record(&self, path: &Path) -> Result<Option<FileRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/get_record.sql"))
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FileRecord::try_from).transpose()
    }

    async fn batch_update(&self, results: &[ProcessResult]) -> Result<()> {
        if results.is_empty() || self.skip_write("batch_update") {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for result in results {
            self.upsert(&mut tx, result).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn update_mtimes(&self, kind: ContentKind, mtimes: &[(PathBuf, i64)]) -> Result<()> {
        if mtimes.is_empty() || self.skip_write("update_mtimes") {
            return Ok(());
        }
        let sql = match kind {
            ContentKind::Tags => include_str!("../queries/stamp_tags.sql"),
            ContentKind::Preview => include_str!("../queries/stamp_preview.sql"),
            ContentKind::Metadata => include_str!("../queries/stamp_metadata.sql"),
            ContentKind::FeatureImage => include_str!("../queries/stamp_feature_image.sql"),
        };
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for (path, mtime) in mtimes {
            sqlx::query(sql)
                .bind(Self::sqlx_hates_paths(path)?)
                .bind(*mtime)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn clear_field(&self, kind: ContentKind) -> Result<()> {
        if self.skip_write("clear_field") {
            return Ok(());
        }
        let sql = match kind {
            ContentKind::Tags => include_str!("../queries/clear_tags.sql"),
            ContentKind::Preview => include_str!("../queries/clear_preview.sql"),
            ContentKind::Metadata => include_str!("../queries/clear_metadata.sql"),
            ContentKind::FeatureImage => include_str!("../queries/clear_feature_image.sql"),
        };
        let cleared = sqlx::query(sql).execute(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(%kind, records = cleared.rows_affected(), "cleared cached field");
        Ok(())
    }

    async fn record_exists(&self, path: &Path) -> Result<bool> {
        sqlx::query_scalar(include_str!("../queries/record_exists.sql"))
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn set_consumers(&self, provider: &Path, consumers: &[PathBuf]) -> Result<()> {
        if self.skip_write("set_consumers") {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/set_consumers.sql"))
            .bind(Self::sqlx_hates_paths(provider)?)
            .bind(Self::json(&consumers, "feature image consumers")?)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn rename_record(&self, from: &Path, to: &Path) -> Result<()> {
        if from == to || self.skip_write("rename_record") {
            return Ok(());
        }
        let (from, to) = (Self::sqlx_hates_paths(from)?, Self::sqlx_hates_paths(to)?);
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_record.sql"))
            .bind(&to)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/rename_record.sql"))
            .bind(&from)
            .bind(&to)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete_record(&self, path: &Path) -> Result<()> {
        if self.skip_write("delete_record") {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/delete_record.sql"))
            .bind(Self::sqlx_hates_paths(path)?)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn list_paths(&self) -> Result<Vec<PathBuf>> {
        let paths: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_paths.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }
}
