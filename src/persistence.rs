//! Persistence Gateway (C10, spec §4.10): CRUD for documents, extracted
//! fields, and enrichment metadata, scoped by owner id. Missing table is
//! treated as an empty result, not an error, to allow gradual schema
//! rollout.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::PipelineResult;
use crate::models::{Document, DocumentStatus, ExtractedField, ProcessingMode};

#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub status: Option<DocumentStatus>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub dedup_fingerprint: Option<String>,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_document(&self, document: &Document) -> PipelineResult<()>;
    async fn update_document(&self, owner_id: &str, document_id: Uuid, patch: DocumentPatch) -> PipelineResult<()>;
    async fn delete_document(&self, owner_id: &str, document_id: Uuid) -> PipelineResult<()>;
    async fn get_document(&self, owner_id: &str, document_id: Uuid) -> PipelineResult<Option<Document>>;
    async fn list_documents(&self, owner_id: &str, limit: i64, offset: i64) -> PipelineResult<Vec<Document>>;
    async fn create_fields(&self, owner_id: &str, document_id: Uuid, fields: Vec<ExtractedField>) -> PipelineResult<()>;
    async fn get_fields(&self, owner_id: &str, document_id: Uuid) -> PipelineResult<Vec<ExtractedField>>;
    async fn find_by_hash(&self, owner_id: &str, file_hash: &str) -> PipelineResult<Option<Document>>;
}

/// Postgres-backed gateway, grounded on the teacher's sqlx `FromRow` query
/// style in `src/models/invoice.rs`.
pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn is_missing_table(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42P01"))
    }
}

fn status_to_str(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Queued => "queued",
        DocumentStatus::Processing => "processing",
        DocumentStatus::Completed => "completed",
        DocumentStatus::Failed => "failed",
        DocumentStatus::Cancelled => "cancelled",
    }
}

fn str_to_status(s: &str) -> DocumentStatus {
    match s {
        "processing" => DocumentStatus::Processing,
        "completed" => DocumentStatus::Completed,
        "failed" => DocumentStatus::Failed,
        "cancelled" => DocumentStatus::Cancelled,
        _ => DocumentStatus::Queued,
    }
}

fn mode_to_str(mode: ProcessingMode) -> &'static str {
    match mode {
        ProcessingMode::CostEffective => "cost_effective",
        ProcessingMode::AccuracyFirst => "accuracy_first",
        ProcessingMode::SpeedFirst => "speed_first",
    }
}

fn str_to_mode(s: &str) -> ProcessingMode {
    match s {
        "accuracy_first" => ProcessingMode::AccuracyFirst,
        "speed_first" => ProcessingMode::SpeedFirst,
        _ => ProcessingMode::CostEffective,
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn create_document(&self, document: &Document) -> PipelineResult<()> {
        sqlx::query(
            "INSERT INTO documents (id, owner_id, filename, media_type, byte_size, file_hash, status, mode, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(document.id)
        .bind(&document.owner_id)
        .bind(&document.filename)
        .bind(&document.media_type)
        .bind(document.byte_size as i64)
        .bind(&document.file_hash)
        .bind(status_to_str(document.status))
        .bind(mode_to_str(document.mode))
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_document(&self, owner_id: &str, document_id: Uuid, patch: DocumentPatch) -> PipelineResult<()> {
        sqlx::query(
            "UPDATE documents SET \
             status = COALESCE($3, status), \
             started_at = COALESCE($4, started_at), \
             completed_at = COALESCE($5, completed_at), \
             error_kind = COALESCE($6, error_kind), \
             error_message = COALESCE($7, error_message), \
             dedup_fingerprint = COALESCE($8, dedup_fingerprint), \
             updated_at = now() \
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(document_id)
        .bind(owner_id)
        .bind(patch.status.map(status_to_str))
        .bind(patch.started_at)
        .bind(patch.completed_at)
        .bind(patch.error_kind)
        .bind(patch.error_message)
        .bind(patch.dedup_fingerprint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_document(&self, owner_id: &str, document_id: Uuid) -> PipelineResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM extracted_fields WHERE document_id = $1 AND owner_id = $2")
            .bind(document_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = $1 AND owner_id = $2")
            .bind(document_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, owner_id: &str, document_id: Uuid) -> PipelineResult<Option<Document>> {
        let row = match sqlx::query(
            "SELECT id, owner_id, filename, media_type, byte_size, file_hash, status, mode, created_at, started_at, completed_at, error_kind, error_message, dedup_fingerprint \
             FROM documents WHERE id = $1 AND owner_id = $2",
        )
        .bind(document_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(err) if Self::is_missing_table(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(row.map(|row| Document {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            filename: row.get("filename"),
            media_type: row.get("media_type"),
            byte_size: row.get::<i64, _>("byte_size") as u64,
            file_hash: row.get("file_hash"),
            status: str_to_status(row.get("status")),
            mode: str_to_mode(row.get("mode")),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            error_kind: row.get("error_kind"),
            error_message: row.get("error_message"),
            dedup_fingerprint: row.get("dedup_fingerprint"),
        }))
    }

    async fn list_documents(&self, owner_id: &str, limit: i64, offset: i64) -> PipelineResult<Vec<Document>> {
        let rows = match sqlx::query(
            "SELECT id, owner_id, filename, media_type, byte_size, file_hash, status, mode, created_at, started_at, completed_at, error_kind, error_message, dedup_fingerprint \
             FROM documents WHERE owner_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows,
            Err(err) if Self::is_missing_table(&err) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(rows
            .into_iter()
            .map(|row| Document {
                id: row.get("id"),
                owner_id: row.get("owner_id"),
                filename: row.get("filename"),
                media_type: row.get("media_type"),
                byte_size: row.get::<i64, _>("byte_size") as u64,
                file_hash: row.get("file_hash"),
                status: str_to_status(row.get("status")),
                mode: str_to_mode(row.get("mode")),
                created_at: row.get("created_at"),
                started_at: row.get("started_at"),
                completed_at: row.get("completed_at"),
                error_kind: row.get("error_kind"),
                error_message: row.get("error_message"),
                dedup_fingerprint: row.get("dedup_fingerprint"),
            })
            .collect())
    }

    async fn create_fields(&self, owner_id: &str, document_id: Uuid, fields: Vec<ExtractedField>) -> PipelineResult<()> {
        let mut tx = self.pool.begin().await?;
        for field in fields {
            sqlx::query(
                "INSERT INTO extracted_fields (document_id, owner_id, field_name, field_value, confidence, data_type) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(document_id)
            .bind(owner_id)
            .bind(&field.field_name)
            .bind(&field.field_value)
            .bind(field.confidence)
            .bind(&field.data_type)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_fields(&self, owner_id: &str, document_id: Uuid) -> PipelineResult<Vec<ExtractedField>> {
        let rows = match sqlx::query("SELECT document_id, field_name, field_value, confidence, data_type FROM extracted_fields WHERE document_id = $1 AND owner_id = $2")
            .bind(document_id)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(err) if Self::is_missing_table(&err) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(rows
            .into_iter()
            .map(|row| ExtractedField {
                document_id: row.get("document_id"),
                field_name: row.get("field_name"),
                field_value: row.get("field_value"),
                confidence: row.get("confidence"),
                data_type: row.get("data_type"),
            })
            .collect())
    }

    async fn find_by_hash(&self, owner_id: &str, file_hash: &str) -> PipelineResult<Option<Document>> {
        let row = match sqlx::query(
            "SELECT id, owner_id, filename, media_type, byte_size, file_hash, status, mode, created_at, started_at, completed_at, error_kind, error_message, dedup_fingerprint \
             FROM documents WHERE owner_id = $1 AND file_hash = $2 LIMIT 1",
        )
        .bind(owner_id)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(err) if Self::is_missing_table(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(row.map(|row| Document {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            filename: row.get("filename"),
            media_type: row.get("media_type"),
            byte_size: row.get::<i64, _>("byte_size") as u64,
            file_hash: row.get("file_hash"),
            status: str_to_status(row.get("status")),
            mode: str_to_mode(row.get("mode")),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            error_kind: row.get("error_kind"),
            error_message: row.get("error_message"),
            dedup_fingerprint: row.get("dedup_fingerprint"),
        }))
    }
}
