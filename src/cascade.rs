//! Deletion of files, custom documents and whole clients.
//!
//! Each operation is one linear pass: resolve the rows, remove the stored
//! objects, then delete rows children first. A failure part way through may
//! leave a row whose object is gone, never an object without its row. Row
//! deletes are attempted hard first and fall back to setting `deleted_at`
//! per table.
//!
//! Nothing here is atomic. Every step after resolution is idempotent; a
//! failed operation is retried by calling it again.

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{FileRow, ObjectLocation};
use crate::privilege::{Grant, GrantKind};
use crate::records::{FileScope, RecordStore, RowSet, Table};
use crate::removal::{Batching, StorageRemover, REMOVE_BATCH_SIZE};
use crate::resolve::RecordResolver;
use crate::storage::ObjectStorage;

const STORAGE_POLICY_HINT: &str =
    "configure a delete policy on storage or set SUPABASE_SERVICE_ROLE_KEY on the server";
const ROW_POLICY_HINT: &str =
    "allow delete/update in the row-level security policies or set SUPABASE_SERVICE_ROLE_KEY on the server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    File,
    Document,
    Client,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::File => "File",
            Resource::Document => "Document",
            Resource::Client => "Client",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Only a `deleted_at` update was attempted.
    Update,
    /// A hard delete and its soft-delete fallback.
    Delete,
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("{0} not found")]
    NotFound(Resource),
    #[error("{name} is a predefined document and cannot be deleted")]
    Ineligible { name: String },
    #[error("file row has no storage location")]
    InvalidFileRow,
    #[error("database read failed: {0}")]
    Read(String),
    #[error("storage delete failed ({grant} access): {message}")]
    Storage { message: String, grant: GrantKind },
    #[error("{table} write failed ({grant} access): {message}")]
    Write {
        table: &'static str,
        kind: WriteKind,
        message: String,
        grant: GrantKind,
    },
}

impl CascadeError {
    pub(crate) fn read(err: anyhow::Error) -> Self {
        CascadeError::Read(format!("{err:#}"))
    }
}

impl From<CascadeError> for AppError {
    fn from(value: CascadeError) -> Self {
        match value {
            CascadeError::NotFound(resource) => AppError::not_found(format!("{resource} not found")),
            CascadeError::Ineligible { .. } => AppError::forbidden("Forbidden")
                .with_details("only custom documents (\"other\" with an alias) can be deleted"),
            CascadeError::InvalidFileRow => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Invalid file row")
            }
            CascadeError::Read(message) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "DB error").with_details(message)
            }
            CascadeError::Storage {
                message,
                grant: GrantKind::Caller,
            } => AppError::forbidden("Storage delete forbidden")
                .with_details(format!("{message} ({STORAGE_POLICY_HINT})")),
            CascadeError::Storage {
                message,
                grant: GrantKind::Elevated,
            } => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Storage delete failed")
                .with_details(message),
            CascadeError::Write {
                kind,
                message,
                grant,
                ..
            } => {
                let noun = match kind {
                    WriteKind::Update => "DB update",
                    WriteKind::Delete => "DB write",
                };
                match grant {
                    GrantKind::Caller => AppError::forbidden(format!("{noun} forbidden"))
                        .with_details(format!("{message} ({ROW_POLICY_HINT})")),
                    GrantKind::Elevated => AppError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("{noun} failed"),
                    )
                    .with_details(message),
                }
            }
        }
    }
}

/// How a set of rows ended up deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Hard,
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    /// File rows targeted by the deletion, whether or not they still had an
    /// object in storage.
    pub removed_files: usize,
    /// Tables whose rows were marked deleted instead of removed, in
    /// deletion order.
    pub soft_deleted: Vec<Table>,
}

impl DeletionReport {
    fn new(removed_files: usize) -> Self {
        Self {
            removed_files,
            soft_deleted: Vec::new(),
        }
    }

    fn record(&mut self, table: Table, mode: DeleteMode) {
        if mode == DeleteMode::Soft {
            self.soft_deleted.push(table);
        }
    }
}

pub struct CascadeExecutor {
    records: Arc<dyn RecordStore>,
    resolver: RecordResolver,
    remover: StorageRemover,
    grant: Grant,
}

impl CascadeExecutor {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        grant: Grant,
    ) -> Self {
        Self {
            resolver: RecordResolver::new(records.clone(), grant.clone()),
            remover: StorageRemover::new(storage, grant.clone()),
            records,
            grant,
        }
    }

    /// Removes a single file's object and marks its row deleted. The row is
    /// kept for auditing; an existing `deleted_at` is left untouched.
    pub async fn delete_file(
        &self,
        client_id: Uuid,
        file_id: Uuid,
    ) -> Result<DeletionReport, CascadeError> {
        let (file, location) = self.resolver.file(client_id, file_id).await?;

        let removed_objects = self.remover.remove([location], Batching::Single).await?;

        let at = file.deleted_at.unwrap_or_else(Utc::now);
        let rows = RowSet::File { client_id, file_id };
        if let Err(err) = self.records.soft_delete(&self.grant, rows, at).await {
            return Err(CascadeError::Write {
                table: rows.table().name(),
                kind: WriteKind::Update,
                message: format!("{err:#}"),
                grant: self.grant.kind(),
            });
        }

        info!(
            %client_id,
            %file_id,
            removed_objects,
            grant = %self.grant.kind(),
            "file deleted"
        );
        let mut report = DeletionReport::new(1);
        report.record(rows.table(), DeleteMode::Soft);
        Ok(report)
    }

    /// Deletes a custom document, its files and their objects.
    pub async fn delete_document(
        &self,
        client_id: Uuid,
        document_id: Uuid,
    ) -> Result<DeletionReport, CascadeError> {
        self.resolver
            .removable_document(client_id, document_id)
            .await?;
        let files = self
            .resolver
            .files(FileScope::Document {
                client_id,
                document_id,
            })
            .await?;

        let removed_objects = self
            .remover
            .remove(locations(&files), Batching::Single)
            .await?;

        let at = Utc::now();
        let mut report = DeletionReport::new(files.len());
        for rows in [
            RowSet::DocumentFiles {
                client_id,
                document_id,
            },
            RowSet::Document {
                client_id,
                document_id,
            },
        ] {
            let mode = self.delete_rows(rows, at).await?;
            report.record(rows.table(), mode);
        }

        info!(
            %client_id,
            %document_id,
            removed_files = report.removed_files,
            removed_objects,
            soft_deleted = ?report.soft_deleted,
            grant = %self.grant.kind(),
            "document deleted"
        );
        Ok(report)
    }

    /// Deletes a client with everything that references it.
    pub async fn delete_client(&self, client_id: Uuid) -> Result<DeletionReport, CascadeError> {
        self.resolver.client(client_id).await?;
        let files = self.resolver.files(FileScope::Client(client_id)).await?;

        let removed_objects = self
            .remover
            .remove(locations(&files), Batching::Chunked(REMOVE_BATCH_SIZE))
            .await?;

        let at = Utc::now();
        let mut report = DeletionReport::new(files.len());
        for rows in client_cascade(client_id) {
            let mode = self.delete_rows(rows, at).await?;
            report.record(rows.table(), mode);
        }

        info!(
            %client_id,
            removed_files = report.removed_files,
            removed_objects,
            soft_deleted = ?report.soft_deleted,
            grant = %self.grant.kind(),
            "client deleted"
        );
        Ok(report)
    }

    /// Hard delete, falling back to `deleted_at = at` when the hard delete
    /// is refused. Fails only when both are refused.
    async fn delete_rows(&self, rows: RowSet, at: DateTime<Utc>) -> Result<DeleteMode, CascadeError> {
        let table = rows.table().name();

        let hard_err = match self.records.hard_delete(&self.grant, rows).await {
            Ok(()) => {
                debug!(table, mode = ?DeleteMode::Hard, "rows deleted");
                return Ok(DeleteMode::Hard);
            }
            Err(err) => format!("{err:#}"),
        };
        warn!(table, error = %hard_err, "hard delete refused, marking rows deleted");

        match self.records.soft_delete(&self.grant, rows, at).await {
            Ok(()) => {
                debug!(table, mode = ?DeleteMode::Soft, "rows deleted");
                Ok(DeleteMode::Soft)
            }
            Err(err) => {
                let soft_err = format!("{err:#}");
                Err(CascadeError::Write {
                    table,
                    kind: WriteKind::Delete,
                    message: if soft_err.is_empty() { hard_err } else { soft_err },
                    grant: self.grant.kind(),
                })
            }
        }
    }
}

/// Row sets of a client in deletion order, children before the client.
pub fn client_cascade(client_id: Uuid) -> [RowSet; 5] {
    [
        RowSet::ClientFiles(client_id),
        RowSet::ClientDocuments(client_id),
        RowSet::ClientPayments(client_id),
        RowSet::ClientOwnerships(client_id),
        RowSet::Client(client_id),
    ]
}

fn locations(files: &[FileRow]) -> Vec<ObjectLocation> {
    files.iter().filter_map(FileRow::location).collect()
}
