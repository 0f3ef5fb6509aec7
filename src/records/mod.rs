//! Row access for the deletion paths.
//!
//! Two adapters implement [`RecordStore`]: [`rest::PostgrestStore`] talks to
//! the hosted REST API and [`pg::PgRecordStore`] connects to Postgres
//! directly. Both honour the [`Grant`] of the call.

pub mod pg;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ClientRow, DocumentRow, FileRow};
use crate::privilege::Grant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Clients,
    ClientDocuments,
    Files,
    ClientPayments,
    ClientOwnerships,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Table::Clients => "clients",
            Table::ClientDocuments => "client_documents",
            Table::Files => "files",
            Table::ClientPayments => "client_payments",
            Table::ClientOwnerships => "client_ownerships",
        }
    }
}

/// A set of rows addressed by equality filters, the unit the cascade deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSet {
    File { client_id: Uuid, file_id: Uuid },
    DocumentFiles { client_id: Uuid, document_id: Uuid },
    Document { client_id: Uuid, document_id: Uuid },
    ClientFiles(Uuid),
    ClientDocuments(Uuid),
    ClientPayments(Uuid),
    ClientOwnerships(Uuid),
    Client(Uuid),
}

impl RowSet {
    pub fn table(&self) -> Table {
        match self {
            RowSet::File { .. } | RowSet::DocumentFiles { .. } | RowSet::ClientFiles(_) => {
                Table::Files
            }
            RowSet::Document { .. } | RowSet::ClientDocuments(_) => Table::ClientDocuments,
            RowSet::ClientPayments(_) => Table::ClientPayments,
            RowSet::ClientOwnerships(_) => Table::ClientOwnerships,
            RowSet::Client(_) => Table::Clients,
        }
    }

    /// Column/value pairs that all have to match.
    pub fn filters(&self) -> Vec<(&'static str, Uuid)> {
        match *self {
            RowSet::File { client_id, file_id } => vec![("id", file_id), ("client_id", client_id)],
            RowSet::DocumentFiles {
                client_id,
                document_id,
            } => vec![("client_id", client_id), ("client_document_id", document_id)],
            RowSet::Document {
                client_id,
                document_id,
            } => vec![("id", document_id), ("client_id", client_id)],
            RowSet::ClientFiles(client_id)
            | RowSet::ClientDocuments(client_id)
            | RowSet::ClientPayments(client_id)
            | RowSet::ClientOwnerships(client_id) => vec![("client_id", client_id)],
            RowSet::Client(client_id) => vec![("id", client_id)],
        }
    }
}

/// Which files a listing covers. Soft-deleted rows are always included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileScope {
    Document { client_id: Uuid, document_id: Uuid },
    Client(Uuid),
}

impl FileScope {
    pub fn rows(self) -> RowSet {
        match self {
            FileScope::Document {
                client_id,
                document_id,
            } => RowSet::DocumentFiles {
                client_id,
                document_id,
            },
            FileScope::Client(client_id) => RowSet::ClientFiles(client_id),
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn find_client(&self, grant: &Grant, client_id: Uuid) -> Result<Option<ClientRow>>;

    async fn find_document(
        &self,
        grant: &Grant,
        client_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<DocumentRow>>;

    async fn find_file(
        &self,
        grant: &Grant,
        client_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<FileRow>>;

    async fn list_files(&self, grant: &Grant, scope: FileScope) -> Result<Vec<FileRow>>;

    /// Removing rows that are already gone is not an error.
    async fn hard_delete(&self, grant: &Grant, rows: RowSet) -> Result<()>;

    /// Sets `deleted_at = at` on every row in the set.
    async fn soft_delete(&self, grant: &Grant, rows: RowSet, at: DateTime<Utc>) -> Result<()>;
}
