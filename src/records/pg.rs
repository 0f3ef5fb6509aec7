use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use serde_json::json;
use tokio::task;
use uuid::Uuid;

use super::{FileScope, RecordStore, RowSet};
use crate::db::PgPool;
use crate::models::{ClientRow, DocumentRow, DocumentTypeRef, FileRow};
use crate::privilege::Grant;
use crate::schema::{
    client_documents, client_ownerships, client_payments, clients, document_types, files,
};

pub const ELEVATED_ROLE: &str = "service_role";
pub const CALLER_ROLE: &str = "authenticated";

/// Direct Postgres access. Every call runs in its own transaction that first
/// assumes the role matching the grant, so row-level policies apply exactly
/// as they would behind the REST API.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

/// Role and JWT claims a transaction assumes before touching any row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionRole {
    role: &'static str,
    claims: Option<String>,
}

impl SessionRole {
    pub(crate) fn for_grant(grant: &Grant) -> Self {
        match grant {
            Grant::Elevated => Self {
                role: ELEVATED_ROLE,
                claims: None,
            },
            Grant::Caller(caller) => Self {
                role: CALLER_ROLE,
                claims: Some(
                    json!({
                        "sub": caller.identity().id,
                        "email": caller.identity().email,
                        "role": CALLER_ROLE,
                    })
                    .to_string(),
                ),
            },
        }
    }

    fn apply(&self, conn: &mut PgConnection) -> QueryResult<()> {
        conn.batch_execute(&format!("SET LOCAL ROLE {}", self.role))?;
        if let Some(claims) = &self.claims {
            diesel::sql_query("SELECT set_config('request.jwt.claims', $1, true)")
                .bind::<Text, _>(claims.clone())
                .execute(conn)?;
        }
        Ok(())
    }
}

type DocumentTuple = (
    Uuid,
    Uuid,
    Option<Uuid>,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<(Uuid, String)>,
);

type FileTuple = (
    Uuid,
    Uuid,
    Option<Uuid>,
    String,
    String,
    Option<DateTime<Utc>>,
);

fn file_from_tuple(
    (id, client_id, client_document_id, bucket, path, deleted_at): FileTuple,
) -> FileRow {
    FileRow {
        id,
        client_id: Some(client_id),
        client_document_id,
        bucket,
        path,
        deleted_at,
    }
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run<F, T>(&self, grant: &Grant, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let session = SessionRole::for_grant(grant);
        task::spawn_blocking(move || -> Result<T> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            let value = conn.transaction::<T, diesel::result::Error, _>(|conn| {
                session.apply(conn)?;
                f(conn)
            })?;
            Ok(value)
        })
        .await
        .context("database task panicked")?
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_client(&self, grant: &Grant, client_id: Uuid) -> Result<Option<ClientRow>> {
        let row = self
            .run(grant, move |conn| {
                clients::table
                    .filter(clients::id.eq(client_id))
                    .select((clients::id, clients::deleted_at))
                    .first::<(Uuid, Option<DateTime<Utc>>)>(conn)
                    .optional()
            })
            .await
            .context("failed to load client")?;
        Ok(row.map(|(id, deleted_at)| ClientRow { id, deleted_at }))
    }

    async fn find_document(
        &self,
        grant: &Grant,
        client_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<DocumentRow>> {
        let row = self
            .run(grant, move |conn| {
                client_documents::table
                    .left_join(document_types::table)
                    .filter(client_documents::id.eq(document_id))
                    .filter(client_documents::client_id.eq(client_id))
                    .select((
                        client_documents::id,
                        client_documents::client_id,
                        client_documents::document_type_id,
                        client_documents::custom_name,
                        client_documents::deleted_at,
                        (document_types::id, document_types::name).nullable(),
                    ))
                    .first::<DocumentTuple>(conn)
                    .optional()
            })
            .await
            .context("failed to load document")?;

        Ok(row.map(
            |(id, client_id, document_type_id, custom_name, deleted_at, document_type)| {
                DocumentRow {
                    id,
                    client_id,
                    document_type_id,
                    custom_name,
                    deleted_at,
                    document_type: document_type.map(|(id, name)| DocumentTypeRef {
                        id,
                        name: Some(name),
                    }),
                }
            },
        ))
    }

    async fn find_file(
        &self,
        grant: &Grant,
        client_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<FileRow>> {
        let row = self
            .run(grant, move |conn| {
                files::table
                    .filter(files::id.eq(file_id))
                    .filter(files::client_id.eq(client_id))
                    .select((
                        files::id,
                        files::client_id,
                        files::client_document_id,
                        files::bucket,
                        files::path,
                        files::deleted_at,
                    ))
                    .first::<FileTuple>(conn)
                    .optional()
            })
            .await
            .context("failed to load file")?;
        Ok(row.map(file_from_tuple))
    }

    async fn list_files(&self, grant: &Grant, scope: FileScope) -> Result<Vec<FileRow>> {
        let rows = self
            .run(grant, move |conn| {
                let mut query = files::table
                    .select((
                        files::id,
                        files::client_id,
                        files::client_document_id,
                        files::bucket,
                        files::path,
                        files::deleted_at,
                    ))
                    .into_boxed();
                match scope {
                    FileScope::Document {
                        client_id,
                        document_id,
                    } => {
                        query = query
                            .filter(files::client_id.eq(client_id))
                            .filter(files::client_document_id.eq(document_id));
                    }
                    FileScope::Client(client_id) => {
                        query = query.filter(files::client_id.eq(client_id));
                    }
                }
                query.order(files::created_at.asc()).load::<FileTuple>(conn)
            })
            .await
            .context("failed to list files")?;
        Ok(rows.into_iter().map(file_from_tuple).collect())
    }

    async fn hard_delete(&self, grant: &Grant, rows: RowSet) -> Result<()> {
        let table = rows.table().name();
        let affected = self
            .run(grant, move |conn| delete_rows(conn, rows))
            .await
            .with_context(|| format!("failed to delete from {table}"))?;
        tracing::debug!(table, affected, "hard delete");
        Ok(())
    }

    async fn soft_delete(&self, grant: &Grant, rows: RowSet, at: DateTime<Utc>) -> Result<()> {
        let table = rows.table().name();
        let affected = self
            .run(grant, move |conn| mark_rows_deleted(conn, rows, at))
            .await
            .with_context(|| format!("failed to update {table}"))?;
        tracing::debug!(table, affected, "soft delete");
        Ok(())
    }
}

fn delete_rows(conn: &mut PgConnection, rows: RowSet) -> QueryResult<usize> {
    match rows {
        RowSet::File { client_id, file_id } => diesel::delete(
            files::table
                .filter(files::id.eq(file_id))
                .filter(files::client_id.eq(client_id)),
        )
        .execute(conn),
        RowSet::DocumentFiles {
            client_id,
            document_id,
        } => diesel::delete(
            files::table
                .filter(files::client_id.eq(client_id))
                .filter(files::client_document_id.eq(document_id)),
        )
        .execute(conn),
        RowSet::Document {
            client_id,
            document_id,
        } => diesel::delete(
            client_documents::table
                .filter(client_documents::id.eq(document_id))
                .filter(client_documents::client_id.eq(client_id)),
        )
        .execute(conn),
        RowSet::ClientFiles(client_id) => {
            diesel::delete(files::table.filter(files::client_id.eq(client_id))).execute(conn)
        }
        RowSet::ClientDocuments(client_id) => diesel::delete(
            client_documents::table.filter(client_documents::client_id.eq(client_id)),
        )
        .execute(conn),
        RowSet::ClientPayments(client_id) => diesel::delete(
            client_payments::table.filter(client_payments::client_id.eq(client_id)),
        )
        .execute(conn),
        RowSet::ClientOwnerships(client_id) => diesel::delete(
            client_ownerships::table.filter(client_ownerships::client_id.eq(client_id)),
        )
        .execute(conn),
        RowSet::Client(client_id) => {
            diesel::delete(clients::table.filter(clients::id.eq(client_id))).execute(conn)
        }
    }
}

fn mark_rows_deleted(
    conn: &mut PgConnection,
    rows: RowSet,
    at: DateTime<Utc>,
) -> QueryResult<usize> {
    match rows {
        RowSet::File { client_id, file_id } => diesel::update(
            files::table
                .filter(files::id.eq(file_id))
                .filter(files::client_id.eq(client_id)),
        )
        .set(files::deleted_at.eq(Some(at)))
        .execute(conn),
        RowSet::DocumentFiles {
            client_id,
            document_id,
        } => diesel::update(
            files::table
                .filter(files::client_id.eq(client_id))
                .filter(files::client_document_id.eq(document_id)),
        )
        .set(files::deleted_at.eq(Some(at)))
        .execute(conn),
        RowSet::Document {
            client_id,
            document_id,
        } => diesel::update(
            client_documents::table
                .filter(client_documents::id.eq(document_id))
                .filter(client_documents::client_id.eq(client_id)),
        )
        .set(client_documents::deleted_at.eq(Some(at)))
        .execute(conn),
        RowSet::ClientFiles(client_id) => {
            diesel::update(files::table.filter(files::client_id.eq(client_id)))
                .set(files::deleted_at.eq(Some(at)))
                .execute(conn)
        }
        RowSet::ClientDocuments(client_id) => diesel::update(
            client_documents::table.filter(client_documents::client_id.eq(client_id)),
        )
        .set(client_documents::deleted_at.eq(Some(at)))
        .execute(conn),
        RowSet::ClientPayments(client_id) => diesel::update(
            client_payments::table.filter(client_payments::client_id.eq(client_id)),
        )
        .set(client_payments::deleted_at.eq(Some(at)))
        .execute(conn),
        RowSet::ClientOwnerships(client_id) => diesel::update(
            client_ownerships::table.filter(client_ownerships::client_id.eq(client_id)),
        )
        .set(client_ownerships::deleted_at.eq(Some(at)))
        .execute(conn),
        RowSet::Client(client_id) => {
            diesel::update(clients::table.filter(clients::id.eq(client_id)))
                .set(clients::deleted_at.eq(Some(at)))
                .execute(conn)
        }
    }
}
