use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use super::{FileScope, RecordStore, RowSet, Table};
use crate::models::{ClientRow, DocumentRow, FileRow};
use crate::privilege::Grant;
use crate::supabase::{check, ApiError, ApiKeys};

const CLIENT_COLUMNS: &str = "id,deleted_at";
const DOCUMENT_COLUMNS: &str = "id,client_id,document_type_id,custom_name,deleted_at";
const DOCUMENT_COLUMNS_WITH_TYPE: &str =
    "id,client_id,document_type_id,custom_name,deleted_at,document_types(id,name)";
const FILE_COLUMNS: &str = "id,client_id,client_document_id,bucket,path,deleted_at";

/// Error codes the REST layer uses when a select names a relationship or
/// column the schema does not have.
const SCHEMA_MISMATCH_CODES: &[&str] = &["PGRST200", "PGRST100", "42703"];

pub struct PostgrestStore {
    http: Client,
    base_url: String,
    keys: ApiKeys,
}

impl PostgrestStore {
    pub fn new(http: Client, base_url: impl Into<String>, keys: ApiKeys) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            keys,
        }
    }

    fn request(
        &self,
        method: Method,
        grant: &Grant,
        table: Table,
        filters: &[(&'static str, Uuid)],
    ) -> Result<RequestBuilder> {
        let url = format!("{}/rest/v1/{}", self.base_url, table.name());
        let query = filter_query(filters);
        let request = self.http.request(method, url).query(&query);
        self.keys.authorize(request, grant)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        grant: &Grant,
        table: Table,
        columns: &str,
        filters: &[(&'static str, Uuid)],
    ) -> Result<Vec<T>> {
        let response = self
            .request(Method::GET, grant, table, filters)?
            .query(&[("select", columns)])
            .send()
            .await
            .with_context(|| format!("failed to query {}", table.name()))?;
        let response = check(response).await?;
        let rows = response
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("failed to decode {} rows", table.name()))?;
        Ok(rows)
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        grant: &Grant,
        table: Table,
        columns: &str,
        filters: &[(&'static str, Uuid)],
    ) -> Result<Option<T>> {
        let mut rows = self.select::<T>(grant, table, columns, filters).await?;
        if rows.len() > 1 {
            bail!(
                "expected at most one {} row, found {}",
                table.name(),
                rows.len()
            );
        }
        Ok(rows.pop())
    }
}

fn filter_query(filters: &[(&'static str, Uuid)]) -> Vec<(&'static str, String)> {
    filters
        .iter()
        .map(|(column, value)| (*column, format!("eq.{value}")))
        .collect()
}

fn is_schema_mismatch(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ApiError>()
        .and_then(|api| api.code.as_deref())
        .is_some_and(|code| SCHEMA_MISMATCH_CODES.contains(&code))
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn find_client(&self, grant: &Grant, client_id: Uuid) -> Result<Option<ClientRow>> {
        self.select_one(grant, Table::Clients, CLIENT_COLUMNS, &RowSet::Client(client_id).filters())
            .await
    }

    async fn find_document(
        &self,
        grant: &Grant,
        client_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<DocumentRow>> {
        let filters = RowSet::Document {
            client_id,
            document_id,
        }
        .filters();

        match self
            .select_one(grant, Table::ClientDocuments, DOCUMENT_COLUMNS_WITH_TYPE, &filters)
            .await
        {
            Err(err) if is_schema_mismatch(&err) => {
                tracing::debug!(error = %err, "document type embed unavailable, using basic columns");
                self.select_one(grant, Table::ClientDocuments, DOCUMENT_COLUMNS, &filters)
                    .await
            }
            other => other,
        }
    }

    async fn find_file(
        &self,
        grant: &Grant,
        client_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<FileRow>> {
        let filters = RowSet::File { client_id, file_id }.filters();
        self.select_one(grant, Table::Files, FILE_COLUMNS, &filters)
            .await
    }

    async fn list_files(&self, grant: &Grant, scope: FileScope) -> Result<Vec<FileRow>> {
        self.select(grant, Table::Files, FILE_COLUMNS, &scope.rows().filters())
            .await
    }

    async fn hard_delete(&self, grant: &Grant, rows: RowSet) -> Result<()> {
        let response = self
            .request(Method::DELETE, grant, rows.table(), &rows.filters())?
            .header("Prefer", "return=minimal")
            .send()
            .await
            .with_context(|| format!("failed to delete from {}", rows.table().name()))?;
        check(response).await?;
        Ok(())
    }

    async fn soft_delete(&self, grant: &Grant, rows: RowSet, at: DateTime<Utc>) -> Result<()> {
        let response = self
            .request(Method::PATCH, grant, rows.table(), &rows.filters())?
            .header("Prefer", "return=minimal")
            .json(&json!({ "deleted_at": at.to_rfc3339() }))
            .send()
            .await
            .with_context(|| format!("failed to update {}", rows.table().name()))?;
        check(response).await?;
        Ok(())
    }
}
