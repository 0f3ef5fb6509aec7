#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::{DateTime, Utc};
use clientdesk::auth::identity::{Identity, IdentityProvider};
use clientdesk::auth::AdminAllowlist;
use clientdesk::config::AppConfig;
use clientdesk::db::{self, PgPool};
use clientdesk::models::{ClientRow, DocumentRow, FileRow};
use clientdesk::privilege::{Grant, GrantKind};
use clientdesk::records::{FileScope, RecordStore, RowSet, Table};
use clientdesk::routes;
use clientdesk::state::AppState;
use clientdesk::storage::ObjectStorage;
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const OUTSIDER_TOKEN: &str = "outsider-token";
pub const ADMIN_EMAIL: &str = "ops@example.com";
pub const BUCKET: &str = "client-files";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// A row of a table the cascade only ever deletes by `client_id`.
#[derive(Debug, Clone)]
pub struct ChildRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    Hard(Table),
    Soft(Table),
}

#[derive(Default)]
struct Tables {
    clients: Vec<ClientRow>,
    documents: Vec<DocumentRow>,
    files: Vec<FileRow>,
    payments: Vec<ChildRow>,
    ownerships: Vec<ChildRow>,
    refuse_hard: HashSet<Table>,
    refuse_soft: HashSet<Table>,
    fail_reads: bool,
    writes: Vec<Write>,
    grants: Vec<GrantKind>,
}

fn matches(rows: &RowSet, column: impl Fn(&str) -> Option<Uuid>) -> bool {
    rows.filters()
        .iter()
        .all(|(name, value)| column(name) == Some(*value))
}

fn file_column(file: &FileRow, name: &str) -> Option<Uuid> {
    match name {
        "id" => Some(file.id),
        "client_id" => file.client_id,
        "client_document_id" => file.client_document_id,
        _ => None,
    }
}

fn document_column(document: &DocumentRow, name: &str) -> Option<Uuid> {
    match name {
        "id" => Some(document.id),
        "client_id" => Some(document.client_id),
        _ => None,
    }
}

fn client_column(client: &ClientRow, name: &str) -> Option<Uuid> {
    (name == "id").then_some(client.id)
}

fn child_column(row: &ChildRow, name: &str) -> Option<Uuid> {
    match name {
        "id" => Some(row.id),
        "client_id" => Some(row.client_id),
        _ => None,
    }
}

/// In-memory tables with switchable row-level refusals.
#[derive(Default)]
pub struct FakeRecords {
    tables: Mutex<Tables>,
}

impl FakeRecords {
    pub async fn insert_client(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().await.clients.push(ClientRow {
            id,
            deleted_at: None,
        });
        id
    }

    pub async fn insert_document(
        &self,
        client_id: Uuid,
        document_type_id: Option<Uuid>,
        custom_name: Option<&str>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().await.documents.push(DocumentRow {
            id,
            client_id,
            document_type_id,
            custom_name: custom_name.map(str::to_string),
            deleted_at: None,
            document_type: None,
        });
        id
    }

    pub async fn insert_file(
        &self,
        client_id: Uuid,
        document_id: Option<Uuid>,
        bucket: &str,
        path: &str,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().await.files.push(FileRow {
            id,
            client_id: Some(client_id),
            client_document_id: document_id,
            bucket: bucket.to_string(),
            path: path.to_string(),
            deleted_at: None,
        });
        id
    }

    pub async fn insert_payment(&self, client_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().await.payments.push(ChildRow {
            id,
            client_id,
            deleted_at: None,
        });
        id
    }

    pub async fn insert_ownership(&self, client_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().await.ownerships.push(ChildRow {
            id,
            client_id,
            deleted_at: None,
        });
        id
    }

    /// Makes hard deletes on `table` fail the way a missing delete policy does.
    pub async fn refuse_hard_delete(&self, table: Table) {
        self.tables.lock().await.refuse_hard.insert(table);
    }

    pub async fn refuse_soft_delete(&self, table: Table) {
        self.tables.lock().await.refuse_soft.insert(table);
    }

    pub async fn fail_reads(&self) {
        self.tables.lock().await.fail_reads = true;
    }

    pub async fn client(&self, id: Uuid) -> Option<ClientRow> {
        let tables = self.tables.lock().await;
        tables.clients.iter().find(|row| row.id == id).cloned()
    }

    pub async fn document(&self, id: Uuid) -> Option<DocumentRow> {
        let tables = self.tables.lock().await;
        tables.documents.iter().find(|row| row.id == id).cloned()
    }

    pub async fn file(&self, id: Uuid) -> Option<FileRow> {
        let tables = self.tables.lock().await;
        tables.files.iter().find(|row| row.id == id).cloned()
    }

    pub async fn payments(&self, client_id: Uuid) -> Vec<ChildRow> {
        let tables = self.tables.lock().await;
        tables
            .payments
            .iter()
            .filter(|row| row.client_id == client_id)
            .cloned()
            .collect()
    }

    pub async fn ownerships(&self, client_id: Uuid) -> Vec<ChildRow> {
        let tables = self.tables.lock().await;
        tables
            .ownerships
            .iter()
            .filter(|row| row.client_id == client_id)
            .cloned()
            .collect()
    }

    /// Successful row writes in the order they happened.
    pub async fn writes(&self) -> Vec<Write> {
        self.tables.lock().await.writes.clone()
    }

    pub async fn grants(&self) -> Vec<GrantKind> {
        self.tables.lock().await.grants.clone()
    }
}

#[async_trait]
impl RecordStore for FakeRecords {
    async fn find_client(&self, grant: &Grant, client_id: Uuid) -> Result<Option<ClientRow>> {
        let mut tables = self.tables.lock().await;
        tables.grants.push(grant.kind());
        if tables.fail_reads {
            bail!("connection refused");
        }
        Ok(tables.clients.iter().find(|row| row.id == client_id).cloned())
    }

    async fn find_document(
        &self,
        grant: &Grant,
        client_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<DocumentRow>> {
        let mut tables = self.tables.lock().await;
        tables.grants.push(grant.kind());
        if tables.fail_reads {
            bail!("connection refused");
        }
        Ok(tables
            .documents
            .iter()
            .find(|row| row.id == document_id && row.client_id == client_id)
            .cloned())
    }

    async fn find_file(
        &self,
        grant: &Grant,
        client_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<FileRow>> {
        let mut tables = self.tables.lock().await;
        tables.grants.push(grant.kind());
        if tables.fail_reads {
            bail!("connection refused");
        }
        Ok(tables
            .files
            .iter()
            .find(|row| row.id == file_id && row.client_id == Some(client_id))
            .cloned())
    }

    async fn list_files(&self, grant: &Grant, scope: FileScope) -> Result<Vec<FileRow>> {
        let mut tables = self.tables.lock().await;
        tables.grants.push(grant.kind());
        if tables.fail_reads {
            bail!("connection refused");
        }
        let rows = scope.rows();
        Ok(tables
            .files
            .iter()
            .filter(|file| matches(&rows, |name| file_column(file, name)))
            .cloned()
            .collect())
    }

    async fn hard_delete(&self, grant: &Grant, rows: RowSet) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.grants.push(grant.kind());
        let table = rows.table();
        if tables.refuse_hard.contains(&table) {
            bail!("permission denied for table {}", table.name());
        }
        match table {
            Table::Files => tables
                .files
                .retain(|file| !matches(&rows, |name| file_column(file, name))),
            Table::ClientDocuments => tables
                .documents
                .retain(|doc| !matches(&rows, |name| document_column(doc, name))),
            Table::ClientPayments => tables
                .payments
                .retain(|row| !matches(&rows, |name| child_column(row, name))),
            Table::ClientOwnerships => tables
                .ownerships
                .retain(|row| !matches(&rows, |name| child_column(row, name))),
            Table::Clients => tables
                .clients
                .retain(|client| !matches(&rows, |name| client_column(client, name))),
        }
        tables.writes.push(Write::Hard(table));
        Ok(())
    }

    async fn soft_delete(&self, grant: &Grant, rows: RowSet, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.grants.push(grant.kind());
        let table = rows.table();
        if tables.refuse_soft.contains(&table) {
            bail!("new row violates row-level security policy for table {}", table.name());
        }
        match table {
            Table::Files => tables
                .files
                .iter_mut()
                .filter(|file| matches(&rows, |name| file_column(file, name)))
                .for_each(|file| file.deleted_at = Some(at)),
            Table::ClientDocuments => tables
                .documents
                .iter_mut()
                .filter(|doc| matches(&rows, |name| document_column(doc, name)))
                .for_each(|doc| doc.deleted_at = Some(at)),
            Table::ClientPayments => tables
                .payments
                .iter_mut()
                .filter(|row| matches(&rows, |name| child_column(row, name)))
                .for_each(|row| row.deleted_at = Some(at)),
            Table::ClientOwnerships => tables
                .ownerships
                .iter_mut()
                .filter(|row| matches(&rows, |name| child_column(row, name)))
                .for_each(|row| row.deleted_at = Some(at)),
            Table::Clients => tables
                .clients
                .iter_mut()
                .filter(|client| matches(&rows, |name| client_column(client, name)))
                .for_each(|client| client.deleted_at = Some(at)),
        }
        tables.writes.push(Write::Soft(table));
        Ok(())
    }
}

#[derive(Default)]
struct Bucket {
    objects: HashSet<(String, String)>,
    calls: Vec<(String, Vec<String>)>,
    failure: Option<String>,
}

/// Object storage that answers like the hosted API: removing a missing
/// object succeeds, and an injected failure message is returned verbatim.
#[derive(Default)]
pub struct FakeStorage {
    inner: Mutex<Bucket>,
}

impl FakeStorage {
    pub async fn put(&self, bucket: &str, path: &str) {
        let mut guard = self.inner.lock().await;
        guard
            .objects
            .insert((bucket.to_string(), path.to_string()));
    }

    pub async fn contains(&self, bucket: &str, path: &str) -> bool {
        let guard = self.inner.lock().await;
        guard
            .objects
            .contains(&(bucket.to_string(), path.to_string()))
    }

    pub async fn object_count(&self) -> usize {
        self.inner.lock().await.objects.len()
    }

    /// Every removal call as `(bucket, paths)`.
    pub async fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn fail_with(&self, message: &str) {
        self.inner.lock().await.failure = Some(message.to_string());
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn remove_objects(&self, _grant: &Grant, bucket: &str, paths: &[String]) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.calls.push((bucket.to_string(), paths.to_vec()));
        if let Some(message) = guard.failure.clone() {
            return Err(anyhow!(message));
        }
        for path in paths {
            guard.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }
}

/// Resolves the two well-known test tokens; everything else is invalid.
pub struct FakeIdentity {
    tokens: HashMap<String, Identity>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(
            ADMIN_TOKEN.to_string(),
            Identity {
                id: Uuid::new_v4(),
                email: Some(ADMIN_EMAIL.to_string()),
            },
        );
        tokens.insert(
            OUTSIDER_TOKEN.to_string(),
            Identity {
                id: Uuid::new_v4(),
                email: Some("someone@example.com".to_string()),
            },
        );
        Self { tokens }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        Ok(self.tokens.get(token).cloned())
    }
}

pub fn test_config(service_role_key: Option<&str>) -> AppConfig {
    AppConfig {
        supabase_url: "http://127.0.0.1:54321".to_string(),
        supabase_anon_key: "anon-key".to_string(),
        supabase_service_role_key: service_role_key.map(str::to_string),
        supabase_jwt_secret: None,
        supabase_jwt_audience: "authenticated".to_string(),
        supabase_project_ref: None,
        admin_emails: AdminAllowlist::parse(ADMIN_EMAIL),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        cors_allowed_origin: None,
        backend_timeout: Duration::from_secs(5),
        database_url: None,
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        aws_endpoint_url: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: "us-east-1".to_string(),
    }
}

pub struct TestApp {
    pub records: Arc<FakeRecords>,
    pub storage: Arc<FakeStorage>,
    router: Router,
}

impl TestApp {
    /// No service credential configured: deletions run as the caller.
    pub fn new() -> Self {
        Self::with_config(test_config(None))
    }

    /// A service credential is configured: deletions run elevated.
    pub fn elevated() -> Self {
        Self::with_config(test_config(Some("service-role-key")))
    }

    pub fn with_config(config: AppConfig) -> Self {
        let records = Arc::new(FakeRecords::default());
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::new(
            config,
            records.clone(),
            storage.clone(),
            Arc::new(FakeIdentity::default()),
        );
        let router = routes::create_router(state);
        Self {
            records,
            storage,
            router,
        }
    }

    /// Seeds a client with one custom document holding two stored files.
    pub async fn seed_custom_document(&self) -> Seeded {
        let client_id = self.records.insert_client().await;
        let document_id = self
            .records
            .insert_document(client_id, None, Some("Certificado"))
            .await;
        self.seed_files(client_id, document_id).await
    }

    /// Seeds a client with a predefined document holding two stored files.
    pub async fn seed_predefined_document(&self) -> Seeded {
        let client_id = self.records.insert_client().await;
        let document_id = self
            .records
            .insert_document(client_id, Some(Uuid::new_v4()), None)
            .await;
        self.seed_files(client_id, document_id).await
    }

    async fn seed_files(&self, client_id: Uuid, document_id: Uuid) -> Seeded {
        let mut files = Vec::new();
        for name in ["f1.pdf", "f2.pdf"] {
            let path = format!("{client_id}/{document_id}/{name}");
            let file_id = self
                .records
                .insert_file(client_id, Some(document_id), BUCKET, &path)
                .await;
            self.storage.put(BUCKET, &path).await;
            files.push((file_id, path));
        }
        Seeded {
            client_id,
            document_id,
            files,
        }
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Result<axum::response::Response> {
        let body = match body {
            Some(value) => Body::from(serde_json::to_vec(&value)?),
            None => Body::empty(),
        };
        self.post_raw(path, body, token).await
    }

    pub async fn post_raw(
        &self,
        path: &str,
        body: Body,
        token: Option<&str>,
    ) -> Result<axum::response::Response> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<axum::response::Response> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub struct Seeded {
    pub client_id: Uuid,
    pub document_id: Uuid,
    /// `(file id, object path)` pairs, all in [`BUCKET`].
    pub files: Vec<(Uuid, String)>,
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(response: axum::response::Response) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

/// A migrated, empty database, or `None` when `TEST_DATABASE_URL` is unset.
pub async fn test_database() -> Result<Option<PgPool>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping Postgres test");
        return Ok(None);
    };

    let pool = db::init_pool_with_size(&database_url, db::DEFAULT_MAX_POOL_SIZE)?;
    db::run_migrations(&pool)?;
    with_conn(&pool, truncate_all).await?;
    Ok(Some(pool))
}

pub async fn with_conn<F, T>(pool: &PgPool, f: F) -> Result<T>
where
    F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
        f(&mut conn)
    })
    .await
    .context("connection task panicked")?
}

/// Empties every table and restores the grants a test may have revoked.
fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE files, client_documents, client_payments, client_ownerships, clients, document_types CASCADE;
         GRANT SELECT, INSERT, UPDATE, DELETE
             ON clients, document_types, client_documents, files, client_payments, client_ownerships
             TO authenticated, service_role;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
