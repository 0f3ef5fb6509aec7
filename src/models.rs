use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::json::{one_or_many, string_or_null};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRow {
    pub id: Uuid,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTypeRef {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: Uuid,
    pub client_id: Uuid,
    #[serde(default)]
    pub document_type_id: Option<Uuid>,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "document_types",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_type: Option<DocumentTypeRef>,
}

impl DocumentRow {
    /// Only ad hoc documents ("other" with an alias) may be removed; the
    /// predefined ones are requirements of every client record.
    pub fn is_removable(&self) -> bool {
        self.document_type_id.is_none()
            && self
                .custom_name
                .as_deref()
                .is_some_and(|name| !name.is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.custom_name
            .as_deref()
            .or_else(|| self.document_type.as_ref()?.name.as_deref())
            .unwrap_or("document")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    pub id: Uuid,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub client_document_id: Option<Uuid>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub bucket: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub path: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileRow {
    /// `(bucket, path)` of the stored object, if the row points at one.
    pub fn location(&self) -> Option<ObjectLocation> {
        if self.bucket.is_empty() || self.path.is_empty() {
            return None;
        }
        Some(ObjectLocation {
            bucket: self.bucket.clone(),
            path: self.path.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub path: String,
}
