use std::sync::Arc;

use uuid::Uuid;

use crate::cascade::{CascadeError, Resource};
use crate::models::{ClientRow, DocumentRow, FileRow, ObjectLocation};
use crate::privilege::Grant;
use crate::records::{FileScope, RecordStore};

/// Loads the rows a deletion targets and checks they may be deleted.
/// Soft-deleted rows resolve like any other, so a retry after a partial
/// failure can finish the job.
pub struct RecordResolver {
    records: Arc<dyn RecordStore>,
    grant: Grant,
}

impl RecordResolver {
    pub fn new(records: Arc<dyn RecordStore>, grant: Grant) -> Self {
        Self { records, grant }
    }

    pub async fn file(
        &self,
        client_id: Uuid,
        file_id: Uuid,
    ) -> Result<(FileRow, ObjectLocation), CascadeError> {
        let file = self
            .records
            .find_file(&self.grant, client_id, file_id)
            .await
            .map_err(CascadeError::read)?
            .ok_or(CascadeError::NotFound(Resource::File))?;
        let location = file.location().ok_or(CascadeError::InvalidFileRow)?;
        Ok((file, location))
    }

    pub async fn removable_document(
        &self,
        client_id: Uuid,
        document_id: Uuid,
    ) -> Result<DocumentRow, CascadeError> {
        let document = self
            .records
            .find_document(&self.grant, client_id, document_id)
            .await
            .map_err(CascadeError::read)?
            .ok_or(CascadeError::NotFound(Resource::Document))?;

        if !document.is_removable() {
            return Err(CascadeError::Ineligible {
                name: document.display_name().to_string(),
            });
        }
        Ok(document)
    }

    pub async fn client(&self, client_id: Uuid) -> Result<ClientRow, CascadeError> {
        self.records
            .find_client(&self.grant, client_id)
            .await
            .map_err(CascadeError::read)?
            .ok_or(CascadeError::NotFound(Resource::Client))
    }

    /// Every file row in scope, soft-deleted ones included.
    pub async fn files(&self, scope: FileScope) -> Result<Vec<FileRow>, CascadeError> {
        self.records
            .list_files(&self.grant, scope)
            .await
            .map_err(CascadeError::read)
    }
}
