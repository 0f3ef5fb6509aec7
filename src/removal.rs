//! Physical removal of stored objects ahead of their rows.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cascade::CascadeError;
use crate::models::ObjectLocation;
use crate::privilege::Grant;
use crate::storage::ObjectStorage;

/// Largest number of paths sent in one removal call.
pub const REMOVE_BATCH_SIZE: usize = 100;

/// How many paths go into one removal call for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Batching {
    /// Everything for a bucket in one call (a single file or document).
    Single,
    /// At most this many paths per call.
    Chunked(usize),
}

/// Paths grouped by bucket, buckets in first-seen order.
pub fn group_by_bucket<I>(locations: I) -> Vec<(String, Vec<String>)>
where
    I: IntoIterator<Item = ObjectLocation>,
{
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for location in locations {
        match groups
            .iter_mut()
            .find(|(bucket, _)| *bucket == location.bucket)
        {
            Some((_, paths)) => paths.push(location.path),
            None => groups.push((location.bucket, vec![location.path])),
        }
    }
    groups
}

/// The backend reports an already-absent object or bucket as "not found";
/// for a removal that is the desired end state.
pub fn is_not_found(message: &str) -> bool {
    message.to_lowercase().contains("not found")
}

pub struct StorageRemover {
    storage: Arc<dyn ObjectStorage>,
    grant: Grant,
}

impl StorageRemover {
    pub fn new(storage: Arc<dyn ObjectStorage>, grant: Grant) -> Self {
        Self { storage, grant }
    }

    /// Removes every object. Stops at the first failure that is not a
    /// "not found"; objects removed before that stay removed. Returns the
    /// number of paths sent to storage.
    pub async fn remove<I>(&self, locations: I, batching: Batching) -> Result<usize, CascadeError>
    where
        I: IntoIterator<Item = ObjectLocation>,
    {
        let mut requested = 0;

        for (bucket, paths) in group_by_bucket(locations) {
            let size = match batching {
                Batching::Single => paths.len().max(1),
                Batching::Chunked(size) => size.max(1),
            };

            for chunk in paths.chunks(size) {
                requested += chunk.len();
                match self
                    .storage
                    .remove_objects(&self.grant, &bucket, chunk)
                    .await
                {
                    Ok(()) => debug!(bucket = %bucket, count = chunk.len(), "removed objects"),
                    Err(err) => {
                        let message = format!("{err:#}");
                        if is_not_found(&message) {
                            info!(bucket = %bucket, error = %message, "objects already absent");
                            continue;
                        }
                        return Err(CascadeError::Storage {
                            message,
                            grant: self.grant.kind(),
                        });
                    }
                }
            }
        }

        Ok(requested)
    }
}
