//! Descriptor persistence boundary.
//!
//! The store is a plain keyed row store: it never computes similarity.
//! Search runs in this crate over whatever `read_all_active` returns.

use crate::types::{DescriptorRecord, FaceDescriptor, NewDescriptor};
use chrono::Utc;
use std::future::Future;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The persistence backend failed. Retryable; callers must surface
    /// this distinctly from a genuine no-match.
    #[error("descriptor store unavailable: {0}")]
    Unavailable(String),
}

/// Durable descriptor storage keyed by owner.
///
/// Writes must be atomic: a concurrent reader never observes a
/// half-written vector. Always constructed explicitly and passed in;
/// tests substitute [`MemoryStore`].
pub trait DescriptorStore {
    /// Persist a new active descriptor, returning its id.
    fn write(
        &self,
        descriptor: NewDescriptor,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// All currently-active descriptors.
    fn read_all_active(
        &self,
    ) -> impl Future<Output = Result<Vec<DescriptorRecord>, StoreError>> + Send;

    /// Flip every descriptor of `owner_id` to inactive; returns how many
    /// were flipped. Rows are never hard-deleted.
    fn deactivate(&self, owner_id: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<FaceDescriptor>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, active or not.
    pub fn len(&self) -> usize {
        self.rows.lock().expect("store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DescriptorStore for MemoryStore {
    fn write(
        &self,
        descriptor: NewDescriptor,
    ) -> impl Future<Output = Result<String, StoreError>> + Send {
        let id = Uuid::new_v4().to_string();
        let row = FaceDescriptor {
            id: id.clone(),
            owner_id: descriptor.owner_id,
            vector: descriptor.vector,
            captured_at: Utc::now(),
            active: true,
            source_image: descriptor.source_image,
        };
        self.rows.lock().expect("store poisoned").push(row);
        async move { Ok(id) }
    }

    fn read_all_active(
        &self,
    ) -> impl Future<Output = Result<Vec<DescriptorRecord>, StoreError>> + Send {
        let records: Vec<DescriptorRecord> = self
            .rows
            .lock()
            .expect("store poisoned")
            .iter()
            .filter(|row| row.active)
            .map(|row| DescriptorRecord {
                id: row.id.clone(),
                owner_id: row.owner_id.clone(),
                vector: row.vector.clone(),
                captured_at: row.captured_at,
                source_image: row.source_image.clone(),
            })
            .collect();
        async move { Ok(records) }
    }

    fn deactivate(&self, owner_id: &str) -> impl Future<Output = Result<u64, StoreError>> + Send {
        let mut flipped = 0u64;
        for row in self
            .rows
            .lock()
            .expect("store poisoned")
            .iter_mut()
            .filter(|row| row.active && row.owner_id == owner_id)
        {
            row.active = false;
            flipped += 1;
        }
        async move { Ok(flipped) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DESCRIPTOR_DIM;

    fn descriptor(owner: &str) -> NewDescriptor {
        NewDescriptor {
            owner_id: owner.to_string(),
            vector: vec![0.1f32; DESCRIPTOR_DIM],
            source_image: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let store = MemoryStore::new();
        let id = store.write(descriptor("c-9")).await.unwrap();

        let active = store.read_all_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert_eq!(active[0].owner_id, "c-9");
    }

    #[tokio::test]
    async fn deactivate_hides_rows_but_keeps_them() {
        let store = MemoryStore::new();
        store.write(descriptor("c-9")).await.unwrap();
        store.write(descriptor("c-9")).await.unwrap();
        store.write(descriptor("c-7")).await.unwrap();

        let flipped = store.deactivate("c-9").await.unwrap();
        assert_eq!(flipped, 2);

        let active = store.read_all_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].owner_id, "c-7");

        // Soft delete: the rows still exist.
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn deactivate_unknown_owner_is_a_noop() {
        let store = MemoryStore::new();
        assert_eq!(store.deactivate("nobody").await.unwrap(), 0);
    }
}
