//! SQLite-backed descriptor store.

use crate::seal::{self, SealKey};
use chrono::{DateTime, Utc};
use lineup_core::store::{DescriptorStore, StoreError};
use lineup_core::types::{validate_vector, DescriptorRecord, NewDescriptor};
use std::future::Future;
use std::path::Path;
use tokio_rusqlite::Connection;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS descriptors (
    id           TEXT PRIMARY KEY,
    owner_id     TEXT NOT NULL,
    vector       BLOB NOT NULL,
    nonce        BLOB NOT NULL,
    captured_at  TEXT NOT NULL,
    active       INTEGER NOT NULL DEFAULT 1,
    source_image TEXT
);
CREATE INDEX IF NOT EXISTS idx_descriptors_active ON descriptors(active);
CREATE INDEX IF NOT EXISTS idx_descriptors_owner ON descriptors(owner_id);
";

/// Descriptor store over a single SQLite file.
///
/// Every write is a single-statement insert, so readers never observe a
/// half-written vector. Vector blobs are sealed with [`SealKey`].
#[derive(Clone)]
pub struct SqliteDescriptorStore {
    conn: Connection,
    key: SealKey,
}

impl SqliteDescriptorStore {
    /// Open (creating if needed) the database at `db_path`.
    pub async fn open(db_path: &Path, key: SealKey) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(db_path).await.map_err(unavailable)?;
        Self::init(conn, key, &db_path.display().to_string()).await
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory(key: SealKey) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(unavailable)?;
        Self::init(conn, key, ":memory:").await
    }

    async fn init(conn: Connection, key: SealKey, label: &str) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(unavailable)?;

        tracing::info!(db = label, "descriptor store opened");
        Ok(Self { conn, key })
    }
}

impl DescriptorStore for SqliteDescriptorStore {
    fn write(
        &self,
        descriptor: NewDescriptor,
    ) -> impl Future<Output = Result<String, StoreError>> + Send {
        let conn = self.conn.clone();
        let key = self.key.clone();

        async move {
            let id = Uuid::new_v4().to_string();
            let captured_at = Utc::now().to_rfc3339();
            let (nonce, blob) = key
                .seal(&seal::vector_to_bytes(&descriptor.vector))
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

            let row_id = id.clone();
            conn.call(move |conn| {
                conn.execute(
                    "INSERT INTO descriptors (id, owner_id, vector, nonce, captured_at, active, source_image)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                    rusqlite::params![
                        row_id,
                        descriptor.owner_id,
                        blob,
                        nonce,
                        captured_at,
                        descriptor.source_image
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(unavailable)?;

            tracing::debug!(id = %id, "descriptor written");
            Ok(id)
        }
    }

    fn read_all_active(
        &self,
    ) -> impl Future<Output = Result<Vec<DescriptorRecord>, StoreError>> + Send {
        let conn = self.conn.clone();
        let key = self.key.clone();

        async move {
            type Row = (String, String, Vec<u8>, Vec<u8>, String, Option<String>);
            let rows: Vec<Row> = conn
                .call(|conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, owner_id, vector, nonce, captured_at, source_image
                         FROM descriptors WHERE active = 1 ORDER BY rowid",
                    )?;
                    let mapped = stmt.query_map([], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?;
                    let mut out = Vec::new();
                    for row in mapped {
                        out.push(row?);
                    }
                    Ok(out)
                })
                .await
                .map_err(unavailable)?;

            // Validate at ingress: one malformed or unopenable row is
            // skipped, never fatal to the whole read.
            let mut records = Vec::with_capacity(rows.len());
            for (id, owner_id, blob, nonce, captured_at, source_image) in rows {
                let plain = match key.open(&nonce, &blob) {
                    Ok(plain) => plain,
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, "skipping unopenable descriptor row");
                        continue;
                    }
                };
                let Some(vector) = seal::vector_from_bytes(&plain) else {
                    tracing::warn!(id = %id, "skipping descriptor row with ragged vector blob");
                    continue;
                };
                if let Err(e) = validate_vector(&vector) {
                    tracing::warn!(id = %id, error = %e, "skipping malformed descriptor row");
                    continue;
                }
                let captured_at = match DateTime::parse_from_rfc3339(&captured_at) {
                    Ok(t) => t.with_timezone(&Utc),
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, "skipping descriptor row with bad timestamp");
                        continue;
                    }
                };
                records.push(DescriptorRecord {
                    id,
                    owner_id,
                    vector,
                    captured_at,
                    source_image,
                });
            }
            Ok(records)
        }
    }

    fn deactivate(&self, owner_id: &str) -> impl Future<Output = Result<u64, StoreError>> + Send {
        let conn = self.conn.clone();
        let owner = owner_id.to_string();

        async move {
            let flipped = conn
                .call(move |conn| {
                    let changed = conn.execute(
                        "UPDATE descriptors SET active = 0 WHERE owner_id = ?1 AND active = 1",
                        [owner],
                    )?;
                    Ok(changed)
                })
                .await
                .map_err(unavailable)?;
            Ok(flipped as u64)
        }
    }
}

fn unavailable(e: tokio_rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineup_core::types::DESCRIPTOR_DIM;

    fn key() -> SealKey {
        SealKey::from_material(b"sqlite-store-tests")
    }

    fn descriptor(owner: &str, fill: f32) -> NewDescriptor {
        NewDescriptor {
            owner_id: owner.to_string(),
            vector: vec![fill; DESCRIPTOR_DIM],
            source_image: Some(format!("evidence/{owner}.jpg")),
        }
    }

    #[tokio::test]
    async fn write_read_roundtrip() {
        let store = SqliteDescriptorStore::open_in_memory(key()).await.unwrap();

        let id = store.write(descriptor("c-101", 0.25)).await.unwrap();
        let active = store.read_all_active().await.unwrap();

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert_eq!(active[0].owner_id, "c-101");
        assert_eq!(active[0].vector, vec![0.25f32; DESCRIPTOR_DIM]);
        assert_eq!(active[0].source_image.as_deref(), Some("evidence/c-101.jpg"));
    }

    #[tokio::test]
    async fn read_preserves_insertion_order() {
        let store = SqliteDescriptorStore::open_in_memory(key()).await.unwrap();
        store.write(descriptor("first", 0.1)).await.unwrap();
        store.write(descriptor("second", 0.2)).await.unwrap();
        store.write(descriptor("third", 0.3)).await.unwrap();

        let owners: Vec<String> = store
            .read_all_active()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.owner_id)
            .collect();
        assert_eq!(owners, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn deactivate_flips_only_that_owner() {
        let store = SqliteDescriptorStore::open_in_memory(key()).await.unwrap();
        store.write(descriptor("c-101", 0.1)).await.unwrap();
        store.write(descriptor("c-101", 0.2)).await.unwrap();
        store.write(descriptor("c-202", 0.3)).await.unwrap();

        assert_eq!(store.deactivate("c-101").await.unwrap(), 2);

        let active = store.read_all_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].owner_id, "c-202");

        // Repeat deactivation is a no-op, not an error.
        assert_eq!(store.deactivate("c-101").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn vectors_are_sealed_at_rest() {
        let store = SqliteDescriptorStore::open_in_memory(key()).await.unwrap();
        store.write(descriptor("c-101", 0.5)).await.unwrap();

        let raw: Vec<u8> = store
            .conn
            .call(|conn| {
                let blob =
                    conn.query_row("SELECT vector FROM descriptors", [], |row| row.get(0))?;
                Ok(blob)
            })
            .await
            .unwrap();

        let plain = seal::vector_to_bytes(&vec![0.5f32; DESCRIPTOR_DIM]);
        assert_ne!(raw, plain, "vector blob stored in the clear");
    }

    #[tokio::test]
    async fn tampered_row_is_skipped_not_fatal() {
        let store = SqliteDescriptorStore::open_in_memory(key()).await.unwrap();
        let bad_id = store.write(descriptor("c-101", 0.1)).await.unwrap();
        store.write(descriptor("c-202", 0.2)).await.unwrap();

        store
            .conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE descriptors SET vector = x'DEADBEEF' WHERE id = ?1",
                    [bad_id],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let active = store.read_all_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].owner_id, "c-202");
    }
}
