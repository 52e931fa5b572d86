//! [`CacheStore`] implementation over SQLite.
//!
//! Each put is a single UPSERT inside a transaction, so a concurrent reader
//! sees either the previous entry or the new one, never a mix.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::hash::RequestKey;
use super::store::{CacheStore, Entry};
use crate::Error;
use crate::http::{Response, ResponseKind};

const ENTRY_COLUMNS: &str = "e.key_hash, e.method, e.url, e.status, e.kind, e.redirected,
     e.response_url, e.headers_json, e.body, e.stored_at";

/// Column values as read, before headers and kind are decoded.
struct EntryRow {
    hash: String,
    method: String,
    url: String,
    status: i64,
    kind: String,
    redirected: bool,
    response_url: String,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hash: row.get(0)?,
            method: row.get(1)?,
            url: row.get(2)?,
            status: row.get(3)?,
            kind: row.get(4)?,
            redirected: row.get::<_, i32>(5)? == 1,
            response_url: row.get(6)?,
            headers_json: row.get(7)?,
            body: row.get(8)?,
            stored_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<Entry, Error> {
        let headers: BTreeMap<String, String> = serde_json::from_str(&self.headers_json)?;
        let status = u16::try_from(self.status).map_err(|_| Error::Storage(format!("bad status {}", self.status)))?;
        Ok(Entry {
            key: RequestKey { hash: self.hash, method: self.method, url: self.url },
            response: Response {
                url: self.response_url,
                status,
                kind: self.kind.parse::<ResponseKind>()?,
                redirected: self.redirected,
                headers,
                body: Bytes::from(self.body),
            },
            stored_at: self.stored_at,
        })
    }
}

fn query_entries(
    conn: &rusqlite::Connection, filter: &str, args: impl rusqlite::Params,
) -> Result<Vec<Entry>, Error> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries e JOIN partitions p ON p.id = e.partition_id WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, EntryRow::from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?.into_entry()?);
    }
    Ok(entries)
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn create_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![name, created_at],
                )?;
                Ok(inserted == 1)
            })
            .await
            .map_err(Error::from)
    }

    async fn partitions(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY id ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn get_entry(&self, partition: &str, hash: &str) -> Result<Option<Entry>, Error> {
        let partition = partition.to_string();
        let hash = hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Entry>, Error> {
                let mut entries = query_entries(conn, "p.name = ?1 AND e.key_hash = ?2", params![partition, hash])?;
                Ok(entries.pop())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_entry(&self, partition: &str, entry: Entry) -> Result<(), Error> {
        let partition = partition.to_string();
        let headers_json = serde_json::to_string(&entry.response.headers)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![partition, entry.stored_at],
                )?;
                let partition_id: i64 =
                    tx.query_row("SELECT id FROM partitions WHERE name = ?1", params![partition], |row| row.get(0))?;
                tx.execute(
                    "INSERT INTO entries (
                        partition_id, key_hash, method, url, status, kind, redirected,
                        response_url, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(partition_id, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        kind = excluded.kind,
                        redirected = excluded.redirected,
                        response_url = excluded.response_url,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        partition_id,
                        &entry.key.hash,
                        &entry.key.method,
                        &entry.key.url,
                        entry.response.status as i64,
                        entry.response.kind.as_str(),
                        entry.response.redirected as i32,
                        &entry.response.url,
                        &headers_json,
                        entry.response.body.as_ref(),
                        &entry.stored_at,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_entry(&self, partition: &str, hash: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        let hash = hash.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE key_hash = ?2
                     AND partition_id = (SELECT id FROM partitions WHERE name = ?1)",
                    params![partition, hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn entries(&self, partition: &str) -> Result<Vec<Entry>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Entry>, Error> {
                query_entries(conn, "p.name = ?1 ORDER BY e.url ASC", params![partition])
            })
            .await
            .map_err(Error::from)
    }

    async fn count(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries e JOIN partitions p ON p.id = e.partition_id WHERE p.name = ?1",
                    params![partition],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn match_any(&self, hash: &str) -> Result<Option<Entry>, Error> {
        let hash = hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Entry>, Error> {
                let mut entries = query_entries(conn, "e.key_hash = ?1 ORDER BY p.id ASC LIMIT 1", params![hash])?;
                Ok(entries.pop())
            })
            .await
            .map_err(Error::from)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::store::{Caches, contract};

    async fn caches() -> Caches {
        Caches::new(Arc::new(CacheDb::open_in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        contract::put_get_overwrite(caches().await).await;
    }

    #[tokio::test]
    async fn test_refuses_unreplayable() {
        contract::refuses_unreplayable(caches().await).await;
    }

    #[tokio::test]
    async fn test_partitions_and_match_any() {
        contract::partitions_and_match_any(caches().await).await;
    }

    #[tokio::test]
    async fn test_delete_entry() {
        contract::delete_entry(caches().await).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_last_wins() {
        contract::concurrent_writers_last_wins(caches().await).await;
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        contract::open_is_idempotent(caches().await).await;
    }

    #[tokio::test]
    async fn test_binary_body_preserved() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = contract::key("https://app.test/icon.png");
        let body: Vec<u8> = (0u8..=255).collect();
        let response = Response::new("https://app.test/icon.png", 200, ResponseKind::Basic, body.clone())
            .with_header("content-type", "image/png");

        let entry = Entry { key: key.clone(), response, stored_at: chrono::Utc::now().to_rfc3339() };
        db.put_entry("app-static-v1", entry).await.unwrap();

        let stored = db.get_entry("app-static-v1", &key.hash).await.unwrap().unwrap();
        assert_eq!(stored.response.body.as_ref(), body.as_slice());
        assert_eq!(stored.response.headers.get("content-type").map(String::as_str), Some("image/png"));
        assert_eq!(stored.key.url, "https://app.test/icon.png");
    }

    #[tokio::test]
    async fn test_delete_partition_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = contract::key("https://app.test/");
        let entry = Entry {
            key: key.clone(),
            response: contract::ok("https://app.test/", "<html></html>"),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        db.put_entry("app-static-v0", entry).await.unwrap();
        assert!(db.delete_partition("app-static-v0").await.unwrap());

        let orphans: i64 = db
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(db.match_any(&key.hash).await.unwrap().is_none());
    }
}
