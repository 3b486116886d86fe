// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completed link records.

use courier_core::{CourierError, LinkRecord};
use rusqlite::params;

use super::json_column_err;
use crate::database::Database;

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<LinkRecord, rusqlite::Error> {
    let tokens: String = row.get(1)?;
    let fingerprints: String = row.get(2)?;
    Ok(LinkRecord {
        original_link: row.get(0)?,
        access_tokens: serde_json::from_str(&tokens).map_err(|e| json_column_err(1, e))?,
        media_fingerprints: serde_json::from_str(&fingerprints)
            .map_err(|e| json_column_err(2, e))?,
        resolved_at: row.get(3)?,
    })
}

/// Insert or replace the record for `record.original_link`.
pub async fn upsert_link_record(db: &Database, record: &LinkRecord) -> Result<(), CourierError> {
    let tokens = serde_json::to_string(&record.access_tokens).map_err(|e| CourierError::Storage {
        source: Box::new(e),
    })?;
    let fingerprints =
        serde_json::to_string(&record.media_fingerprints).map_err(|e| CourierError::Storage {
            source: Box::new(e),
        })?;
    let link = record.original_link.clone();
    let resolved_at = record.resolved_at.clone();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO link_records (original_link, access_tokens, media_fingerprints, resolved_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(original_link) DO UPDATE SET
                     access_tokens = excluded.access_tokens,
                     media_fingerprints = excluded.media_fingerprints,
                     resolved_at = excluded.resolved_at",
                params![link, tokens, fingerprints, resolved_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Look up a record by original link.
pub async fn get_link_record(
    db: &Database,
    original_link: &str,
) -> Result<Option<LinkRecord>, CourierError> {
    let link = original_link.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT original_link, access_tokens, media_fingerprints, resolved_at
                 FROM link_records WHERE original_link = ?1",
            )?;
            match stmt.query_row(params![link], row_to_record) {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recently resolved records first.
pub async fn list_link_records(db: &Database, limit: usize) -> Result<Vec<LinkRecord>, CourierError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT original_link, access_tokens, media_fingerprints, resolved_at
                 FROM link_records ORDER BY resolved_at DESC, original_link ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_record)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::MediaFingerprint;
    use tempfile::tempdir;

    fn record(link: &str, at: &str) -> LinkRecord {
        LinkRecord {
            original_link: link.to_string(),
            access_tokens: vec![format!("https://t.me/vault_bot?start={link}")],
            media_fingerprints: vec![MediaFingerprint {
                media_id: 1,
                access_hash: -2,
                dc_id: 4,
            }],
            resolved_at: at.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("l.db").to_str().unwrap(), true)
            .await
            .unwrap();

        assert!(get_link_record(&db, "a").await.unwrap().is_none());

        let r = record("a", "2026-01-01T00:00:00Z");
        upsert_link_record(&db, &r).await.unwrap();
        assert_eq!(get_link_record(&db, "a").await.unwrap(), Some(r));

        let mut newer = record("a", "2026-02-01T00:00:00Z");
        newer.access_tokens.push("second".into());
        upsert_link_record(&db, &newer).await.unwrap();
        assert_eq!(get_link_record(&db, "a").await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("l.db").to_str().unwrap(), true)
            .await
            .unwrap();

        upsert_link_record(&db, &record("old", "2026-01-01T00:00:00Z")).await.unwrap();
        upsert_link_record(&db, &record("new", "2026-03-01T00:00:00Z")).await.unwrap();
        upsert_link_record(&db, &record("mid", "2026-02-01T00:00:00Z")).await.unwrap();

        let all = list_link_records(&db, 10).await.unwrap();
        let links: Vec<_> = all.iter().map(|r| r.original_link.as_str()).collect();
        assert_eq!(links, ["new", "mid", "old"]);

        assert_eq!(list_link_records(&db, 1).await.unwrap().len(), 1);
    }
}
