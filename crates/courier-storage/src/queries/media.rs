// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relocated media keyed by source fingerprint.

use courier_core::{CourierError, MediaFingerprint, MediaMetadata, RelocatedAsset};
use rusqlite::params;

use crate::database::Database;

/// Record a relocated asset. The first record for a fingerprint wins.
pub async fn insert_relocated(db: &Database, asset: &RelocatedAsset) -> Result<(), CourierError> {
    let asset = asset.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO relocated_media
                     (media_id, access_hash, dc_id, storage_channel, message_index,
                      duration_secs, width, height, supports_streaming, caption)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(media_id, access_hash, dc_id) DO NOTHING",
                params![
                    asset.fingerprint.media_id,
                    asset.fingerprint.access_hash,
                    asset.fingerprint.dc_id,
                    asset.storage_channel,
                    asset.message_index,
                    asset.metadata.duration_secs,
                    asset.metadata.width,
                    asset.metadata.height,
                    asset.metadata.supports_streaming,
                    asset.caption,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Look up the relocated copy of a fingerprint.
pub async fn get_relocated(
    db: &Database,
    fingerprint: &MediaFingerprint,
) -> Result<Option<RelocatedAsset>, CourierError> {
    let fp = *fingerprint;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT storage_channel, message_index, duration_secs, width, height,
                        supports_streaming, caption
                 FROM relocated_media
                 WHERE media_id = ?1 AND access_hash = ?2 AND dc_id = ?3",
            )?;
            let result = stmt.query_row(params![fp.media_id, fp.access_hash, fp.dc_id], |row| {
                Ok(RelocatedAsset {
                    storage_channel: row.get(0)?,
                    message_index: row.get(1)?,
                    fingerprint: fp,
                    metadata: MediaMetadata {
                        duration_secs: row.get(2)?,
                        width: row.get(3)?,
                        height: row.get(4)?,
                        supports_streaming: row.get(5)?,
                    },
                    caption: row.get(6)?,
                })
            });
            match result {
                Ok(asset) => Ok(Some(asset)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}
