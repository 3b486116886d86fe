// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canned domain values.

use courier_core::{MediaAsset, MediaFingerprint, MediaMetadata};

/// A streamable 720p clip whose fingerprint is derived from `id`.
pub fn video(id: i64) -> MediaAsset {
    MediaAsset {
        fingerprint: MediaFingerprint {
            media_id: id,
            access_hash: id.wrapping_mul(7_919),
            dc_id: 4,
        },
        metadata: MediaMetadata {
            duration_secs: Some(95),
            width: Some(1280),
            height: Some(720),
            supports_streaming: true,
        },
        caption: Some(format!("clip {id}")),
        file_name: Some(format!("clip-{id}.mp4")),
        size: Some(4_096),
    }
}
