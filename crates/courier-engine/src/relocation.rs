// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media relocation: download, fresh upload to operator storage, record.
//!
//! A relocated copy is an upload, never a forward, so the "forwarded from"
//! marker does not follow the media. Playback metadata and the caption are
//! carried over on the upload request.

use std::sync::Arc;

use courier_core::{CourierError, MediaAsset, MessagingPlatform, RelocatedAsset, UploadRequest};
use tracing::{debug, info, warn};

use crate::dedup::DedupController;

/// A relocated asset and whether it was served from an earlier relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub asset: RelocatedAsset,
    pub reused: bool,
}

pub struct MediaRelocator {
    platform: Arc<dyn MessagingPlatform>,
    dedup: Arc<DedupController>,
    storage_channel: i64,
}

impl MediaRelocator {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        dedup: Arc<DedupController>,
        storage_channel: i64,
    ) -> Self {
        Self {
            platform,
            dedup,
            storage_channel,
        }
    }

    /// Relocate `source`, or return the copy made earlier.
    ///
    /// Relocations of one fingerprint are serialized; the second caller
    /// finds the first caller's record once it gets the lock.
    pub async fn relocate(&self, source: &MediaAsset) -> Result<Relocation, CourierError> {
        let fingerprint = source.fingerprint;
        if let Some(asset) = self.dedup.relocated(&fingerprint).await? {
            return Ok(self.reused(asset));
        }

        let lock = self.dedup.media_lock(&fingerprint);
        let result = {
            let _held = lock.lock().await;
            match self.dedup.relocated(&fingerprint).await {
                Ok(Some(asset)) => Ok(self.reused(asset)),
                Ok(None) => self.transfer(source).await,
                Err(e) => Err(e),
            }
        };
        drop(lock);
        self.dedup.release_media_lock(&fingerprint);
        result
    }

    async fn transfer(&self, source: &MediaAsset) -> Result<Relocation, CourierError> {
        let fingerprint = source.fingerprint;
        let dir = tempfile::Builder::new()
            .prefix("courier-")
            .tempdir()
            .map_err(|e| CourierError::Media {
                message: "failed to create download directory".into(),
                source: Some(Box::new(e)),
            })?;

        let uploaded = async {
            let local = self.platform.download_media(source, dir.path()).await?;
            debug!(%fingerprint, bytes = local.bytes, "media downloaded");
            self.platform
                .upload_media(self.storage_channel, &local.path, &UploadRequest::from(source))
                .await
        }
        .await;

        let dir_path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(path = %dir_path.display(), error = %e, "failed to remove download directory");
        }
        let message_index = uploaded?;

        let asset = RelocatedAsset {
            storage_channel: self.storage_channel,
            message_index,
            fingerprint,
            metadata: source.metadata.clone(),
            caption: source.caption.clone(),
        };
        self.dedup.record_relocated(&asset).await?;

        metrics::counter!("courier_media_relocated_total").increment(1);
        info!(%fingerprint, message_index, "media relocated");
        Ok(Relocation {
            asset,
            reused: false,
        })
    }

    fn reused(&self, asset: RelocatedAsset) -> Relocation {
        metrics::counter!("courier_media_reused_total").increment(1);
        debug!(fingerprint = %asset.fingerprint, message_index = asset.message_index, "reusing relocated media");
        Relocation {
            asset,
            reused: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_test_utils::fixtures::video;
    use courier_test_utils::{PlatformCall, ScriptedError, ScriptedPlatform};

    const STORAGE: i64 = -1002818242381;

    fn relocator(platform: &Arc<ScriptedPlatform>) -> MediaRelocator {
        MediaRelocator::new(
            platform.clone(),
            Arc::new(DedupController::in_memory()),
            STORAGE,
        )
    }

    #[tokio::test]
    async fn uploads_fresh_copy_with_metadata() {
        let platform = Arc::new(ScriptedPlatform::new());
        let source = video(11);

        let relocation = relocator(&platform).relocate(&source).await.unwrap();
        assert!(!relocation.reused);
        assert_eq!(relocation.asset.storage_channel, STORAGE);
        assert_eq!(relocation.asset.fingerprint, source.fingerprint);
        assert_eq!(relocation.asset.metadata, source.metadata);
        assert_eq!(relocation.asset.caption, source.caption);

        let uploads = platform.uploads().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].storage_channel, STORAGE);
        assert_eq!(uploads[0].request, UploadRequest::from(&source));
        assert_eq!(relocation.asset.message_index, uploads[0].message_index);
    }

    #[tokio::test]
    async fn local_copy_is_removed_after_upload() {
        let platform = Arc::new(ScriptedPlatform::new());
        relocator(&platform).relocate(&video(1)).await.unwrap();

        let downloads = platform.downloaded_paths().await;
        assert_eq!(downloads.len(), 1);
        assert!(!downloads[0].exists());
        assert!(!downloads[0].parent().unwrap().exists());
    }

    #[tokio::test]
    async fn local_copy_is_removed_when_upload_fails() {
        let platform = Arc::new(ScriptedPlatform::new());
        platform.fail_upload(ScriptedError::AccessDenied).await;

        let err = relocator(&platform).relocate(&video(1)).await.unwrap_err();
        assert!(matches!(err, CourierError::AccessDenied(_)));
        let downloads = platform.downloaded_paths().await;
        assert_eq!(downloads.len(), 1);
        assert!(!downloads[0].exists());
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_record() {
        let platform = Arc::new(ScriptedPlatform::new());
        platform.fail_upload(ScriptedError::AccessDenied).await;
        let relocator = relocator(&platform);

        assert!(relocator.relocate(&video(1)).await.is_err());
        let second = relocator.relocate(&video(1)).await.unwrap();
        assert!(!second.reused);
        assert_eq!(platform.uploads().await.len(), 1);
    }

    #[tokio::test]
    async fn same_fingerprint_is_uploaded_once() {
        let platform = Arc::new(ScriptedPlatform::new());
        let relocator = relocator(&platform);

        let first = relocator.relocate(&video(3)).await.unwrap();
        let second = relocator.relocate(&video(3)).await.unwrap();
        assert!(second.reused);
        assert_eq!(first.asset, second.asset);
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::Download { .. })).await,
            1
        );
        assert_eq!(platform.uploads().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_relocations_share_one_upload() {
        let platform = Arc::new(ScriptedPlatform::new());
        let relocator = Arc::new(relocator(&platform));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let relocator = Arc::clone(&relocator);
            handles.push(tokio::spawn(async move {
                relocator.relocate(&video(9)).await.unwrap()
            }));
        }
        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert_eq!(platform.uploads().await.len(), 1);
        assert_eq!(results.iter().filter(|r| !r.reused).count(), 1);
        assert!(results.windows(2).all(|w| w[0].asset == w[1].asset));
    }
}
