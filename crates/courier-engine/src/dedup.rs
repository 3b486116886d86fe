// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedup / idempotency controller.
//!
//! Tracks links that are in flight or completed and media that has already
//! been relocated. In-flight state always lives in memory. Completed links
//! and relocated media live in the durable store when one is configured,
//! and in memory only when it is not, so a long-running `serve` with a store
//! holds nothing but the claims currently in flight.
//!
//! A link claim is an atomic check-and-set under one mutex. The returned
//! [`ClaimGuard`] releases the claim when dropped unless it was completed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use courier_core::{CourierError, LinkRecord, MediaFingerprint, RelocatedAsset, StorageAdapter};
use tracing::{debug, warn};

#[derive(Default)]
struct DedupState {
    in_flight: HashSet<String>,
    completed: HashMap<String, LinkRecord>,
    media: HashMap<MediaFingerprint, RelocatedAsset>,
}

/// Result of trying to claim a link.
pub enum LinkClaim {
    /// The caller owns the link until the guard is completed or dropped.
    Claimed(ClaimGuard),
    /// Another task is working on it.
    InFlight,
    /// Already done; nothing to do.
    Completed(LinkRecord),
}

pub struct DedupController {
    state: Mutex<DedupState>,
    media_locks: Mutex<HashMap<MediaFingerprint, Arc<tokio::sync::Mutex<()>>>>,
    store: Option<Arc<dyn StorageAdapter>>,
}

impl DedupController {
    /// A controller with no durable backing; state dies with the process.
    pub fn in_memory() -> Self {
        Self::with_store(None)
    }

    pub fn with_store(store: Option<Arc<dyn StorageAdapter>>) -> Self {
        Self {
            state: Mutex::new(DedupState::default()),
            media_locks: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Completed records and relocated media are kept in memory only
    /// without a durable store.
    fn caches_results(&self) -> bool {
        self.store.is_none()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DedupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key` for processing.
    ///
    /// The key is marked in flight before the durable store is consulted, so
    /// concurrent callers never both see it as free.
    pub async fn claim_link(self: &Arc<Self>, key: &str) -> Result<LinkClaim, CourierError> {
        {
            let mut state = self.state();
            if let Some(record) = state.completed.get(key) {
                return Ok(LinkClaim::Completed(record.clone()));
            }
            if !state.in_flight.insert(key.to_string()) {
                return Ok(LinkClaim::InFlight);
            }
        }

        let guard = ClaimGuard {
            controller: Arc::clone(self),
            key: key.to_string(),
            finished: false,
        };

        if let Some(store) = &self.store
            && let Some(record) = store.get_link_record(key).await?
        {
            debug!(link = key, "link already resolved in durable store");
            guard.finish_with(record.clone());
            return Ok(LinkClaim::Completed(record));
        }

        Ok(LinkClaim::Claimed(guard))
    }

    /// True if `key` is currently claimed.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.state().in_flight.contains(key)
    }

    /// Previously relocated copy of `fingerprint`, if any.
    pub async fn relocated(
        &self,
        fingerprint: &MediaFingerprint,
    ) -> Result<Option<RelocatedAsset>, CourierError> {
        match &self.store {
            Some(store) => store.get_relocated(fingerprint).await,
            None => Ok(self.state().media.get(fingerprint).cloned()),
        }
    }

    /// Make a relocated asset visible to later lookups.
    pub async fn record_relocated(&self, asset: &RelocatedAsset) -> Result<(), CourierError> {
        match &self.store {
            Some(store) => store.put_relocated(asset).await,
            None => {
                self.state().media.insert(asset.fingerprint, asset.clone());
                Ok(())
            }
        }
    }

    /// Per-fingerprint async lock serializing relocations of the same media.
    pub fn media_lock(&self, fingerprint: &MediaFingerprint) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .media_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(*fingerprint).or_default())
    }

    /// Drop the lock entry for `fingerprint` once nobody else holds it.
    pub fn release_media_lock(&self, fingerprint: &MediaFingerprint) {
        let mut locks = self
            .media_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(fingerprint)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(fingerprint);
        }
    }

    fn release(&self, key: &str) {
        self.state().in_flight.remove(key);
    }

    fn finish(&self, key: &str, record: LinkRecord) {
        let caches = self.caches_results();
        let mut state = self.state();
        state.in_flight.remove(key);
        if caches {
            state.completed.insert(key.to_string(), record);
        }
    }
}

/// Ownership of an in-flight link.
pub struct ClaimGuard {
    controller: Arc<DedupController>,
    key: String,
    finished: bool,
}

impl ClaimGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist the outcome and publish it to later callers.
    ///
    /// If the durable write fails the claim is released without caching, so
    /// a later request may resolve the link again.
    pub async fn complete(self, record: LinkRecord) -> Result<(), CourierError> {
        if let Some(store) = &self.controller.store
            && let Err(e) = store.put_link_record(&record).await
        {
            warn!(link = %self.key, error = %e, "failed to persist link record");
            return Err(e);
        }
        self.finish_with(record);
        Ok(())
    }

    fn finish_with(mut self, record: LinkRecord) {
        self.controller.finish(&self.key, record);
        self.finished = true;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.controller.release(&self.key);
            debug!(link = %self.key, "claim released");
        }
    }
}
