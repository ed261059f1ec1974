//! Recorded clips waiting for `/audio-to-text`.
//!
//! Audio never goes into the session itself, the session only carries the
//! key. The store is capped by total bytes (oldest clips go first) and
//! clips expire after the session inactivity window. A background sweep
//! drops expired clips even if nobody comes back for them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tower_sessions::session::Id;
use tracing::debug;

use crate::providers::AudioClip;

struct PendingClip {
    clip: Arc<AudioClip>,
    stored_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct PendingInner {
    clips: HashMap<String, PendingClip>,
    total_bytes: usize,
    next_seq: u64,
}

impl PendingInner {
    fn remove(&mut self, key: &str) -> Option<PendingClip> {
        let removed = self.clips.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(removed.clip.bytes.len());
        Some(removed)
    }

    fn drop_expired(&mut self, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .clips
            .iter()
            .filter(|(_, pending)| pending.stored_at.elapsed() >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn oldest_key(&self) -> Option<String> {
        self.clips
            .iter()
            .min_by_key(|(_, pending)| pending.seq)
            .map(|(key, _)| key.clone())
    }
}

/// Bounded, expiring store of recorded clips.
pub(crate) struct PendingAudio {
    inner: Mutex<PendingInner>,
    ttl: Duration,
    max_bytes: usize,
}

impl PendingAudio {
    pub(crate) fn new(ttl: Duration, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(PendingInner::default()),
            ttl,
            max_bytes,
        }
    }

    /// Stores `clip` under a fresh random key, evicting expired and then
    /// oldest clips until it fits.
    pub(crate) async fn insert(&self, clip: AudioClip) -> String {
        let key = Id::default().to_string();
        let size = clip.bytes.len();
        let mut inner = self.inner.lock().await;
        inner.drop_expired(self.ttl);
        while inner.total_bytes + size > self.max_bytes {
            match inner.oldest_key() {
                Some(oldest) => {
                    debug!("Evicting pending clip to make room for {size} bytes");
                    inner.remove(&oldest);
                }
                None => break,
            }
        }
        inner.total_bytes += size;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.clips.insert(
            key.clone(),
            PendingClip {
                clip: Arc::new(clip),
                stored_at: Instant::now(),
                seq,
            },
        );
        key
    }

    /// The clip stored under `key`, unless it expired or was evicted.
    pub(crate) async fn get(&self, key: &str) -> Option<Arc<AudioClip>> {
        let mut inner = self.inner.lock().await;
        let expired = inner
            .clips
            .get(key)
            .map(|pending| pending.stored_at.elapsed() >= self.ttl)?;
        if expired {
            inner.remove(key);
            return None;
        }
        inner.clips.get(key).map(|pending| pending.clip.clone())
    }

    pub(crate) async fn remove(&self, key: &str) {
        self.inner.lock().await.remove(key);
    }

    /// Drops every expired clip, returning how many went.
    pub(crate) async fn sweep(&self) -> usize {
        self.inner.lock().await.drop_expired(self.ttl)
    }

    #[cfg(test)]
    pub(crate) async fn total_bytes(&self) -> usize {
        self.inner.lock().await.total_bytes
    }
}
