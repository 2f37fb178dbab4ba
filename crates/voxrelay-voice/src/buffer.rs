//! Per-session accumulation of caller audio ahead of transcription.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default number of buffered bytes that triggers a transcription.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 60_000;

#[derive(Debug)]
struct PendingAudio {
    audio: Vec<u8>,
    last_append: Instant,
}

/// Audio chunks accumulated per session until a batch is large enough to
/// transcribe.
#[derive(Debug)]
pub struct SttBufferStore {
    threshold: usize,
    buffers: Mutex<HashMap<String, PendingAudio>>,
}

impl Default for SttBufferStore {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl SttBufferStore {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Appends `chunk` to the session's buffer. Once the buffer holds at least
    /// `threshold` bytes it is removed and returned as one batch; otherwise
    /// `None` is returned.
    ///
    /// Concurrent appends for one session are serialized, so every byte ends
    /// up in exactly one batch.
    pub async fn append(&self, session_id: &str, chunk: &[u8]) -> Option<Vec<u8>> {
        let mut buffers = self.buffers.lock().await;
        let pending = buffers
            .entry(session_id.to_string())
            .or_insert_with(|| PendingAudio {
                audio: Vec::new(),
                last_append: Instant::now(),
            });
        pending.audio.extend_from_slice(chunk);
        pending.last_append = Instant::now();
        if pending.audio.len() >= self.threshold {
            buffers.remove(session_id).map(|p| p.audio)
        } else {
            None
        }
    }

    /// Bytes currently held for a session.
    pub async fn buffered_len(&self, session_id: &str) -> usize {
        self.buffers
            .lock()
            .await
            .get(session_id)
            .map_or(0, |p| p.audio.len())
    }

    /// Drops whatever a session has buffered.
    pub async fn discard(&self, session_id: &str) {
        self.buffers.lock().await.remove(session_id);
    }

    pub async fn session_count(&self) -> usize {
        self.buffers.lock().await.len()
    }

    /// Drops every buffer that has not grown for at least `max_idle`.
    /// Returns how many were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut buffers = self.buffers.lock().await;
        let before = buffers.len();
        buffers.retain(|_, p| p.last_append.elapsed() < max_idle);
        before - buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn below_threshold_accumulates() {
        let store = SttBufferStore::new(100);
        assert!(store.append("s1", &[0u8; 40]).await.is_none());
        assert!(store.append("s1", &[0u8; 40]).await.is_none());
        assert_eq!(store.buffered_len("s1").await, 80);
    }

    #[tokio::test]
    async fn crossing_threshold_drains_buffer() {
        let store = SttBufferStore::new(100);
        store.append("s1", &[1u8; 60]).await;
        let batch = store.append("s1", &[2u8; 60]).await.expect("batch");

        assert_eq!(batch.len(), 120);
        assert_eq!(&batch[..60], &[1u8; 60][..]);
        assert_eq!(&batch[60..], &[2u8; 60][..]);
        assert_eq!(store.buffered_len("s1").await, 0);
        assert!(store.append("s1", &[3u8; 10]).await.is_none());
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let store = SttBufferStore::new(100);
        store.append("a", &[0u8; 90]).await;
        assert!(store.append("b", &[0u8; 20]).await.is_none());
        assert_eq!(store.buffered_len("a").await, 90);
        assert_eq!(store.buffered_len("b").await, 20);

        store.discard("a").await;
        assert_eq!(store.buffered_len("a").await, 0);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_buffers_are_evicted() {
        let store = SttBufferStore::new(100);
        store.append("stale", &[0u8; 10]).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        store.append("fresh", &[0u8; 10]).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(store.evict_idle(Duration::from_secs(60)).await, 1);
        assert_eq!(store.buffered_len("stale").await, 0);
        assert_eq!(store.buffered_len("fresh").await, 10);
    }

    #[tokio::test]
    async fn concurrent_appends_lose_no_bytes() {
        let store = Arc::new(SttBufferStore::new(1000));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append("s1", &[0u8; 100]).await.map_or(0, |b| b.len())
            }));
        }

        let mut flushed = 0;
        for handle in handles {
            flushed += handle.await.unwrap();
        }
        assert_eq!(flushed + store.buffered_len("s1").await, 5000);
    }
}
