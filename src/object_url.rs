//! Process-local, revocable references to in-memory blobs.
//!
//! An [`ObjectUrl`] is the only way the player hands audio bytes to the
//! engine. The registry keeps the bytes alive until the handle is dropped, at
//! which point the URL is revoked and can no longer be resolved.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const URL_PREFIX: &str = "blob:wavedeck/";

/// Registry of live blob URLs.
#[derive(Default)]
pub struct ObjectUrls {
    blobs: Mutex<HashMap<String, Arc<[u8]>>>,
    next_id: AtomicU64,
    issued: AtomicUsize,
    revoked: AtomicUsize,
}

impl ObjectUrls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mint a new URL for `bytes`. The URL stays resolvable until the
    /// returned handle is dropped.
    pub fn create(self: &Arc<Self>, bytes: impl Into<Arc<[u8]>>) -> ObjectUrl {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{URL_PREFIX}{id}");
        let bytes = bytes.into();
        tracing::debug!(%url, len = bytes.len(), "issued object url");
        let mut blobs = self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        blobs.insert(url.clone(), bytes);
        self.issued.fetch_add(1, Ordering::SeqCst);
        drop(blobs);
        ObjectUrl {
            url,
            registry: Arc::clone(self),
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(url)
            .cloned()
    }

    fn revoke(&self, url: &str) {
        let mut blobs = self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // unknown urls are ignored
        if blobs.remove(url).is_some() {
            self.revoked.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(%url, "revoked object url");
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> usize {
        self.revoked.load(Ordering::SeqCst)
    }

    /// Number of URLs issued and not yet revoked.
    pub fn live(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Owned handle to a blob URL. Dropping it revokes the URL exactly once.
pub struct ObjectUrl {
    url: String,
    registry: Arc<ObjectUrls>,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Bytes behind this URL. Always present while the handle lives.
    pub fn bytes(&self) -> Arc<[u8]> {
        self.registry
            .resolve(&self.url)
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_resolves_until_dropped() {
        let urls = ObjectUrls::new();
        let handle = urls.create(vec![1u8, 2, 3]);
        let url = handle.as_str().to_owned();
        assert!(url.starts_with("blob:wavedeck/"));
        assert_eq!(&*urls.resolve(&url).unwrap(), &[1, 2, 3]);
        assert_eq!(urls.live(), 1);

        drop(handle);
        assert!(urls.resolve(&url).is_none());
        assert_eq!(urls.issued(), 1);
        assert_eq!(urls.revoked(), 1);
        assert_eq!(urls.live(), 0);
    }

    #[test]
    fn every_handle_gets_a_distinct_url() {
        let urls = ObjectUrls::new();
        let a = urls.create(vec![0u8]);
        let b = urls.create(vec![0u8]);
        assert_ne!(a.as_str(), b.as_str());
        drop((a, b));
        assert_eq!(urls.revoked(), 2);
    }

    #[test]
    fn revoking_unknown_url_is_not_counted() {
        let urls = ObjectUrls::new();
        urls.revoke("blob:wavedeck/404");
        assert_eq!(urls.revoked(), 0);
    }
}
