//! Fetch-or-cache loading of the audio asset.
//!
//! The first load of a key fetches the asset and writes it to the store;
//! every later load is served from the store without touching the network.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{Receiver, bounded};
use thiserror::Error;

use crate::fetch::{FetchError, Fetcher};
use crate::object_url::{ObjectUrl, ObjectUrls};
use crate::store::{AssetStore, SqliteStore, StoreError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Fetched body for {0} was empty")]
    EmptyBody(String),
    #[error("Loader thread stopped before finishing")]
    Disconnected,
}

pub type LoadResult = Result<ObjectUrl, LoadError>;

pub struct AssetLoader<S, F> {
    store: S,
    fetcher: F,
    key: String,
    urls: Arc<ObjectUrls>,
}

impl<S: AssetStore, F: Fetcher> AssetLoader<S, F> {
    pub fn new(store: S, fetcher: F, key: impl Into<String>, urls: Arc<ObjectUrls>) -> Self {
        Self {
            store,
            fetcher,
            key: key.into(),
            urls,
        }
    }

    /// Return a local reference to the asset behind `url`, fetching and
    /// storing it only when the store has nothing under the key.
    pub fn load(&self, url: &str) -> LoadResult {
        let blob = match self.store.get(&self.key)? {
            Some(blob) => {
                tracing::info!(key = %self.key, len = blob.len(), "audio served from cache");
                blob
            }
            None => {
                tracing::info!(key = %self.key, %url, "cache miss");
                let blob = self.fetcher.fetch(url)?;
                if blob.is_empty() {
                    return Err(LoadError::EmptyBody(url.to_owned()));
                }
                self.store.put(&self.key, &blob)?;
                tracing::info!(key = %self.key, len = blob.len(), "audio cached");
                blob
            }
        };
        Ok(self.urls.create(blob))
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

/// Where and how the loader thread should open its store.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub path: Option<PathBuf>,
    pub name: String,
    pub version: u32,
    pub collection: String,
    pub key: String,
}

impl StoreLocation {
    fn open(&self) -> Result<SqliteStore, StoreError> {
        match &self.path {
            Some(path) => SqliteStore::open(path, &self.name, self.version, &self.collection),
            None => {
                tracing::warn!("no data directory, caching in memory for this session");
                SqliteStore::open_in_memory(&self.name, self.version, &self.collection)
            }
        }
    }
}

/// Run open-store, lookup, fetch and store on a background thread.
///
/// The result arrives on the returned channel. When the receiver has been
/// dropped by then, the result is dropped with it and any reference it held is
/// revoked.
pub fn spawn_load<F>(
    location: StoreLocation,
    fetcher: F,
    url: String,
    urls: Arc<ObjectUrls>,
) -> Receiver<LoadResult>
where
    F: Fetcher + Send + 'static,
{
    let (tx, rx) = bounded::<LoadResult>(1);
    thread::spawn(move || {
        let result = location
            .open()
            .map_err(LoadError::from)
            .and_then(|store| AssetLoader::new(store, fetcher, location.key.clone(), urls).load(&url));
        if let Err(err) = &result {
            tracing::error!(%url, "audio load failed: {err}");
        }
        if tx.send(result).is_err() {
            tracing::debug!("player gone before load finished; discarding result");
        }
    });
    rx
}
