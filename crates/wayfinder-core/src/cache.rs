//! Persistent cache of generated routes and sessions.
//!
//! Each cache key maps to one JSON file under the cache directory:
//!
//! - `routes-<sha256 of description>.json` for the routes of a domain
//! - `sessions-<route id>.json` for the sessions of one route
//!
//! Lookups top up incrementally: when fewer items than requested are
//! cached, only the deficit is generated and appended. Unreadable files
//! count as misses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wayfinder_types::{NavigationContext, Result, Route, Session};

use crate::synthesizer::NavigationSource;

/// On-disk shape of one cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    key: String,
    updated_at: DateTime<Utc>,
    items: Vec<T>,
}

/// Deterministic cache key for a domain description (SHA-256, hex).
pub fn context_key(description: &str) -> String {
    let digest = Sha256::digest(description.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// File-backed, incrementally filled cache in front of a [`NavigationSource`].
pub struct NavigationCache {
    dir: PathBuf,
    source: Arc<dyn NavigationSource>,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NavigationCache {
    pub fn new(dir: impl Into<PathBuf>, source: Arc<dyn NavigationSource>) -> Self {
        Self {
            dir: dir.into(),
            source,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Routes for `description`, generating only what the cache lacks.
    ///
    /// With `force_new`, `count` fresh routes are generated, appended to the
    /// cache and returned on their own.
    pub async fn get_or_create_routes(
        &self,
        description: &str,
        count: usize,
        force_new: bool,
    ) -> Result<Vec<Route>> {
        let file_key = format!("routes-{}", context_key(description));
        self.get_or_fill(
            &file_key,
            count,
            force_new,
            |deficit| stream::once(self.source.generate_routes(description, deficit)).boxed(),
            |route| Route {
                id: new_id(),
                ..route
            },
        )
        .await
    }

    /// Sessions for `route`, generating only what the cache lacks.
    ///
    /// Every stored session references `route.id`. Each finished batch is
    /// written before the next is awaited, so a failing batch loses only
    /// itself.
    pub async fn get_or_create_sessions(
        &self,
        route: &Route,
        count: usize,
        force_new: bool,
    ) -> Result<Vec<Session>> {
        let file_key = format!("sessions-{}", file_safe(&route.id));
        self.get_or_fill(
            &file_key,
            count,
            force_new,
            |deficit| self.source.session_batches(route, deficit),
            |session| Session {
                id: new_id(),
                route_id: route.id.clone(),
                ..session
            },
        )
        .await
    }

    /// Routes for `description` plus `session_count` sessions for each,
    /// with all routes' sessions fetched concurrently.
    pub async fn get_or_create_context(
        &self,
        description: &str,
        route_count: usize,
        session_count: usize,
        force_new: bool,
    ) -> Result<NavigationContext> {
        let routes = self
            .get_or_create_routes(description, route_count, force_new)
            .await?;
        let per_route = try_join_all(
            routes
                .iter()
                .map(|r| self.get_or_create_sessions(r, session_count, force_new)),
        )
        .await?;
        let sessions: Vec<Session> = per_route.into_iter().flatten().collect();
        info!(
            routes = routes.len(),
            sessions = sessions.len(),
            "navigation context assembled"
        );
        Ok(NavigationContext::new(routes, sessions))
    }

    async fn get_or_fill<'a, T, F, S>(
        &self,
        file_key: &str,
        count: usize,
        force_new: bool,
        fill: F,
        stamp: S,
    ) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(usize) -> BoxStream<'a, Result<Vec<T>>>,
        S: Fn(T) -> T,
    {
        let lock = self.lock_for(file_key);
        let _guard = lock.lock().await;

        let path = self.path_for(file_key);
        let mut stored: Vec<T> = self.read(&path).await;

        if !force_new && stored.len() >= count {
            debug!(key = file_key, cached = stored.len(), count, "cache hit");
            stored.truncate(count);
            return Ok(stored);
        }

        let deficit = if force_new {
            count
        } else {
            count - stored.len()
        };
        debug!(
            key = file_key,
            cached = stored.len(),
            deficit,
            force_new,
            "cache fill"
        );

        let start = stored.len();
        let mut batches = fill(deficit);
        while let Some(batch) = batches.next().await {
            let room = deficit - (stored.len() - start);
            let fresh: Vec<T> = match batch {
                Ok(items) => items.into_iter().take(room).map(&stamp).collect(),
                Err(e) => {
                    warn!(
                        key = file_key,
                        kept = stored.len() - start,
                        error = %e,
                        "generation failed, keeping finished batches"
                    );
                    return Err(e);
                }
            };
            if fresh.is_empty() {
                continue;
            }
            stored.extend(fresh);
            self.write(&path, file_key, &stored).await?;
        }

        if force_new {
            return Ok(stored.split_off(start));
        }
        stored.truncate(count);
        Ok(stored)
    }

    fn lock_for(&self, file_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop locks nobody holds; only the map refers to them.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(file_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn path_for(&self, file_key: &str) -> PathBuf {
        self.dir.join(format!("{file_key}.json"))
    }

    /// Read a cache file; anything unreadable is an empty cache.
    async fn read<T: DeserializeOwned>(&self, path: &Path) -> Vec<T> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache file, treating as miss");
                return Vec::new();
            }
        };
        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) => entry.items,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache file, treating as miss");
                Vec::new()
            }
        }
    }

    /// Write via a temporary file and rename.
    async fn write<T: Serialize>(&self, path: &Path, key: &str, items: &[T]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let entry = CacheEntry {
            key: key.to_string(),
            updated_at: Utc::now(),
            items: items.iter().collect::<Vec<&T>>(),
        };
        let json = serde_json::to_string_pretty(&entry)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Route ids become file names; anything outside `[A-Za-z0-9_-]` is hashed.
fn file_safe(id: &str) -> String {
    let safe = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        id.to_string()
    } else {
        context_key(id)
    }
}
