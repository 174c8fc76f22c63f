//! Persistence for trained engines.
//!
//! [`ModelStore`] writes each engine to `<dir>/<name>.json`, wrapped in a
//! versioned envelope. [`ModelRegistry`] sits in front of it on the serving
//! side and loads each model at most once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use wayfinder_types::{Result, WayfinderError};

use crate::engine::RouteEngine;

/// Envelope version written by this build.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ModelFileRef<'a> {
    format_version: u32,
    engine: &'a RouteEngine,
}

#[derive(Deserialize)]
struct ModelHeader {
    format_version: u32,
}

#[derive(Deserialize)]
struct ModelFile {
    engine: RouteEngine,
}

/// Directory of saved engines.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    /// The directory is created on the first [`save`](Self::save).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `name`.
    pub fn model_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Serialize `engine` under `name`, replacing any previous model.
    pub fn save(&self, engine: &RouteEngine, name: &str) -> Result<PathBuf> {
        let path = self.model_path(name)?;
        if !engine.is_trained() {
            return Err(WayfinderError::InvalidTrainingData {
                reason: format!("refusing to save untrained {} engine as '{name}'", engine.kind()),
            });
        }
        std::fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string(&ModelFileRef {
            format_version: FORMAT_VERSION,
            engine,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        info!(name, kind = %engine.kind(), path = %path.display(), "model saved");
        Ok(path)
    }

    /// Load the engine saved under `name`.
    pub fn load(&self, name: &str) -> Result<RouteEngine> {
        let path = self.model_path(name)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WayfinderError::ModelNotFound { name: name.into() });
            }
            Err(e) => return Err(e.into()),
        };

        let header: ModelHeader =
            serde_json::from_str(&raw).map_err(|e| WayfinderError::ModelFormat {
                reason: format!("{}: {e}", path.display()),
            })?;
        if header.format_version != FORMAT_VERSION {
            return Err(WayfinderError::ModelFormat {
                reason: format!(
                    "{}: format_version {} (expected {FORMAT_VERSION})",
                    path.display(),
                    header.format_version
                ),
            });
        }

        let file: ModelFile =
            serde_json::from_str(&raw).map_err(|e| WayfinderError::ModelFormat {
                reason: format!("{}: {e}", path.display()),
            })?;
        debug!(name, kind = %file.engine.kind(), "model loaded");
        Ok(file.engine)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(WayfinderError::ConfigInvalid {
            reason: format!("invalid model name '{name}': use letters, digits, '_' or '-'"),
        })
    }
}

/// Serving-side cache of loaded engines, single-flight per name.
///
/// Concurrent callers asking for the same name share one load. A failed
/// load is not remembered, so the next call retries.
pub struct ModelRegistry {
    store: ModelStore,
    cells: StdMutex<HashMap<String, Arc<OnceCell<Arc<RouteEngine>>>>>,
}

impl ModelRegistry {
    pub fn new(store: ModelStore) -> Self {
        Self {
            store,
            cells: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Names with a successfully loaded engine.
    pub fn loaded(&self) -> Vec<String> {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = cells
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn get_or_load(&self, name: &str) -> Result<Arc<RouteEngine>> {
        validate_name(name)?;
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
            cells.entry(name.to_string()).or_default().clone()
        };
        let loaded = cell
            .get_or_try_init(|| async {
                let store = self.store.clone();
                let owned = name.to_string();
                let engine = tokio::task::spawn_blocking(move || store.load(&owned))
                    .await
                    .map_err(|e| WayfinderError::ModelFormat {
                        reason: format!("model load task failed: {e}"),
                    })??;
                Ok::<_, WayfinderError>(Arc::new(engine))
            })
            .await;
        match loaded {
            Ok(engine) => Ok(engine.clone()),
            Err(e) => {
                self.forget_failed(name, &cell);
                Err(e)
            }
        }
    }

    /// Remove `name`'s cell if it never loaded and no other caller holds it.
    fn forget_failed(&self, name: &str, cell: &Arc<OnceCell<Arc<RouteEngine>>>) {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        let idle = cells.get(name).is_some_and(|held| {
            Arc::ptr_eq(held, cell) && !held.initialized() && Arc::strong_count(held) == 2
        });
        if idle {
            cells.remove(name);
            debug!(name, "dropped cell of failed load");
        }
    }

    /// Load several models concurrently, failing on the first error.
    pub async fn preload<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        try_join_all(names.iter().map(|n| self.get_or_load(n.as_ref()))).await?;
        Ok(())
    }
}
