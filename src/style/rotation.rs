use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng};
use tracing::{debug, info, warn};

/// Upper bound on modifier phrases appended to a base; the count is drawn from `1..=MAX_PHRASES`.
pub const MAX_PHRASES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("style base catalog is empty")]
    EmptyCatalog,
    #[error("style phrase catalog is empty")]
    EmptyPhrases,
    #[error("style queue at {path} is unreadable: {detail}")]
    Unreadable { path: PathBuf, detail: String },
    #[error("failed to persist style queue at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode style queue: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable home of the rotation queue between runs.
pub trait QueueStore {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Vec<String>>, StyleError>;
    fn save(&self, queue: &[String]) -> Result<(), StyleError>;
    /// Removing state that does not exist is not an error.
    fn clear(&self) -> Result<(), StyleError>;
}

/// Queue persisted as a JSON array of strings.
#[derive(Debug, Clone)]
pub struct JsonFileQueueStore {
    path: PathBuf,
}

impl JsonFileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|value| value.to_os_string())
            .unwrap_or_else(|| "style_queue.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist_error(&self, source: io::Error) -> StyleError {
        StyleError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}

impl QueueStore for JsonFileQueueStore {
    fn load(&self) -> Result<Option<Vec<String>>, StyleError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StyleError::Unreadable {
                    path: self.path.clone(),
                    detail: err.to_string(),
                })
            }
        };
        let queue = serde_json::from_str::<Vec<String>>(&raw).map_err(|err| {
            StyleError::Unreadable {
                path: self.path.clone(),
                detail: err.to_string(),
            }
        })?;
        Ok(Some(queue))
    }

    fn save(&self, queue: &[String]) -> Result<(), StyleError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.persist_error(err))?;
            }
        }
        let serialized = serde_json::to_string_pretty(queue)?;
        // Write-then-rename so a crash mid-write leaves the previous queue intact.
        let temp_path = self.temp_path();
        fs::write(&temp_path, serialized).map_err(|err| self.persist_error(err))?;
        fs::rename(&temp_path, &self.path).map_err(|err| self.persist_error(err))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StyleError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.persist_error(err)),
        }
    }
}

/// Process-local queue; nothing outlives the value.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    queue: Mutex<Option<Vec<String>>>,
}

impl MemoryQueueStore {
    pub fn with_queue(queue: Option<Vec<String>>) -> Self {
        Self {
            queue: Mutex::new(queue),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Vec<String>>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> Result<Option<Vec<String>>, StyleError> {
        Ok(self.slot().clone())
    }

    fn save(&self, queue: &[String]) -> Result<(), StyleError> {
        *self.slot() = Some(queue.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<(), StyleError> {
        *self.slot() = None;
        Ok(())
    }
}

/// Hands out style strings whose base never repeats until the whole catalog has been used.
///
/// Each call runs load → pop → persist against the store. There is no locking, so
/// two processes sharing one store can hand out the same base.
#[derive(Debug, Clone)]
pub struct StyleRotation<S> {
    store: S,
}

impl<S: QueueStore> StyleRotation<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn select_style(&self, bases: &[String], phrases: &[String]) -> Result<String, StyleError> {
        self.select_style_with(bases, phrases, &mut OsRng)
    }

    pub fn select_style_with<R>(
        &self,
        bases: &[String],
        phrases: &[String],
        rng: &mut R,
    ) -> Result<String, StyleError>
    where
        R: Rng + CryptoRng,
    {
        if bases.is_empty() {
            return Err(StyleError::EmptyCatalog);
        }
        if phrases.is_empty() {
            return Err(StyleError::EmptyPhrases);
        }

        let mut queue = self.load_queue(bases, rng);
        if queue.is_empty() {
            queue = shuffle_bases(bases, rng);
        }

        let base = queue.remove(0);
        self.store.save(&queue)?;
        debug!("Selected style base '{}' ({} left in cycle)", base, queue.len());

        let count = rng.gen_range(1..=MAX_PHRASES);
        let chosen = (0..count)
            .map(|_| phrases[rng.gen_range(0..phrases.len())].as_str())
            .collect::<Vec<_>>();

        Ok(format_style(&base, &chosen))
    }

    /// Unused bases left in the stored cycle; missing or unreadable state counts as zero.
    pub fn peek_remaining(&self) -> usize {
        match self.store.load() {
            Ok(Some(queue)) => queue.len(),
            _ => 0,
        }
    }

    pub fn reset_queue(&self) -> Result<(), StyleError> {
        self.store.clear()?;
        info!("Style queue cleared; next selection reshuffles the full catalog");
        Ok(())
    }

    fn load_queue<R>(&self, bases: &[String], rng: &mut R) -> Vec<String>
    where
        R: Rng + CryptoRng,
    {
        match self.store.load() {
            Ok(Some(stored)) if !stored.is_empty() => {
                let stored_len = stored.len();
                let queue = reconcile_queue(stored, bases);
                if queue.len() < stored_len {
                    info!(
                        "Dropped {} stale or duplicate entries from the stored style queue",
                        stored_len - queue.len()
                    );
                }
                queue
            }
            Ok(_) => {
                debug!("No stored style queue; shuffling {} bases", bases.len());
                shuffle_bases(bases, rng)
            }
            Err(err) => {
                warn!("{}; starting a fresh rotation", err);
                shuffle_bases(bases, rng)
            }
        }
    }
}

/// Joins a base and its modifier phrases as `"<base>, <phrase1>, <phrase2>"`.
pub fn format_style(base: &str, phrases: &[&str]) -> String {
    std::iter::once(base)
        .chain(phrases.iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Uniform permutation of the distinct catalog entries.
pub fn shuffle_bases<R>(bases: &[String], rng: &mut R) -> Vec<String>
where
    R: Rng,
{
    let mut seen = HashSet::new();
    let mut queue = bases
        .iter()
        .filter(|base| seen.insert(base.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    queue.shuffle(rng);
    queue
}

/// Keeps stored entries that are still in the catalog, first occurrence only, in stored order.
fn reconcile_queue(stored: Vec<String>, bases: &[String]) -> Vec<String> {
    let known = bases.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    stored
        .into_iter()
        .filter(|entry| known.contains(entry.as_str()) && seen.insert(entry.clone()))
        .collect()
}
