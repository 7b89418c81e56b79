//! Guild state store: the single owned, in-memory dataset plus its durable
//! JSON document.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::types::{Dataset, GuildId, GuildState};

/// Owns the dataset for the life of the process. The in-memory view is
/// always authoritative; durable storage lags by at most one debounce
/// window (see [`crate::persist::Persister`]).
///
/// All access goes through the `with_*` closures, which hold the mutex for
/// the duration of the closure only. The mutex is never held across an
/// await point — transport calls happen outside.
pub struct Store {
    path: PathBuf,
    data: Mutex<Dataset>,
    flushes: AtomicU64,
}

impl Store {
    /// Load the dataset from `path`, or start from defaults when the file
    /// is missing or unreadable.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(dataset) => dataset,
                Err(e) => {
                    warn!(path = %path.display(), "dataset unreadable, starting fresh: {e}");
                    Dataset::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no dataset on disk, starting fresh");
                Dataset::default()
            }
        };
        Self {
            path,
            data: Mutex::new(data),
            flushes: AtomicU64::new(0),
        }
    }

    /// Run a closure against the whole dataset.
    pub fn with_data<R>(&self, f: impl FnOnce(&mut Dataset) -> R) -> R {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut data)
    }

    /// Run a closure against one guild's state, creating default state on
    /// first reference. Creation never fails.
    pub fn with_guild<R>(&self, guild_id: &str, f: impl FnOnce(&mut GuildState) -> R) -> R {
        self.with_data(|data| {
            let guild = data.guilds.entry(guild_id.to_string()).or_default();
            f(guild)
        })
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.with_data(|data| data.guilds.keys().cloned().collect())
    }

    /// Serialize the dataset and durably replace the document on disk.
    /// The write goes to a temp file first so a failure mid-write never
    /// corrupts the previous good document.
    pub fn flush(&self) -> anyhow::Result<()> {
        let json = {
            let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*data)?
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Number of completed durable writes since startup.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mode;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::load_or_default(dir.path().join("data.json"));
        (dir, store)
    }

    #[test]
    fn first_reference_creates_default_guild() {
        let (_dir, store) = temp_store();
        let (mode, curfew) = store.with_guild("g1", |g| (g.mode, g.curfew.clone()));
        assert_eq!(mode, Mode::Sassy);
        assert_eq!(curfew, "23:00");
        assert_eq!(store.guild_ids(), vec!["g1".to_string()]);
    }

    #[test]
    fn flush_round_trips_through_the_document() {
        let (dir, store) = temp_store();
        store.with_guild("g1", |g| {
            g.night_mode = true;
            g.favor.insert("u1".into(), -3);
        });
        store.flush().expect("flush");
        assert_eq!(store.flush_count(), 1);

        let reloaded = Store::load_or_default(dir.path().join("data.json"));
        let (night, favor) = reloaded.with_guild("g1", |g| {
            (g.night_mode, g.favor.get("u1").copied())
        });
        assert!(night);
        assert_eq!(favor, Some(-3));
    }

    #[test]
    fn unreadable_document_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").expect("write");
        let store = Store::load_or_default(&path);
        assert!(store.guild_ids().is_empty());
    }
}
