use crate::error::CatalogError;
use crate::models::QueryKind;
use crate::query::Fingerprint;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_MAX_AGE_DAYS: i64 = 14;

/// Where cached responses live and how long they stay usable.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub directory: PathBuf,
    pub max_age_days: i64,
}

impl StoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }

    pub fn with_max_age_days(mut self, days: i64) -> Self {
        self.max_age_days = days;
        self
    }
}

/// On-disk layout of one cached response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(rename = "DATE")]
    date: NaiveDate,
    #[serde(rename = "Q-STRING", default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(rename = "ITEMS")]
    items: Vec<Value>,
}

/// A candidate file read back from the cache directory.
struct Candidate {
    path: PathBuf,
    entry: CacheEntry,
    modified: Option<SystemTime>,
}

/// JSON response cache keyed by query kind and, for titles, fingerprint.
///
/// Titles are written to `titles-<digest>.json`, so one fingerprint maps to
/// one file. Reads scan every file of the requested kind and compare the
/// stored `Q-STRING`, which also picks up files left by older naming
/// schemes. When several match, the newest `DATE` wins.
pub struct ResponseStore {
    config: StoreConfig,
}

impl ResponseStore {
    /// Open the store, creating the cache directory if needed.
    ///
    /// A directory that cannot be created leaves the store usable: reads
    /// miss and writes fail, and callers carry on without caching.
    pub fn open(config: StoreConfig) -> Self {
        if !config.directory.is_dir() {
            info!("Creating cache directory at {}", config.directory.display());
        }
        if let Err(e) = fs::create_dir_all(&config.directory) {
            warn!(
                "Could not create cache directory {}, continuing without a cache: {}",
                config.directory.display(),
                e
            );
        }
        Self { config }
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    pub fn max_age_days(&self) -> i64 {
        self.config.max_age_days
    }

    /// Persist `items`, replacing any earlier entry for the same key.
    #[instrument(skip(self, kind, fingerprint, items), fields(kind = %kind, items = items.len()))]
    pub fn put(
        &self,
        kind: QueryKind,
        fingerprint: Option<&Fingerprint>,
        items: &[Value],
    ) -> Result<PathBuf, CatalogError> {
        self.put_dated(kind, fingerprint, items, today())
    }

    pub(crate) fn put_dated(
        &self,
        kind: QueryKind,
        fingerprint: Option<&Fingerprint>,
        items: &[Value],
        date: NaiveDate,
    ) -> Result<PathBuf, CatalogError> {
        let query = match (kind, fingerprint) {
            (QueryKind::Titles, Some(fp)) => Some(fp.as_str().to_string()),
            (QueryKind::Titles, None) => {
                return Err(CatalogError::PreconditionViolation(
                    "title responses must be stored with a fingerprint".to_string(),
                ))
            }
            _ => None,
        };

        let entry = CacheEntry {
            date,
            query,
            items: items.to_vec(),
        };
        let body = serde_json::to_string_pretty(&entry)
            .map_err(|e| CatalogError::Io(std::io::Error::other(e)))?;

        let path = self.config.directory.join(file_name(kind, fingerprint));
        fs::create_dir_all(&self.config.directory)?;
        fs::write(&path, body)?;

        debug!("Saved response to {}", path.display());
        Ok(path)
    }

    /// Fetch the items of a fresh, matching entry.
    ///
    /// Unreadable or corrupt files count as misses.
    #[instrument(skip(self, kind, fingerprint), fields(kind = %kind))]
    pub fn get(&self, kind: QueryKind, fingerprint: Option<&Fingerprint>) -> Option<Vec<Value>> {
        self.get_as_of(kind, fingerprint, today())
    }

    pub(crate) fn get_as_of(
        &self,
        kind: QueryKind,
        fingerprint: Option<&Fingerprint>,
        today: NaiveDate,
    ) -> Option<Vec<Value>> {
        let wanted = match kind {
            QueryKind::Titles => Some(fingerprint?.as_str()),
            _ => None,
        };

        let newest = self
            .candidates(kind)
            .into_iter()
            .filter(|c| wanted.is_none() || c.entry.query.as_deref() == wanted)
            .max_by(|a, b| {
                a.entry
                    .date
                    .cmp(&b.entry.date)
                    .then_with(|| a.modified.cmp(&b.modified))
            });

        let Some(candidate) = newest else {
            debug!("No saved response found");
            return None;
        };

        let age = (today - candidate.entry.date).num_days();
        if age >= self.config.max_age_days {
            info!(
                "Saved response {} is {} days old; maximum age is {} days",
                candidate.path.display(),
                age,
                self.config.max_age_days
            );
            return None;
        }
        if candidate.entry.items.is_empty() {
            debug!("Saved response {} has no items", candidate.path.display());
            return None;
        }

        debug!("Using saved response {} ({} days old)", candidate.path.display(), age);
        Some(candidate.entry.items)
    }

    fn candidates(&self, kind: QueryKind) -> Vec<Candidate> {
        let entries = match fs::read_dir(&self.config.directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not read cache directory: {}", e);
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| belongs_to(kind, name))
            })
            .filter_map(|entry| load(&entry.path()))
            .collect()
    }

    /// Delete every file in the cache directory; returns how many were removed.
    #[instrument(skip(self))]
    pub fn clear(&self) -> usize {
        info!("Clearing cache directory {}", self.config.directory.display());
        let mut removed = 0;
        for path in self.files() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not delete {}: {}", path.display(), e),
            }
        }
        removed
    }

    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.files()
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Regular files directly inside the cache directory.
    fn files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.config.directory) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect()
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn file_name(kind: QueryKind, fingerprint: Option<&Fingerprint>) -> String {
    match (kind, fingerprint) {
        (QueryKind::Titles, Some(fp)) => {
            let digest = format!("{:x}", Sha256::digest(fp.as_str().as_bytes()));
            format!("titles-{}.json", &digest[..16])
        }
        _ => format!("{}.json", kind.as_str()),
    }
}

/// Whether a file name holds responses of `kind`, including legacy names.
fn belongs_to(kind: QueryKind, name: &str) -> bool {
    if !name.ends_with(".json") {
        return false;
    }
    match kind {
        QueryKind::Titles => name.starts_with("titles-") || name.starts_with("fetchTitles"),
        QueryKind::Genres => name == "genres.json" || name == "fetchGenres.json",
        QueryKind::Regions => name == "regions.json" || name == "fetchAvailableRegions.json",
    }
}

fn load(path: &Path) -> Option<Candidate> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read saved response {}: {}", path.display(), e);
            return None;
        }
    };
    let entry: CacheEntry = match serde_json::from_str(&content) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Ignoring unreadable saved response {}: {}", path.display(), e);
            return None;
        }
    };
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
    Some(Candidate {
        path: path.to_path_buf(),
        entry,
        modified,
    })
}
