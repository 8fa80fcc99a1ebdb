//! Sheet storage backends.
//!
//! The workbook is a set of named worksheets, read in bulk and written back
//! whole. [`SheetStore`] is the seam to the hosted spreadsheet; this module
//! ships a gzip-file workbook for deployments and an in-memory one for demos
//! and tests, plus a time-boxed read cache that sits in front of either.

use log::{debug, warn};
use std::collections::HashMap;
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::saving;
use crate::sheet::Table;

pub const MAIN: &str = "Main";
pub const INTERACTION: &str = "Interaction";
pub const DELIVERY: &str = "Delivery";
pub const GA_SUPPORT: &str = "GA_Support";
pub const TRAVEL: &str = "Travel";

/// Every worksheet the application reads at startup
pub const WORKSHEETS: [&str; 5] = [MAIN, INTERACTION, DELIVERY, GA_SUPPORT, TRAVEL];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("worksheet '{0}' has an invalid name")]
    InvalidWorksheet(String),

    #[error("worksheet '{worksheet}': {source}")]
    Io {
        worksheet: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode row: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sheet store lock poisoned")]
    Poisoned,
}

/// Bulk read / full overwrite access to named worksheets
pub trait SheetStore: Send + Sync {
    /// Fetch every row of a worksheet. A worksheet that does not exist yet
    /// reads as an empty table.
    fn read(&self, worksheet: &str) -> Result<Table, StoreError>;

    /// Replace the whole worksheet with `table` (header row + all rows)
    fn overwrite(&self, worksheet: &str, table: &Table) -> Result<(), StoreError>;
}

fn check_name(worksheet: &str) -> Result<(), StoreError> {
    let ok = !worksheet.is_empty()
        && worksheet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidWorksheet(worksheet.to_string()))
    }
}

/// Workbook kept as one `<worksheet>.bin.gz` file per worksheet
pub struct LocalWorkbook {
    dir: PathBuf,
}

impl LocalWorkbook {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        create_dir_all(&dir).map_err(|source| StoreError::Io {
            worksheet: dir.display().to_string(),
            source,
        })?;
        Ok(LocalWorkbook { dir })
    }

    fn path(&self, worksheet: &str) -> PathBuf {
        self.dir.join(format!("{}.bin.gz", worksheet))
    }
}

impl SheetStore for LocalWorkbook {
    fn read(&self, worksheet: &str) -> Result<Table, StoreError> {
        check_name(worksheet)?;
        let path = self.path(worksheet);
        if !path.exists() {
            return Ok(Table::default());
        }
        saving::load_table(&path).map_err(|source| StoreError::Io {
            worksheet: worksheet.to_string(),
            source,
        })
    }

    fn overwrite(&self, worksheet: &str, table: &Table) -> Result<(), StoreError> {
        check_name(worksheet)?;
        saving::save_table(table, &self.path(worksheet)).map_err(|source| StoreError::Io {
            worksheet: worksheet.to_string(),
            source,
        })
    }
}

/// Workbook held in process memory
#[derive(Default)]
pub struct MemoryWorkbook {
    sheets: Mutex<HashMap<String, Table>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SheetStore for MemoryWorkbook {
    fn read(&self, worksheet: &str) -> Result<Table, StoreError> {
        check_name(worksheet)?;
        let sheets = self.sheets.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(sheets.get(worksheet).cloned().unwrap_or_default())
    }

    fn overwrite(&self, worksheet: &str, table: &Table) -> Result<(), StoreError> {
        check_name(worksheet)?;
        let mut sheets = self.sheets.lock().map_err(|_| StoreError::Poisoned)?;
        sheets.insert(worksheet.to_string(), table.clone());
        Ok(())
    }
}

/// Time-boxed read cache in front of a [`SheetStore`].
///
/// Writes go straight through and drop the cached copy of that worksheet.
/// Each write also bumps the worksheet's generation, so a read that missed
/// before the write never stores its older snapshot.
pub struct CachedStore {
    inner: Arc<dyn SheetStore>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    tables: HashMap<String, (Instant, Table)>,
    generations: HashMap<String, u64>,
}

impl CacheState {
    fn generation(&self, worksheet: &str) -> u64 {
        self.generations.get(worksheet).copied().unwrap_or(0)
    }
}

impl CachedStore {
    pub fn new(inner: Arc<dyn SheetStore>, ttl: Duration) -> Self {
        CachedStore {
            inner,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn invalidate(&self, worksheet: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.tables.remove(worksheet);
            *state.generations.entry(worksheet.to_string()).or_insert(0) += 1;
        }
    }

    /// Read past the cache, for read-modify-write
    pub fn read_fresh(&self, worksheet: &str) -> Result<Table, StoreError> {
        self.inner.read(worksheet)
    }
}

impl SheetStore for CachedStore {
    fn read(&self, worksheet: &str) -> Result<Table, StoreError> {
        let generation = {
            let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
            if let Some((at, table)) = state.tables.get(worksheet) {
                if at.elapsed() < self.ttl {
                    debug!("cache hit for {}", worksheet);
                    return Ok(table.clone());
                }
            }
            state.generation(worksheet)
        };

        let table = self.inner.read(worksheet)?;
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        if state.generation(worksheet) == generation {
            state
                .tables
                .insert(worksheet.to_string(), (Instant::now(), table.clone()));
        } else {
            debug!("{} changed while reading; not caching", worksheet);
        }
        Ok(table)
    }

    fn overwrite(&self, worksheet: &str, table: &Table) -> Result<(), StoreError> {
        let result = self.inner.overwrite(worksheet, table);
        self.invalidate(worksheet);
        result
    }
}

/// Read a worksheet, retrying with exponential backoff.
///
/// Waits `base_delay`, then twice that, and so on between attempts; the last
/// error is returned once `attempts` are used up.
pub fn read_with_backoff(
    store: &dyn SheetStore,
    worksheet: &str,
    attempts: u32,
    base_delay: Duration,
) -> Result<Table, StoreError> {
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match store.read(worksheet) {
            Ok(table) => return Ok(table),
            Err(e) if attempt < attempts => {
                warn!(
                    "reading {} failed (attempt {}/{}): {}; retrying in {:?}",
                    worksheet, attempt, attempts, e, delay
                );
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
