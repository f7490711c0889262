use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::buffer::ReplacementPolicy;

use super::error::{DbError, Result};

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_COUNT: usize = 10;

/// Default maximum number of `Data{i}.bin` files
pub const DEFAULT_MAX_FILE_COUNT: u32 = 4;

/// Default maximum number of pages a single data file may grow to
pub const DEFAULT_MAX_PAGES_PER_FILE: u32 = 1024;

/// Runtime configuration of the storage engine.
///
/// Loaded from a `key = value` file:
///
/// ```text
/// dbpath = ./DB
/// pageSize = 4096
/// dm_maxFileCount = 4
/// dm_maxPagePerFile = 1024
/// bm_bufferCount = 10
/// bm_policy = LRU
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub db_path: PathBuf,
    pub page_size: usize,
    pub max_file_count: u32,
    pub max_pages_per_file: u32,
    pub buffer_count: usize,
    pub policy: ReplacementPolicy,
}

impl DbConfig {
    /// Creates a configuration rooted at `db_path` with default sizes.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            page_size: DEFAULT_PAGE_SIZE,
            max_file_count: DEFAULT_MAX_FILE_COUNT,
            max_pages_per_file: DEFAULT_MAX_PAGES_PER_FILE,
            buffer_count: DEFAULT_BUFFER_COUNT,
            policy: ReplacementPolicy::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_count(mut self, buffer_count: usize) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    pub fn with_max_file_count(mut self, max_file_count: u32) -> Self {
        self.max_file_count = max_file_count;
        self
    }

    pub fn with_max_pages_per_file(mut self, max_pages_per_file: u32) -> Self {
        self.max_pages_per_file = max_pages_per_file;
        self
    }

    pub fn with_policy(mut self, policy: ReplacementPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Parses configuration text. Blank lines and `#` comments are skipped,
    /// unknown keys are ignored with a warning.
    pub fn parse(text: &str) -> Result<Self> {
        let mut db_path = None;
        let mut config = DbConfig::new("");

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                DbError::Config(format!("line {}: expected key=value, got '{}'", lineno + 1, line))
            })?;
            let key = key.trim();
            let value = value.trim();

            match key.to_ascii_lowercase().as_str() {
                "dbpath" => db_path = Some(PathBuf::from(value)),
                "pagesize" => config.page_size = parse_positive(key, value)?,
                "dm_maxfilecount" => config.max_file_count = parse_positive(key, value)?,
                "dm_maxpageperfile" => config.max_pages_per_file = parse_positive(key, value)?,
                "bm_buffercount" => config.buffer_count = parse_positive(key, value)?,
                "bm_policy" => config.policy = value.parse()?,
                _ => warn!("ignoring unknown configuration key '{}'", key),
            }
        }

        config.db_path =
            db_path.ok_or_else(|| DbError::Config("missing required key 'dbpath'".into()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every size is usable.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(DbError::Config("dbpath must not be empty".into()));
        }
        if self.page_size == 0 || self.page_size > i32::MAX as usize {
            return Err(DbError::Config(format!("invalid pageSize {}", self.page_size)));
        }
        if self.max_file_count == 0 {
            return Err(DbError::Config("dm_maxFileCount must be positive".into()));
        }
        if self.max_pages_per_file == 0 {
            return Err(DbError::Config("dm_maxPagePerFile must be positive".into()));
        }
        if self.buffer_count == 0 {
            return Err(DbError::Config("bm_bufferCount must be positive".into()));
        }
        Ok(())
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        _ => Err(DbError::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}
