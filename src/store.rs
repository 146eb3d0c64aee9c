//! On-disk stream store.

use crate::error::{Result, StorageError};
use crate::record::Payload;
use crate::records::{StreamIndex, StreamLog};
use crate::source::BackingStore;
use crate::types::{GlobalIndex, RawRecord, Timestamp, NO_TIMESTAMP_VALUE};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the stream holding the calibration record.
pub const CALIBRATION_STREAM: &str = "calibration";

/// Stream configuration.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Directory holding all streams of a recording.
    pub base_dir: PathBuf,

    /// Stream directory name under `base_dir`.
    pub stream_name: String,

    /// Whether to create the stream if it doesn't exist.
    pub create_if_missing: bool,

    /// Sync the log every N appends.
    pub sync_interval: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./streams"),
            stream_name: "stream".to_string(),
            create_if_missing: true,
            sync_interval: StreamLog::DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl StreamConfig {
    pub fn new(base_dir: impl Into<PathBuf>, stream_name: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            stream_name: stream_name.into(),
            ..Default::default()
        }
    }

    /// Configuration of the calibration stream under `base_dir`.
    pub fn calibration(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, CALIBRATION_STREAM)
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn with_sync_interval(mut self, interval: u64) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Directory of this stream.
    pub fn stream_path(&self) -> PathBuf {
        self.base_dir.join(&self.stream_name)
    }
}

/// Magic bytes for the stream manifest.
const STREAM_MAGIC: &[u8; 4] = b"BUB\0";

/// Current stream format version.
const STREAM_VERSION: u8 = 1;

const LOG_FILE: &str = "records.log";

/// An append-only stream on disk, readable by index and by timestamp.
pub struct StreamStore {
    config: StreamConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    log: StreamLog,

    index: StreamIndex,

    /// Serializes appends so log and index stay in step.
    write_lock: Mutex<()>,
}

impl StreamStore {
    /// Open an existing stream or create a new one.
    pub fn open_or_create(config: StreamConfig) -> Result<Self> {
        if config.stream_path().exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StorageError::StreamNotFound(config.stream_path()))
        }
    }

    /// Create a fresh stream, discarding any records already there.
    pub fn create(config: StreamConfig) -> Result<Self> {
        let path = config.stream_path();
        fs::create_dir_all(&path)?;

        let lock_file = Self::acquire_lock(&path)?;
        Self::write_manifest(&path)?;

        let log_path = path.join(LOG_FILE);
        if log_path.exists() {
            fs::remove_file(&log_path)?;
        }
        let log = StreamLog::open_with_sync_interval(log_path, config.sync_interval)?;
        debug!(path = %path.display(), "created stream");

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index: StreamIndex::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Open an existing stream.
    pub fn open(config: StreamConfig) -> Result<Self> {
        let path = config.stream_path();
        if !path.exists() {
            return Err(StorageError::StreamNotFound(path));
        }
        Self::verify_manifest(&path)?;

        let lock_file = Self::acquire_lock(&path)?;
        let log = StreamLog::open_with_sync_interval(path.join(LOG_FILE), config.sync_interval)?;

        let index = StreamIndex::new();
        for entry in log.iter_from(0) {
            let (offset, record) = entry?;
            index.add(record.index, record.timestamp(), offset);
        }
        debug!(path = %path.display(), records = index.count(), "opened stream");

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            write_lock: Mutex::new(()),
        })
    }

    /// Append a payload. Returns the stored record with its global index.
    ///
    /// A timestamp equal to the "no timestamp" sentinel is rejected, since
    /// it would read back as absent.
    pub fn append(&self, payload: Payload, timestamp: Option<Timestamp>) -> Result<RawRecord> {
        if timestamp == Some(Timestamp(NO_TIMESTAMP_VALUE)) {
            return Err(StorageError::InvalidRange(format!(
                "timestamp {} is reserved for records without one",
                NO_TIMESTAMP_VALUE
            )));
        }
        let _lock = self.write_lock.lock();

        let record_type = payload.type_name().to_string();
        let encoding = payload.encoding();
        let (record, offset) = self.log.append(
            &record_type,
            encoding,
            payload.into_bytes(),
            RawRecord::encode_timestamp(timestamp),
        )?;
        self.index.add(record.index, timestamp, offset);

        Ok(record)
    }

    /// Number of records in the stream.
    pub fn len(&self) -> usize {
        self.index.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest global index in the stream.
    pub fn last_index(&self) -> Option<GlobalIndex> {
        self.index.max_index()
    }

    /// Force sync to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Directory of the stream.
    pub fn path(&self) -> PathBuf {
        self.config.stream_path()
    }

    fn read_offsets(&self, offsets: Vec<u64>) -> Result<Vec<RawRecord>> {
        offsets
            .into_iter()
            .map(|offset| self.log.read_at(offset))
            .collect()
    }

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STREAM_MAGIC)?;
        file.write_all(&[STREAM_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STREAM_MAGIC {
            return Err(StorageError::InvalidFormat("Invalid stream magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STREAM_VERSION {
            return Err(StorageError::InvalidFormat(format!(
                "Unsupported stream version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        Ok(lock_file)
    }
}

impl BackingStore for StreamStore {
    fn read_at_index(&self, index: GlobalIndex) -> Result<Option<RawRecord>> {
        self.index
            .offset(index)
            .map(|offset| self.log.read_at(offset))
            .transpose()
    }

    fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<RawRecord>> {
        match self.index.index_at(timestamp) {
            Some(index) => BackingStore::read_at_index(self, index),
            None => Ok(None),
        }
    }

    fn read_at_index_range(&self, begin: GlobalIndex, end: GlobalIndex) -> Result<Vec<RawRecord>> {
        self.read_offsets(self.index.offsets_in(begin, end))
    }

    fn read_at_timestamp_range(&self, begin: Timestamp, end: Timestamp) -> Result<Vec<RawRecord>> {
        let offsets = self
            .index
            .indices_between(begin, end)
            .into_iter()
            .filter_map(|index| self.index.offset(index))
            .collect();
        self.read_offsets(offsets)
    }

    fn first_index_at_or_after(&self, timestamp: Timestamp) -> Result<Option<GlobalIndex>> {
        Ok(self.index.first_at_or_after(timestamp))
    }
}

impl Drop for StreamStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
