//! Append-only stream log.

use crate::error::{Result, StorageError};
use crate::types::{GlobalIndex, PayloadEncoding, RawRecord};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes opening every log entry.
const ENTRY_MAGIC: &[u8; 4] = b"SEG\0";

/// Current entry format version.
const ENTRY_VERSION: u8 = 1;

/// Fixed part of an entry: magic + version + flags + index + timestamp.
const ENTRY_HEADER_SIZE: usize = 4 + 1 + 1 + 8 + 8;

/// Mutable log state, guarded together with the file handle.
struct LogState {
    file: File,

    /// Index the next appended record receives.
    next_index: u64,

    /// End of the last complete entry.
    file_size: u64,

    /// Number of writes since last sync.
    writes_since_sync: u64,
}

/// Append-only log of raw records.
///
/// Records are assigned consecutive global indices starting at 1.
pub struct StreamLog {
    path: PathBuf,
    state: Mutex<LogState>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl StreamLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a log with the default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a log, syncing every `sync_interval` writes.
    ///
    /// A sync interval of 0 is treated as 1. A torn entry at the end of the
    /// file (from an interrupted append) is truncated away. A complete entry
    /// that fails its magic, format or checksum check fails the open and the
    /// file is left untouched.
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let on_disk = file.metadata()?.len();
        let (max_index, valid_end) = Self::scan(&file, on_disk)?;
        if valid_end < on_disk {
            warn!(
                path = %path.display(),
                valid_end,
                on_disk,
                "truncating incomplete tail of stream log"
            );
            file.set_len(valid_end)?;
        }
        debug!(path = %path.display(), records = max_index, "opened stream log");

        Ok(Self {
            path,
            state: Mutex::new(LogState {
                file,
                next_index: max_index + 1,
                file_size: valid_end,
                writes_since_sync: 0,
            }),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Append a record. Returns it with its assigned index, and its offset.
    pub fn append(
        &self,
        record_type: &str,
        encoding: PayloadEncoding,
        payload: Vec<u8>,
        time_stamp: i64,
    ) -> Result<(RawRecord, u64)> {
        let mut state = self.state.lock();

        let record = RawRecord {
            index: GlobalIndex(state.next_index),
            time_stamp,
            record_type: record_type.to_string(),
            encoding,
            payload,
        };
        let entry = encode_entry(&record)?;

        let offset = state.file_size;
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(&entry)?;

        state.file_size = offset + entry.len() as u64;
        state.next_index += 1;

        state.writes_since_sync += 1;
        if state.writes_since_sync >= self.sync_interval {
            state.file.sync_all()?;
            state.writes_since_sync = 0;
        }

        Ok((record, offset))
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.file.sync_all()?;
        state.writes_since_sync = 0;
        Ok(())
    }

    /// Read the record at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<RawRecord> {
        let mut state = self.state.lock();
        state.file.seek(SeekFrom::Start(offset))?;
        read_entry(&mut state.file)
    }

    /// Iterate all records from a given offset.
    pub fn iter_from(&self, offset: u64) -> LogIterator<'_> {
        LogIterator {
            log: self,
            offset,
            end: self.size(),
        }
    }

    /// Size of the log's complete entries, in bytes.
    pub fn size(&self) -> u64 {
        self.state.lock().file_size
    }

    /// Index the next append will receive.
    pub fn next_index(&self) -> GlobalIndex {
        GlobalIndex(self.state.lock().next_index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walk the entries of a log file.
    ///
    /// Returns the highest index seen and the offset just past the last
    /// complete entry. Only running out of bytes ends the walk early; any
    /// other decoding failure is returned.
    fn scan(file: &File, file_size: u64) -> Result<(u64, u64)> {
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);

        let mut max_index = 0u64;
        let mut offset = 0u64;
        while offset < file_size {
            match read_entry(&mut reader) {
                Ok(record) => {
                    max_index = max_index.max(record.index.0);
                    offset += entry_len(&record) as u64;
                }
                // The file ends inside this entry: an interrupted append.
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    warn!(offset, error = %e, "corrupt entry in stream log");
                    return Err(e);
                }
            }
        }

        Ok((max_index, offset.min(file_size)))
    }
}

/// Iterator over records in the log, yielding `(offset, record)`.
pub struct LogIterator<'a> {
    log: &'a StreamLog,
    offset: u64,
    end: u64,
}

impl<'a> Iterator for LogIterator<'a> {
    type Item = Result<(u64, RawRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let current_offset = self.offset;
        match self.log.read_at(current_offset) {
            Ok(record) => {
                self.offset = current_offset + entry_len(&record) as u64;
                Some(Ok((current_offset, record)))
            }
            Err(e) => {
                self.offset = self.end;
                Some(Err(e))
            }
        }
    }
}

/// Encoded size of an entry.
fn entry_len(record: &RawRecord) -> usize {
    ENTRY_HEADER_SIZE + 2 + record.record_type.len() + 1 + 4 + record.payload.len() + 4
}

fn encode_entry(record: &RawRecord) -> Result<Vec<u8>> {
    let type_bytes = record.record_type.as_bytes();
    let type_len = u16::try_from(type_bytes.len()).map_err(|_| {
        StorageError::Serialization(format!("record type too long: {} bytes", type_bytes.len()))
    })?;
    let payload_len = u32::try_from(record.payload.len()).map_err(|_| {
        StorageError::Serialization(format!("payload too large: {} bytes", record.payload.len()))
    })?;

    let mut buf = Vec::with_capacity(entry_len(record));
    buf.extend_from_slice(ENTRY_MAGIC);
    buf.push(ENTRY_VERSION);
    // Flags (reserved)
    buf.push(0);
    buf.extend_from_slice(&record.index.0.to_le_bytes());
    buf.extend_from_slice(&record.time_stamp.to_le_bytes());
    buf.extend_from_slice(&type_len.to_le_bytes());
    buf.extend_from_slice(type_bytes);
    buf.push(record.encoding.to_byte());
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&record.payload);
    buf.extend_from_slice(&crc32fast::hash(&record.payload).to_le_bytes());
    Ok(buf)
}

fn read_entry(reader: &mut impl Read) -> Result<RawRecord> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != ENTRY_MAGIC {
        return Err(StorageError::InvalidFormat("Invalid entry magic".into()));
    }

    let mut version_and_flags = [0u8; 2];
    reader.read_exact(&mut version_and_flags)?;
    if version_and_flags[0] != ENTRY_VERSION {
        return Err(StorageError::InvalidFormat(format!(
            "Unsupported entry version: {}",
            version_and_flags[0]
        )));
    }

    let mut u64_bytes = [0u8; 8];
    reader.read_exact(&mut u64_bytes)?;
    let index = GlobalIndex(u64::from_le_bytes(u64_bytes));

    reader.read_exact(&mut u64_bytes)?;
    let time_stamp = i64::from_le_bytes(u64_bytes);

    let mut u16_bytes = [0u8; 2];
    reader.read_exact(&mut u16_bytes)?;
    let type_bytes = read_sized(reader, u16::from_le_bytes(u16_bytes) as u64)?;
    let record_type = String::from_utf8(type_bytes)
        .map_err(|_| StorageError::InvalidFormat("Record type is not UTF-8".into()))?;

    let mut encoding_byte = [0u8; 1];
    reader.read_exact(&mut encoding_byte)?;
    let encoding = PayloadEncoding::from_byte(encoding_byte[0]).ok_or_else(|| {
        StorageError::InvalidFormat(format!("Unknown payload encoding: {}", encoding_byte[0]))
    })?;

    let mut u32_bytes = [0u8; 4];
    reader.read_exact(&mut u32_bytes)?;
    let payload = read_sized(reader, u32::from_le_bytes(u32_bytes) as u64)?;

    reader.read_exact(&mut u32_bytes)?;
    let stored_checksum = u32::from_le_bytes(u32_bytes);
    let computed_checksum = crc32fast::hash(&payload);
    if stored_checksum != computed_checksum {
        return Err(StorageError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }

    Ok(RawRecord {
        index,
        time_stamp,
        record_type,
        encoding,
        payload,
    })
}

/// Read exactly `len` bytes, growing the buffer only as bytes arrive so a
/// corrupt length cannot force a large allocation.
fn read_sized(reader: &mut impl Read, len: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_TIMESTAMP_VALUE;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = StreamLog::open(dir.path().join("records.log")).unwrap();

        let (record, offset) = log
            .append("test", PayloadEncoding::Raw, b"hello".to_vec(), 42)
            .unwrap();

        assert_eq!(record.index, GlobalIndex(1));
        assert_eq!(offset, 0);

        let read = log.read_at(offset).unwrap();
        assert_eq!(read, record);
    }

    #[test]
    fn test_multiple_records() {
        let dir = TempDir::new().unwrap();
        let log = StreamLog::open(dir.path().join("records.log")).unwrap();

        for i in 1..=10u64 {
            let (record, _) = log
                .append("test", PayloadEncoding::Raw, format!("record {}", i).into_bytes(), NO_TIMESTAMP_VALUE)
                .unwrap();
            assert_eq!(record.index, GlobalIndex(i));
        }

        let records: Vec<_> = log.iter_from(0).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[9].1.payload, b"record 10");
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.log");

        {
            let log = StreamLog::open(&path).unwrap();
            for i in 1..=5 {
                log.append("test", PayloadEncoding::Raw, vec![i], i as i64).unwrap();
            }
        }

        let log = StreamLog::open(&path).unwrap();
        assert_eq!(log.iter_from(0).count(), 5);

        let (record, _) = log.append("test", PayloadEncoding::Raw, vec![6], 6).unwrap();
        assert_eq!(record.index, GlobalIndex(6));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.log");

        let good_size = {
            let log = StreamLog::open(&path).unwrap();
            log.append("test", PayloadEncoding::Raw, vec![1, 2, 3], 1).unwrap();
            log.sync().unwrap();
            log.size()
        };

        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"SEG\0\x01\x00partial").unwrap();
        }

        let log = StreamLog::open(&path).unwrap();
        assert_eq!(log.size(), good_size);
        assert_eq!(log.next_index(), GlobalIndex(2));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_size);
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.log");

        let log = StreamLog::open(&path).unwrap();
        let (_, offset) = log
            .append("test", PayloadEncoding::Raw, b"payload".to_vec(), 1)
            .unwrap();
        log.sync().unwrap();

        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            // First payload byte: header, type length, "test", encoding, payload length.
            let payload_offset = offset + (ENTRY_HEADER_SIZE + 2 + 4 + 1 + 4) as u64;
            file.seek(SeekFrom::Start(payload_offset)).unwrap();
            file.write_all(b"X").unwrap();
        }

        assert!(matches!(
            log.read_at(offset),
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_middle_entry_fails_open_without_truncating() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.log");

        let second_offset = {
            let log = StreamLog::open(&path).unwrap();
            let mut offsets = Vec::new();
            for i in 1..=10u8 {
                let (_, offset) = log.append("test", PayloadEncoding::Raw, vec![i], i as i64).unwrap();
                offsets.push(offset);
            }
            log.sync().unwrap();
            offsets[1]
        };
        let size_before = std::fs::metadata(&path).unwrap().len();

        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            let payload_offset = second_offset + (ENTRY_HEADER_SIZE + 2 + 4 + 1 + 4) as u64;
            file.seek(SeekFrom::Start(payload_offset)).unwrap();
            file.write_all(&[0xAA]).unwrap();
        }

        assert!(matches!(
            StreamLog::open(&path),
            Err(StorageError::ChecksumMismatch { .. })
        ));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size_before);

        // Restoring the byte makes every record readable again.
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            let payload_offset = second_offset + (ENTRY_HEADER_SIZE + 2 + 4 + 1 + 4) as u64;
            file.seek(SeekFrom::Start(payload_offset)).unwrap();
            file.write_all(&[2]).unwrap();
        }
        let log = StreamLog::open(&path).unwrap();
        let records: Vec<_> = log.iter_from(0).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[9].1.payload, vec![10u8]);
    }

    #[test]
    fn test_bad_magic_mid_log_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.log");

        let third_offset = {
            let log = StreamLog::open(&path).unwrap();
            let mut third = 0;
            for i in 1..=4u8 {
                let (_, offset) = log.append("test", PayloadEncoding::Raw, vec![i], i as i64).unwrap();
                if i == 3 {
                    third = offset;
                }
            }
            log.sync().unwrap();
            third
        };
        let size_before = std::fs::metadata(&path).unwrap().len();

        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(third_offset)).unwrap();
            file.write_all(b"XXXX").unwrap();
        }

        assert!(matches!(
            StreamLog::open(&path),
            Err(StorageError::InvalidFormat(_))
        ));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size_before);
    }
}
