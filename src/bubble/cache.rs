//! The bubble cache.

use super::window::{to_global, to_local, Window};
use crate::error::{Result, StorageError};
use crate::record::Record;
use crate::source::RecordSource;
use crate::types::{AddressMode, GlobalIndex, LocalIndex, Timestamp};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Lazily materialized window over a record source.
///
/// A bubble is addressed either by index or by time, never both. The mode is
/// fixed by the first call that needs one and stays until [`Bubble::unload`]
/// or [`Bubble::reset`]. Records are kept in a map keyed by local index, with
/// a second map from timestamp to local index so time lookups work in both
/// modes.
///
/// The source is borrowed, so it always outlives the bubble. Operations that
/// need to read fail with [`StorageError::UnboundStore`] until
/// [`Bubble::initialize`] has been called.
pub struct Bubble<'s, S: RecordSource> {
    /// Where misses are loaded from.
    source: Option<&'s S>,

    /// Active window, if one was set.
    window: Option<Window>,

    /// Active addressing mode.
    mode: AddressMode,

    /// Loaded records by local index.
    data: BTreeMap<LocalIndex, Record<S::Payload>>,

    /// Local index of each loaded timestamp.
    times: BTreeMap<Timestamp, LocalIndex>,
}

impl<'s, S: RecordSource> Bubble<'s, S> {
    /// Create an empty, unbound bubble.
    pub fn new() -> Self {
        Self {
            source: None,
            window: None,
            mode: AddressMode::Unset,
            data: BTreeMap::new(),
            times: BTreeMap::new(),
        }
    }

    /// Bind the bubble to a record source. Performs no I/O.
    pub fn initialize(&mut self, source: &'s S) {
        self.source = Some(source);
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    pub fn mode(&self) -> AddressMode {
        self.mode
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Scope the bubble to global indices `[begin, end]` and enter index mode.
    pub fn set_index_window(&mut self, begin: GlobalIndex, end: GlobalIndex) -> Result<()> {
        match self.mode {
            AddressMode::Time => {
                return Err(StorageError::ModeConflict("bubble is in time mode".into()))
            }
            AddressMode::Index => {
                return Err(StorageError::ModeConflict("index window already set".into()))
            }
            AddressMode::Unset => {}
        }

        self.window = Some(Window::index(begin, end)?);
        self.mode = AddressMode::Index;
        Ok(())
    }

    /// Scope the bubble to timestamps `[begin, end]` and enter time mode.
    pub fn set_time_window(&mut self, begin: Timestamp, end: Timestamp) -> Result<()> {
        if self.mode == AddressMode::Index {
            return Err(StorageError::ModeConflict("bubble is in index mode".into()));
        }
        if self.window.is_some() {
            return Err(StorageError::ModeConflict("time window already set".into()));
        }

        self.window = Some(Window::time(begin, end)?);
        self.mode = AddressMode::Time;
        Ok(())
    }

    /// Load every record in the window.
    ///
    /// In time mode, records whose timestamp is already loaded are skipped;
    /// the rest are assigned fresh local indices.
    pub fn load_all(&mut self) -> Result<()> {
        let window = self.window.ok_or(StorageError::WindowNotSet)?;
        if window.mode() != self.mode {
            return Err(StorageError::ModeConflict(format!(
                "window is in {} but bubble is in {}",
                window.mode(),
                self.mode
            )));
        }
        let source = self.source()?;

        match window {
            Window::Index { start, stop } => {
                let records = source.read_at_index_range(start, stop)?;
                debug!(start = start.0, stop = stop.0, count = records.len(), "loaded index range");
                for record in records {
                    let Some(global) = record.index_opt() else {
                        warn!("skipping record without index in index range");
                        continue;
                    };
                    if !window.contains_index(global) {
                        warn!(index = global.0, "source returned record outside window");
                        continue;
                    }
                    let local = to_local(start, global)?;
                    self.place(local, record);
                }
            }
            Window::Time { start, stop } => {
                let records = source.read_at_timestamp_range(start, stop)?;
                debug!(start = start.0, stop = stop.0, count = records.len(), "loaded time range");
                for record in records {
                    let Some(timestamp) = record.timestamp_opt() else {
                        continue;
                    };
                    if self.times.contains_key(&timestamp) {
                        continue;
                    }
                    let local = self.next_free_slot()?;
                    self.place(local, record);
                }
            }
        }
        Ok(())
    }

    /// Load the record at a local index. Index mode only.
    ///
    /// A miss leaves the bubble unchanged.
    pub fn load(&mut self, local: LocalIndex) -> Result<()> {
        let start = match (self.mode, self.window) {
            (AddressMode::Time, _) => {
                return Err(StorageError::ModeConflict("bubble is in time mode".into()))
            }
            (AddressMode::Index, Some(window)) => window.index_origin(),
            _ => return Err(StorageError::WindowNotSet),
        };
        let global = to_global(start, local)?;

        match self.source()?.read_at_index(global)? {
            Some(record) => self.place(local, record),
            None => trace!(local = local.0, global = global.0, "no record at index"),
        }
        Ok(())
    }

    /// Load the record at a timestamp, entering time mode if unset.
    ///
    /// The record's local index is its global index relative to the index
    /// origin of the window. If that slot already holds a different record,
    /// a fresh local index is used. A timestamp that is already loaded is
    /// refreshed in its current slot.
    pub fn load_at_time(&mut self, timestamp: Timestamp) -> Result<()> {
        if self.mode == AddressMode::Index {
            return Err(StorageError::ModeConflict("bubble is in index mode".into()));
        }
        let source = self.source()?;
        self.mode = AddressMode::Time;

        let Some(record) = source.read_at_timestamp(timestamp)? else {
            trace!(timestamp = timestamp.0, "no record at timestamp");
            return Ok(());
        };

        let local = match self.times.get(&timestamp) {
            Some(&loaded) if self.data.contains_key(&loaded) => loaded,
            _ => self.slot_for(&record, timestamp)?,
        };

        let aliased = record.timestamp_opt() != Some(timestamp);
        self.place(local, record);
        if aliased {
            self.times.insert(timestamp, local);
        }
        Ok(())
    }

    /// Insert a record directly, entering time mode if unset.
    ///
    /// The record must carry a timestamp. Returns the local index assigned.
    pub fn insert(&mut self, record: Record<S::Payload>) -> Result<LocalIndex> {
        if self.mode == AddressMode::Index {
            return Err(StorageError::ModeConflict("bubble is in index mode".into()));
        }
        record.timestamp()?;
        let local = self.next_free_slot()?;

        self.mode = AddressMode::Time;
        self.place(local, record);
        Ok(local)
    }

    /// Get the record at a local index, loading it on a miss.
    pub fn retrieve(&mut self, local: LocalIndex) -> Result<&Record<S::Payload>> {
        if !self.is_loaded(local) {
            self.load(local)?;
        }
        self.data
            .get(&local)
            .ok_or_else(|| StorageError::NotFound(format!("no data at local index {}", local)))
    }

    /// Get the record at a timestamp, loading it on a miss.
    pub fn retrieve_at_time(&mut self, timestamp: Timestamp) -> Result<&Record<S::Payload>> {
        if !self.is_loaded_at_time(timestamp) {
            self.load_at_time(timestamp)?;
        }
        self.times
            .get(&timestamp)
            .and_then(|local| self.data.get(local))
            .ok_or_else(|| StorageError::NotFound(format!("no data at time {}", timestamp)))
    }

    pub fn is_loaded(&self, local: LocalIndex) -> bool {
        self.data.contains_key(&local)
    }

    pub fn is_loaded_at_time(&self, timestamp: Timestamp) -> bool {
        self.times
            .get(&timestamp)
            .is_some_and(|local| self.data.contains_key(local))
    }

    /// Number of loaded records.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Loaded records in local index order.
    pub fn iter(&self) -> impl Iterator<Item = (LocalIndex, &Record<S::Payload>)> + '_ {
        self.data.iter().map(|(local, record)| (*local, record))
    }

    /// Drop all loaded data, the window and the mode. Keeps the source.
    pub fn unload(&mut self) {
        self.window = None;
        self.mode = AddressMode::Unset;
        self.data.clear();
        self.times.clear();
    }

    /// [`Bubble::unload`] and release the source.
    pub fn reset(&mut self) {
        self.unload();
        self.source = None;
    }

    fn source(&self) -> Result<&'s S> {
        self.source.ok_or(StorageError::UnboundStore)
    }

    /// One past the highest occupied local index.
    fn next_free_slot(&self) -> Result<LocalIndex> {
        match self.data.last_key_value() {
            None => Ok(LocalIndex(0)),
            Some((local, _)) => local.0.checked_add(1).map(LocalIndex).ok_or_else(|| {
                StorageError::InvalidRange(format!("no free local index after {}", local))
            }),
        }
    }

    /// Slot for a record fetched by `timestamp`: its index relative to the
    /// window origin, or a fresh slot if that one holds another record.
    fn slot_for(&self, record: &Record<S::Payload>, timestamp: Timestamp) -> Result<LocalIndex> {
        let origin = self.window.map_or(GlobalIndex(0), |w| w.index_origin());
        let local = match record.index_opt() {
            Some(global) => to_local(origin, global)?,
            None => return self.next_free_slot(),
        };
        match self.data.get(&local) {
            Some(existing) if existing.timestamp_opt() != Some(timestamp) => self.next_free_slot(),
            _ => Ok(local),
        }
    }

    /// Store a record at `local`, keeping the time map consistent.
    fn place(&mut self, local: LocalIndex, record: Record<S::Payload>) {
        let timestamp = record.timestamp_opt();
        if self.data.insert(local, record).is_some() {
            self.times.retain(|_, slot| *slot != local);
        }
        if let Some(timestamp) = timestamp {
            self.times.insert(timestamp, local);
        }
    }
}

impl<'s, S: RecordSource> Default for Bubble<'s, S> {
    fn default() -> Self {
        Self::new()
    }
}
