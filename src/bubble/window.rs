//! Bubble windows and local/global index translation.

use crate::error::{Result, StorageError};
use crate::types::{AddressMode, GlobalIndex, LocalIndex, Timestamp};

/// The addressable range a bubble is scoped to. Bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    /// Global index range.
    Index { start: GlobalIndex, stop: GlobalIndex },
    /// Timestamp range.
    Time { start: Timestamp, stop: Timestamp },
}

impl Window {
    /// Index window over `[begin, end]`.
    pub fn index(begin: GlobalIndex, end: GlobalIndex) -> Result<Self> {
        if end < begin {
            return Err(StorageError::InvalidRange(format!(
                "index end {} is before begin {}",
                end, begin
            )));
        }
        Ok(Window::Index {
            start: begin,
            stop: end,
        })
    }

    /// Time window over `[begin, end]`.
    pub fn time(begin: Timestamp, end: Timestamp) -> Result<Self> {
        if end < begin {
            return Err(StorageError::InvalidRange(format!(
                "time end {} is before begin {}",
                end, begin
            )));
        }
        Ok(Window::Time {
            start: begin,
            stop: end,
        })
    }

    pub fn mode(&self) -> AddressMode {
        match self {
            Window::Index { .. } => AddressMode::Index,
            Window::Time { .. } => AddressMode::Time,
        }
    }

    /// Global index that local index 0 maps to.
    ///
    /// Time windows have no index origin, so local and global indices
    /// coincide.
    pub fn index_origin(&self) -> GlobalIndex {
        match self {
            Window::Index { start, .. } => *start,
            Window::Time { .. } => GlobalIndex(0),
        }
    }

    /// Number of global indices covered, for index windows.
    pub fn span(&self) -> Option<u64> {
        match self {
            Window::Index { start, stop } => Some((stop.0 - start.0).saturating_add(1)),
            Window::Time { .. } => None,
        }
    }

    /// Whether `index` falls inside an index window.
    pub fn contains_index(&self, index: GlobalIndex) -> bool {
        matches!(self, Window::Index { start, stop } if *start <= index && index <= *stop)
    }
}

/// Translate a global index into a local one: `local = global - start`.
///
/// Fails if `global` precedes `start`.
pub fn to_local(start: GlobalIndex, global: GlobalIndex) -> Result<LocalIndex> {
    global
        .0
        .checked_sub(start.0)
        .map(LocalIndex)
        .ok_or_else(|| {
            StorageError::InvalidRange(format!(
                "global index {} precedes window start {}",
                global, start
            ))
        })
}

/// Translate a local index into a global one: `global = start + local`.
///
/// Fails if the sum overflows.
pub fn to_global(start: GlobalIndex, local: LocalIndex) -> Result<GlobalIndex> {
    start
        .0
        .checked_add(local.0)
        .map(GlobalIndex)
        .ok_or_else(|| {
            StorageError::InvalidRange(format!(
                "local index {} overflows from window start {}",
                local, start
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_index_window_validation() {
        assert!(Window::index(GlobalIndex(3), GlobalIndex(3)).is_ok());
        assert!(matches!(
            Window::index(GlobalIndex(5), GlobalIndex(3)),
            Err(StorageError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_time_window_validation() {
        assert!(Window::time(Timestamp(10), Timestamp(20)).is_ok());
        assert!(matches!(
            Window::time(Timestamp(20), Timestamp(10)),
            Err(StorageError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_window_origin_and_span() {
        let window = Window::index(GlobalIndex(10), GlobalIndex(12)).unwrap();
        assert_eq!(window.index_origin(), GlobalIndex(10));
        assert_eq!(window.span(), Some(3));
        assert!(window.contains_index(GlobalIndex(12)));
        assert!(!window.contains_index(GlobalIndex(13)));

        let window = Window::time(Timestamp(1), Timestamp(2)).unwrap();
        assert_eq!(window.index_origin(), GlobalIndex(0));
        assert_eq!(window.span(), None);
        assert_eq!(window.mode(), AddressMode::Time);
    }

    #[test]
    fn test_translation_edges() {
        assert_eq!(to_local(GlobalIndex(10), GlobalIndex(10)).unwrap(), LocalIndex(0));
        assert_eq!(to_local(GlobalIndex(10), GlobalIndex(12)).unwrap(), LocalIndex(2));
        assert!(to_local(GlobalIndex(10), GlobalIndex(9)).is_err());

        assert_eq!(to_global(GlobalIndex(10), LocalIndex(0)).unwrap(), GlobalIndex(10));
        assert!(to_global(GlobalIndex(u64::MAX), LocalIndex(1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_local_global_roundtrip(start in 0u64..1 << 40, offset in 0u64..1 << 20) {
            let start = GlobalIndex(start);
            let global = to_global(start, LocalIndex(offset)).unwrap();
            prop_assert_eq!(to_local(start, global).unwrap(), LocalIndex(offset));
        }

        #[test]
        fn prop_to_local_rejects_before_start(start in 1u64..1 << 40, back in 1u64..1 << 20) {
            let global = GlobalIndex(start.saturating_sub(back));
            prop_assume!(global.0 < start);
            prop_assert!(to_local(GlobalIndex(start), global).is_err());
        }
    }
}
