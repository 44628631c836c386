//! Host-owned writer for the shared region.
//!
//! [`ScaleStore`] is the only type that mutates the tables. Its write methods
//! take `&mut self`, so whoever owns the store (the host's tick thread) is
//! the single writer; everything else goes through the bridge's work queue.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RegionError;
use crate::region::{ACTIVE_CAPACITY, SCALE_CAPACITY, ScaleMap, SharedRegion, is_valid_scale};

/// Callback fired when the distinct set of active ids changes.
pub type ActiveChangeListener = Box<dyn FnMut(&[u32]) + Send>;

/// Single-writer view of a [`SharedRegion`].
pub struct ScaleStore {
    region: Arc<SharedRegion>,
    /// Last distinct, sorted active-id snapshot. `None` until first read or write.
    active_cache: Option<Vec<u32>>,
    listeners: Vec<ActiveChangeListener>,
}

impl ScaleStore {
    /// Create a store writing into `region`.
    #[must_use]
    pub fn new(region: Arc<SharedRegion>) -> Self {
        Self {
            region,
            active_cache: None,
            listeners: Vec::new(),
        }
    }

    /// Returns the underlying region.
    #[must_use]
    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Register a listener for active-id changes.
    ///
    /// Listeners run synchronously inside [`ScaleStore::write_active_ids`],
    /// before the new ids are written.
    pub fn on_active_change<F>(&mut self, listener: F)
    where
        F: FnMut(&[u32]) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Read the current scale table.
    #[must_use]
    pub fn read_scales(&self) -> ScaleMap {
        self.region.read_scales()
    }

    /// Write scales into the table.
    ///
    /// With `overwrite == false` the new entries are merged on top of the
    /// existing table (later entries win on id collision). Invalid scales and
    /// the reserved id `0` are dropped silently. If the result would exceed
    /// [`SCALE_CAPACITY`] nothing is written.
    ///
    /// Returns the number of entries now stored.
    pub fn write_scales<I>(&mut self, entries: I, overwrite: bool) -> Result<usize, RegionError>
    where
        I: IntoIterator<Item = (u32, f32)>,
    {
        let mut merged = if overwrite {
            ScaleMap::new()
        } else {
            self.region.read_scales()
        };

        let mut dropped = 0usize;
        for (id, scale) in entries {
            if id == 0 || !is_valid_scale(scale) {
                dropped += 1;
                continue;
            }
            merged.insert(id, scale);
        }
        if dropped > 0 {
            debug!(dropped, "dropped invalid scale entries");
        }

        if merged.len() > SCALE_CAPACITY {
            warn!(
                count = merged.len(),
                capacity = SCALE_CAPACITY,
                "scale write rejected"
            );
            return Err(RegionError::ScaleCapacityExceeded {
                count: merged.len(),
                capacity: SCALE_CAPACITY,
            });
        }

        self.region.write_scale_entries(&merged);
        debug!(entries = merged.len(), overwrite, "scale table written");
        Ok(merged.len())
    }

    /// Returns the active ids, sorted and distinct.
    ///
    /// The table is scanned at most once between writes.
    pub fn read_active_ids(&mut self) -> &[u32] {
        let region = &self.region;
        self.active_cache
            .get_or_insert_with(|| region.read_active_ids())
    }

    /// Replace the active-id table.
    ///
    /// Fails if `ids` holds more than [`ACTIVE_CAPACITY`] entries. The ids are
    /// sorted and deduplicated; listeners fire only if the result differs
    /// from the previous snapshot.
    ///
    /// Returns `true` if the set changed.
    pub fn write_active_ids(&mut self, ids: &[u32]) -> Result<bool, RegionError> {
        if ids.len() > ACTIVE_CAPACITY {
            return Err(RegionError::ActiveCapacityExceeded {
                count: ids.len(),
                capacity: ACTIVE_CAPACITY,
            });
        }

        let mut next: Vec<u32> = ids.iter().copied().filter(|&id| id != 0).collect();
        next.sort_unstable();
        next.dedup();

        let changed = self.read_active_ids() != next.as_slice();
        if changed {
            debug!(ids = ?next, "active ids changed");
            for listener in &mut self.listeners {
                listener(&next);
            }
            self.region.write_active_entries(&next);
            self.active_cache = Some(next);
        }
        Ok(changed)
    }
}

impl std::fmt::Debug for ScaleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleStore")
            .field("region", &self.region)
            .field("active_cache", &self.active_cache)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn store() -> ScaleStore {
        ScaleStore::new(Arc::new(SharedRegion::new()))
    }

    #[test]
    fn test_overwrite_roundtrip() {
        let mut store = store();
        let entries = [(1, 2.0), (9, 0.5), (42, 3.25)];
        store.write_scales(entries, true).unwrap();
        let expected: ScaleMap = entries.into_iter().collect();
        assert_eq!(store.read_scales(), expected);
    }

    #[test]
    fn test_merge_keeps_existing_entries() {
        let mut store = store();
        store.write_scales([(1, 2.0)], false).unwrap();
        store.write_scales([(2, 3.0)], false).unwrap();
        let scales = store.read_scales();
        assert_eq!(scales.len(), 2);
        assert_eq!(scales[&1], 2.0);
        assert_eq!(scales[&2], 3.0);
    }

    #[test]
    fn test_merge_later_write_wins() {
        let mut store = store();
        store.write_scales([(1, 2.0)], false).unwrap();
        store.write_scales([(1, 4.0)], false).unwrap();
        assert_eq!(store.read_scales()[&1], 4.0);
    }

    #[test]
    fn test_overwrite_clears_previous_entries() {
        let mut store = store();
        store.write_scales([(1, 2.0), (2, 2.0)], true).unwrap();
        store.write_scales([(3, 1.0)], true).unwrap();
        let scales = store.read_scales();
        assert_eq!(scales.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_invalid_scales_are_dropped() {
        let mut store = store();
        let stored = store
            .write_scales(
                [
                    (1, 0.0),
                    (2, -1.0),
                    (3, f32::NAN),
                    (4, f32::INFINITY),
                    (5, f32::MAX),
                    (0, 1.0),
                    (6, 1.25),
                ],
                true,
            )
            .unwrap();
        assert_eq!(stored, 1);
        let scales = store.read_scales();
        assert_eq!(scales.len(), 1);
        assert_eq!(scales[&6], 1.25);
    }

    #[test]
    fn test_capacity_overflow_leaves_table_untouched() {
        let mut store = store();
        store.write_scales([(1, 2.0), (2, 3.0)], true).unwrap();
        let before = store.region().scale_bytes();

        let too_many = (1..=SCALE_CAPACITY as u32 + 1).map(|id| (id, 1.0));
        let err = store.write_scales(too_many, true).unwrap_err();
        assert_eq!(
            err,
            RegionError::ScaleCapacityExceeded {
                count: SCALE_CAPACITY + 1,
                capacity: SCALE_CAPACITY,
            }
        );
        assert_eq!(store.region().scale_bytes(), before);
    }

    #[test]
    fn test_merge_overflow_counts_existing_entries() {
        let mut store = store();
        store.write_scales([(100_000, 1.0)], true).unwrap();
        let fill = (1..=SCALE_CAPACITY as u32).map(|id| (id, 1.0));
        assert!(store.write_scales(fill, false).is_err());
        assert_eq!(store.read_scales().len(), 1);
    }

    #[test]
    fn test_full_capacity_fits() {
        let mut store = store();
        let fill = (1..=SCALE_CAPACITY as u32).map(|id| (id, 1.0));
        assert_eq!(store.write_scales(fill, true).unwrap(), SCALE_CAPACITY);
        assert_eq!(store.read_scales().len(), SCALE_CAPACITY);
    }

    #[test]
    fn test_active_ids_sorted_and_distinct() {
        let mut store = store();
        store.write_active_ids(&[5, 3, 3, 1]).unwrap();
        assert_eq!(store.read_active_ids(), &[1, 3, 5]);
        assert_eq!(store.region().read_active_ids(), vec![1, 3, 5]);
    }

    #[test]
    fn test_active_change_fires_once_per_transition() {
        let mut store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.on_active_change(move |ids| sink.lock().unwrap().push(ids.to_vec()));

        assert!(store.write_active_ids(&[5, 3, 3, 1]).unwrap());
        assert!(!store.write_active_ids(&[1, 3, 5]).unwrap());
        assert!(!store.write_active_ids(&[3, 5, 1, 1]).unwrap());
        assert!(store.write_active_ids(&[2]).unwrap());

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![vec![1, 3, 5], vec![2]]);
    }

    #[test]
    fn test_empty_first_write_is_not_a_change() {
        let mut store = store();
        assert!(!store.write_active_ids(&[]).unwrap());
    }

    #[test]
    fn test_clearing_active_ids_is_a_change() {
        let mut store = store();
        store.write_active_ids(&[4]).unwrap();
        assert!(store.write_active_ids(&[]).unwrap());
        assert!(store.read_active_ids().is_empty());
        assert!(store.region().read_active_ids().is_empty());
    }

    #[test]
    fn test_active_capacity_overflow_rejected() {
        let mut store = store();
        store.write_active_ids(&[7]).unwrap();
        let ids: Vec<u32> = (1..=ACTIVE_CAPACITY as u32 + 1).collect();
        assert!(matches!(
            store.write_active_ids(&ids),
            Err(RegionError::ActiveCapacityExceeded { .. })
        ));
        assert_eq!(store.region().read_active_ids(), vec![7]);
    }

    #[test]
    fn test_read_active_ids_picks_up_existing_table() {
        let region = Arc::new(SharedRegion::new());
        ScaleStore::new(Arc::clone(&region))
            .write_active_ids(&[9, 8])
            .unwrap();
        let mut fresh = ScaleStore::new(region);
        assert_eq!(fresh.read_active_ids(), &[8, 9]);
    }
}
