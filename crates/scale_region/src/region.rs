//! Address-stable tables backing the shared region.
//!
//! Each table is a boxed slice of [`AtomicU32`] words allocated once and never
//! resized, so the address of its first byte stays valid for the lifetime of
//! the region. That address is the numeric handle published to a cooperating
//! reader. Individual words are atomic, which lets any thread observe the
//! tables without a lock on the bytes; writes are still expected to come from
//! a single owner (see [`ScaleStore`](crate::ScaleStore)).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

/// Id → scale mapping as read from or written to the scale table.
pub type ScaleMap = BTreeMap<u32, f32>;

/// Size of the scale table in bytes.
pub const SCALE_TABLE_BYTES: usize = 16 * 1024;

/// Bytes per scale entry (`u32` id + `f32` scale).
pub const SCALE_ENTRY_BYTES: usize = 8;

/// Usable scale entries; one entry is reserved for the sentinel.
pub const SCALE_CAPACITY: usize = SCALE_TABLE_BYTES / SCALE_ENTRY_BYTES - 1;

/// Size of the active-id table in bytes.
pub const ACTIVE_TABLE_BYTES: usize = 1024;

/// Bytes per active-id entry.
pub const ACTIVE_ENTRY_BYTES: usize = 4;

/// Usable active-id entries; one entry is reserved for the sentinel.
pub const ACTIVE_CAPACITY: usize = ACTIVE_TABLE_BYTES / ACTIVE_ENTRY_BYTES - 1;

/// Returns `true` if `scale` may be stored in the scale table.
///
/// Valid scales are finite, strictly positive and strictly below
/// [`f32::MAX`]. `NaN` fails every comparison and is rejected as well.
#[must_use]
pub fn is_valid_scale(scale: f32) -> bool {
    scale > 0.0 && scale < f32::MAX
}

/// A fixed block of 32-bit words whose address never changes.
#[derive(Debug)]
struct PinnedTable {
    words: Box<[AtomicU32]>,
}

impl PinnedTable {
    fn zeroed(bytes: usize) -> Self {
        let words = (0..bytes / 4).map(|_| AtomicU32::new(0)).collect();
        Self { words }
    }

    fn handle(&self) -> i64 {
        self.words.as_ptr() as usize as i64
    }

    fn load(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Acquire)
    }

    fn store(&self, index: usize, value: u32) {
        self.words[index].store(value, Ordering::Release);
    }

    fn to_le_bytes(&self) -> Vec<u8> {
        self.words
            .iter()
            .flat_map(|word| word.load(Ordering::Acquire).to_le_bytes())
            .collect()
    }
}

static PROCESS_REGION: OnceLock<Arc<SharedRegion>> = OnceLock::new();

/// The scale table and the active-id table.
#[derive(Debug)]
pub struct SharedRegion {
    scales: PinnedTable,
    active: PinnedTable,
}

impl SharedRegion {
    /// Allocate a new, zeroed region.
    ///
    /// Most callers want [`SharedRegion::attach`]; a standalone region is
    /// useful when several independent hosts share one process, as in tests.
    #[must_use]
    pub fn new() -> Self {
        let region = Self {
            scales: PinnedTable::zeroed(SCALE_TABLE_BYTES),
            active: PinnedTable::zeroed(ACTIVE_TABLE_BYTES),
        };
        debug!(
            scale_handle = %format!("{:X}", region.scale_handle()),
            active_handle = %format!("{:X}", region.active_handle()),
            "allocated shared region"
        );
        region
    }

    /// Attach to the process-wide region, allocating it on first use.
    ///
    /// Re-attaching returns the same instance, so the published handles stay
    /// stable for the lifetime of the process.
    #[must_use]
    pub fn attach() -> Arc<Self> {
        Arc::clone(PROCESS_REGION.get_or_init(|| Arc::new(Self::new())))
    }

    /// Numeric handle (address of the first byte) of the scale table.
    #[must_use]
    pub fn scale_handle(&self) -> i64 {
        self.scales.handle()
    }

    /// Numeric handle (address of the first byte) of the active-id table.
    #[must_use]
    pub fn active_handle(&self) -> i64 {
        self.active.handle()
    }

    /// Scan the scale table up to the first zero id or the capacity bound.
    ///
    /// Stored values outside `(0, f32::MAX)` are skipped.
    #[must_use]
    pub fn read_scales(&self) -> ScaleMap {
        let mut scales = ScaleMap::new();
        for entry in 0..SCALE_CAPACITY {
            let id = self.scales.load(entry * 2);
            if id == 0 {
                break;
            }
            let scale = f32::from_bits(self.scales.load(entry * 2 + 1));
            if is_valid_scale(scale) {
                scales.insert(id, scale);
            }
        }
        scales
    }

    /// Scan the active-id table and return the ids sorted and deduplicated.
    #[must_use]
    pub fn read_active_ids(&self) -> Vec<u32> {
        let mut ids = Vec::new();
        for entry in 0..ACTIVE_CAPACITY {
            let id = self.active.load(entry);
            if id == 0 {
                break;
            }
            ids.push(id);
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Write `entries` followed by the sentinel.
    ///
    /// The caller has already validated the entries and the capacity.
    pub(crate) fn write_scale_entries(&self, entries: &ScaleMap) {
        debug_assert!(entries.len() <= SCALE_CAPACITY);
        for (entry, (&id, &scale)) in entries.iter().enumerate() {
            self.scales.store(entry * 2, id);
            self.scales.store(entry * 2 + 1, scale.to_bits());
        }
        let end = entries.len() * 2;
        self.scales.store(end, 0);
        self.scales.store(end + 1, 0);
    }

    /// Write `ids` followed by the sentinel.
    pub(crate) fn write_active_entries(&self, ids: &[u32]) {
        debug_assert!(ids.len() <= ACTIVE_CAPACITY);
        for (entry, &id) in ids.iter().enumerate() {
            self.active.store(entry, id);
        }
        self.active.store(ids.len(), 0);
    }

    /// Little-endian byte image of the scale table, as a foreign reader sees it.
    #[must_use]
    pub fn scale_bytes(&self) -> Vec<u8> {
        self.scales.to_le_bytes()
    }

    /// Little-endian byte image of the active-id table.
    #[must_use]
    pub fn active_bytes(&self) -> Vec<u8> {
        self.active.to_le_bytes()
    }
}

impl Default for SharedRegion {
    fn default() -> Self {
        Self::new()
    }
}
