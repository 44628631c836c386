//! Region error types.

/// Errors raised when writing to the shared region.
///
/// A failed write never touches the underlying table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// More distinct ids than the scale table can hold.
    #[error("scale table capacity exceeded: {count} entries, capacity {capacity}")]
    ScaleCapacityExceeded {
        /// Number of entries the write would have produced.
        count: usize,
        /// Usable entries in the table.
        capacity: usize,
    },

    /// More ids than the active-id table can hold.
    #[error("active id table capacity exceeded: {count} ids, capacity {capacity}")]
    ActiveCapacityExceeded {
        /// Number of ids passed to the write.
        count: usize,
        /// Usable entries in the table.
        capacity: usize,
    },
}
