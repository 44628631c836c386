//! # scale_region
//!
//! The shared region: two fixed-capacity tables that the host writes and an
//! out-of-process controller reads through their published numeric handles.
//!
//! This crate provides:
//!
//! - [`region`] — [`SharedRegion`], the address-stable scale and active-id tables.
//! - [`store`] — [`ScaleStore`], the host-owned writer with change detection.
//! - [`error`] — Region error types.
//!
//! ## Layout
//!
//! ```text
//! scale table   16 KiB   (u32 id, f32 scale) pairs, terminated by id == 0
//! active table   1 KiB   u32 ids, terminated by 0
//! ```
//!
//! Words live in native byte order, which is little-endian on every target the
//! host runs on.

pub mod error;
pub mod region;
pub mod store;

pub use error::RegionError;
pub use region::{
    ACTIVE_CAPACITY, ACTIVE_TABLE_BYTES, SCALE_CAPACITY, SCALE_TABLE_BYTES, ScaleMap,
    SharedRegion, is_valid_scale,
};
pub use store::ScaleStore;
