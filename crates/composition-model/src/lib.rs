//! Framefx Composition Model
//!
//! Defines the data contracts consumed by the composition engine:
//! - **Instructions:** which filter, with which parameters, applies over a
//!   half-open time range of one source track
//! - **Tracks:** sorted, non-overlapping instruction sequences with
//!   `O(log n)` timestamp lookup and snapshot publishing
//! - **Catalog:** the swappable table mapping filter ids to backend
//!   filter names and default parameters
//!
//! Instructions are values. Editing replaces whole instructions (and whole
//! tracks); nothing is mutated in place while a reader may hold it.

pub mod catalog;
pub mod instruction;
pub mod params;
pub mod time;
pub mod track;

pub use catalog::*;
pub use instruction::*;
pub use params::*;
pub use time::*;
pub use track::*;
