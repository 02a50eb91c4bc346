//! Client-side mirror of the progress store
//!
//! [`ProgressCache`] keeps the user's progress locally so percentages update
//! before any network round trip, talks to the store through [`ProgressApi`]
//! and persists itself to a [`SnapshotFile`] for cold starts.

pub mod cache;
pub mod preload;
pub mod progress_api;
pub mod snapshot;

pub use cache::{LoadState, ProgressCache, SeriesProgress};
pub use preload::{PreloadHandle, Preloader};
pub use progress_api::{HttpProgressApi, ProgressApi};
pub use snapshot::{Snapshot, SnapshotFile, SNAPSHOT_KEY};
