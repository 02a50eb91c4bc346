pub mod backfill;
pub mod catalog;
pub mod progress_store;

pub use backfill::Backfiller;
pub use catalog::{CatalogProvider, TvdbCatalog};
pub use progress_store::ProgressStore;
