/// Catalog data module
///
/// This module handles everything known before any image is fetched:
/// - Source rows, records and category paths (data.rs)
/// - Grouping by category hierarchy or author, selection summaries (library.rs)
/// - Run settings loaded from JSON (settings.rs)

pub mod data;
pub mod library;
pub mod settings;

pub use data::{CatalogMode, Category, Record};
pub use library::{group_records, GroupedCatalog};
pub use settings::CatalogSettings;
