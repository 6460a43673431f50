//! Image-illustrated PDF product catalogs from tabular data.
//!
//! Rows of `{code, name, price, image, author, category}` are grouped by
//! category hierarchy or by author, their images fetched in parallel into a
//! per-run cache, and laid out as a paginated grid document. Every run
//! reports progress through a [`Coordinator`] and can be cancelled between
//! units of work.

pub mod catalog;
pub mod color;
pub mod engine;
pub mod error;
pub mod images;
pub mod progress;
pub mod render;

#[cfg(test)]
mod test_support;

pub use catalog::{CatalogMode, CatalogSettings};
pub use engine::{CatalogEngine, CatalogRequest, RunReport};
pub use error::{CatalogError, CatalogResult};
pub use progress::{CancelFlag, CancelProbe, Coordinator, Phase, ProgressHandle, ProgressSink, ProgressState};
