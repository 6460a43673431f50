/// Catalog document rendering
///
/// `layout.rs` turns grouped records into abstract page blocks and
/// `pdf.rs` serializes those blocks with printpdf.

pub mod layout;
pub mod pdf;

pub use layout::Block;
pub use pdf::render_document;
