/// Image acquisition module
///
/// Architecture:
/// - `fetch.rs` - HTTP GET with timeouts and retry/backoff
/// - `normalize.rs` - decode, RGB, upscale and JPEG re-encode; placeholder
/// - `cache.rs` - per-run URL to file mapping and the bounded fetch pool

pub mod cache;
pub mod fetch;
pub mod normalize;

pub use cache::ImageCache;
