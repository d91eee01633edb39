//! Frame composition.
//!
//! The compositor is the single drawing path for both interactive preview and offline
//! export; everything it consumes is prepared up front so output depends only on the
//! render state and the loaded asset set.

/// Caption rasterization through the SVG text pipeline.
pub mod caption;
/// The deterministic frame compositor.
pub mod compositor;
/// Cover/contain fit geometry.
pub mod fit;
