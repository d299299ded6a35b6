//! Sprite atlas packing: merges named source images into one texture plus a
//! name to region lookup table.

mod atlas;
mod rect;

pub use atlas::{AtlasBuilder, AtlasError, DEFAULT_MAX_DIMENSION, TextureAtlas};
pub use rect::AtlasRect;
