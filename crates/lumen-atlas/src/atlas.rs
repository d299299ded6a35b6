//! Single-row atlas packer.
//!
//! Images are laid out left to right in insertion order, separated by
//! `padding` pixels, and the atlas is sized to the next power of two in both
//! dimensions. There is no bin packing: tall, narrow sets waste atlas area.

use std::collections::HashMap;
use std::path::Path;

use glam::Vec2;
use image::RgbaImage;
use thiserror::Error;

use crate::rect::AtlasRect;

/// Largest atlas edge accepted by default, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

// ---------------------------------------------------------------------------
// AtlasError
// ---------------------------------------------------------------------------

/// Errors returned during atlas construction.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Failed to load an image file.
    #[error("image load error: {0}")]
    ImageLoad(#[from] image::ImageError),

    /// The packed layout does not fit in the maximum texture size.
    #[error("atlas {width}x{height} exceeds the maximum dimension {max}")]
    TooLarge {
        /// Required width after power-of-two rounding.
        width: u32,
        /// Required height after power-of-two rounding.
        height: u32,
        /// Configured limit.
        max: u32,
    },
}

// ---------------------------------------------------------------------------
// TextureAtlas
// ---------------------------------------------------------------------------

/// A packed atlas image and its region table. Immutable once built.
pub struct TextureAtlas {
    image: RgbaImage,
    regions: HashMap<String, AtlasRect>,
    order: Vec<String>,
}

impl TextureAtlas {
    /// The packed RGBA image.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Atlas width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Atlas height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Region for `name`, or [`AtlasRect::EMPTY`] if unknown.
    pub fn region(&self, name: &str) -> AtlasRect {
        self.regions.get(name).copied().unwrap_or(AtlasRect::EMPTY)
    }

    /// Whether `name` was packed into this atlas.
    pub fn has_region(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    /// Number of packed regions.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Region names in packing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Iterate `(name, rect)` in packing order.
    pub fn regions(&self) -> impl Iterator<Item = (&str, AtlasRect)> {
        self.order
            .iter()
            .map(|name| (name.as_str(), self.region(name)))
    }

    /// Normalized `(uv_min, uv_max)` for `name`.
    pub fn region_uvs(&self, name: &str) -> Option<(Vec2, Vec2)> {
        let rect = self.regions.get(name)?;
        let size = Vec2::new(self.width() as f32, self.height() as f32);
        Some((
            Vec2::new(rect.x as f32, rect.y as f32) / size,
            Vec2::new(rect.right() as f32, rect.bottom() as f32) / size,
        ))
    }

    /// Region UVs inset by half a texel to prevent bleeding under filtering.
    pub fn region_uvs_inset(&self, name: &str) -> Option<(Vec2, Vec2)> {
        let (uv_min, uv_max) = self.region_uvs(name)?;
        let half_texel = Vec2::new(0.5 / self.width() as f32, 0.5 / self.height() as f32);
        Some((uv_min + half_texel, uv_max - half_texel))
    }
}

// ---------------------------------------------------------------------------
// AtlasBuilder
// ---------------------------------------------------------------------------

/// Collects named images, then packs them with [`build`](Self::build).
pub struct AtlasBuilder {
    padding: u32,
    max_dimension: u32,
    entries: Vec<(String, RgbaImage)>,
}

impl AtlasBuilder {
    /// Create a builder separating images by `padding` pixels.
    pub fn new(padding: u32) -> Self {
        Self {
            padding,
            max_dimension: DEFAULT_MAX_DIMENSION,
            entries: Vec::new(),
        }
    }

    /// Override the maximum atlas edge length.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Add an in-memory image. A repeated name keeps the first image.
    pub fn add_image(&mut self, name: &str, image: RgbaImage) -> &mut Self {
        if self.entries.iter().any(|(n, _)| n == name) {
            log::warn!("Atlas already contains '{}', ignoring duplicate", name);
        } else {
            self.entries.push((name.to_string(), image));
        }
        self
    }

    /// Load an image from disk and add it under `name`.
    pub fn add_image_file(&mut self, name: &str, path: &Path) -> Result<&mut Self, AtlasError> {
        let image = image::open(path)?.to_rgba8();
        Ok(self.add_image(name, image))
    }

    /// Number of images queued for packing.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no images are queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atlas dimensions the current entries would pack into, or `None` if
    /// the layout overflows `u32`.
    pub fn packed_size(&self) -> Option<(u32, u32)> {
        let p = self.padding;
        let width = self.entries.iter().try_fold(p, |acc, (_, img)| {
            acc.checked_add(img.width())?.checked_add(p)
        })?;
        let tallest = self
            .entries
            .iter()
            .map(|(_, img)| img.height())
            .max()
            .unwrap_or(0);
        let height = p.checked_mul(2)?.checked_add(tallest)?;
        Some((
            width.max(1).checked_next_power_of_two()?,
            height.max(1).checked_next_power_of_two()?,
        ))
    }

    /// Pack every entry. Returns `Ok(None)` when no images were added.
    pub fn build(self) -> Result<Option<TextureAtlas>, AtlasError> {
        if self.entries.is_empty() {
            return Ok(None);
        }

        let (width, height) = self.packed_size().unwrap_or((u32::MAX, u32::MAX));
        if width > self.max_dimension || height > self.max_dimension {
            return Err(AtlasError::TooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }

        let mut image = RgbaImage::new(width, height);
        let mut regions = HashMap::with_capacity(self.entries.len());
        let mut order = Vec::with_capacity(self.entries.len());
        let mut x = self.padding;
        let y = self.padding;

        for (name, source) in self.entries {
            image::imageops::replace(&mut image, &source, x as i64, y as i64);
            regions.insert(
                name.clone(),
                AtlasRect::new(x, y, source.width(), source.height()),
            );
            order.push(name);
            x += source.width() + self.padding;
        }

        log::debug!(
            "Packed {} images into a {}x{} atlas",
            order.len(),
            width,
            height
        );

        Ok(Some(TextureAtlas {
            image,
            regions,
            order,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
