//! Host Collaborators
//!
//! The image host rasterizes layers and encodes pixmaps; the core only sees
//! these traits. [`SnapshotRasterizer`] and [`PngEncoder`] implement them
//! for offline snapshots (CLI and tests).

use base64::Engine;
use image::ImageEncoder;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::document::{Bounds, Layer, LayerId};
use crate::profile::RootVariant;

/// Errors raised by host collaborators are opaque to the core.
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Minimal 1x1 transparent PNG.
pub const BUILTIN_SPACER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A,
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
    0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41,
    0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00,
    0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Rendered layer pixels. `pixels` is RGBA8, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixmap {
    pub bounds: Bounds,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub icc_profile: Option<Vec<u8>>,
}

impl Pixmap {
    pub fn transparent(bounds: Bounds) -> Self {
        let (width, height) = pixel_size(&bounds);
        Self {
            bounds,
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            icc_profile: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixmapRequest {
    pub document_id: u32,
    pub layer_id: LayerId,
    /// Document bounds when the pixmap must be clipped to the canvas.
    pub clip_to: Option<Bounds>,
    /// Profile the host converts the pixels into.
    pub icc_profile: &'static str,
    pub include_icc_data: bool,
}

pub trait Rasterizer {
    fn get_pixmap(&self, layer: &Layer, request: &PixmapRequest) -> Result<Pixmap, HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub format: OutputFormat,
    pub ppi: f64,
    pub scale: Option<u32>,
    pub icc_profile: &'static str,
}

pub trait PixmapEncoder {
    fn stream_pixmap(
        &self,
        pixmap: &Pixmap,
        out: &mut dyn Write,
        settings: &EncodeSettings,
    ) -> Result<(), HostError>;
}

fn pixel_size(bounds: &Bounds) -> (u32, u32) {
    (
        bounds.width().round().max(0.0) as u32,
        bounds.height().round().max(0.0) as u32,
    )
}

/// Renders layers from a document snapshot's embedded base64 rasters.
/// Layers without pixel data render fully transparent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotRasterizer;

impl Rasterizer for SnapshotRasterizer {
    fn get_pixmap(&self, layer: &Layer, request: &PixmapRequest) -> Result<Pixmap, HostError> {
        let bounds = match request.clip_to {
            Some(canvas) => layer.bounds.intersect(&canvas),
            None => layer.bounds,
        };

        let mut pixmap = match &layer.pixels {
            None => Pixmap::transparent(bounds),
            Some(encoded) => {
                let source = base64::engine::general_purpose::STANDARD.decode(encoded)?;
                crop_rgba(&source, &layer.bounds, &bounds)?
            }
        };
        if request.include_icc_data {
            pixmap.icc_profile = Some(request.icc_profile.as_bytes().to_vec());
        }
        Ok(pixmap)
    }
}

fn crop_rgba(source: &[u8], source_bounds: &Bounds, crop: &Bounds) -> Result<Pixmap, HostError> {
    let (src_w, src_h) = pixel_size(source_bounds);
    let expected = src_w as usize * src_h as usize * 4;
    if source.len() != expected {
        return Err(format!(
            "layer raster has {} bytes, expected {} for {}x{} RGBA",
            source.len(), expected, src_w, src_h
        ).into());
    }

    let (width, height) = pixel_size(crop);
    let off_x = (crop.left - source_bounds.left).round().max(0.0) as usize;
    let off_y = (crop.top - source_bounds.top).round().max(0.0) as usize;
    let row_bytes = width as usize * 4;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = ((off_y + row) * src_w as usize + off_x) * 4;
        let line = source
            .get(start..start + row_bytes)
            .ok_or("crop rectangle falls outside the layer raster")?;
        pixels.extend_from_slice(line);
    }

    Ok(Pixmap { bounds: *crop, width, height, pixels, icc_profile: None })
}

/// Encodes RGBA8 pixmaps as PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl PixmapEncoder for PngEncoder {
    fn stream_pixmap(
        &self,
        pixmap: &Pixmap,
        out: &mut dyn Write,
        settings: &EncodeSettings,
    ) -> Result<(), HostError> {
        if settings.format != OutputFormat::Png {
            return Err("only PNG output is supported".into());
        }
        if pixmap.width == 0 || pixmap.height == 0 {
            return Err("cannot encode an empty pixmap".into());
        }
        tracing::trace!(ppi = settings.ppi, profile = settings.icc_profile, "encoding png");

        image::codecs::png::PngEncoder::new(out).write_image(
            &pixmap.pixels,
            pixmap.width,
            pixmap.height,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(())
    }
}

/// Static images copied verbatim for spacer layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpacerAssets {
    pub srgb: Vec<u8>,
    pub p3: Vec<u8>,
}

impl SpacerAssets {
    pub fn builtin() -> Self {
        Self {
            srgb: BUILTIN_SPACER_PNG.to_vec(),
            p3: BUILTIN_SPACER_PNG.to_vec(),
        }
    }

    pub fn for_variant(&self, variant: RootVariant) -> &[u8] {
        if variant.is_p3() { &self.p3 } else { &self.srgb }
    }
}

impl Default for SpacerAssets {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(clip_to: Option<Bounds>) -> PixmapRequest {
        PixmapRequest {
            document_id: 1,
            layer_id: LayerId(1),
            clip_to,
            icc_profile: "sRGB IEC61966-2.1",
            include_icc_data: true,
        }
    }

    #[test]
    fn test_snapshot_clips_to_canvas() {
        let layer = Layer::leaf(1, "wide", Bounds::new(-10.0, 0.0, 30.0, 10.0));
        let canvas = Bounds::new(0.0, 0.0, 20.0, 20.0);
        let pixmap = SnapshotRasterizer.get_pixmap(&layer, &request(Some(canvas))).unwrap();
        assert_eq!(pixmap.bounds, Bounds::new(0.0, 0.0, 20.0, 10.0));
        assert_eq!(pixmap.pixels.len(), 20 * 10 * 4);
        assert!(pixmap.icc_profile.is_some());
    }

    #[test]
    fn test_snapshot_crops_embedded_pixels() {
        // 2x1 raster: red, green. Canvas keeps only the green pixel.
        let raw = [255u8, 0, 0, 255, 0, 255, 0, 255];
        let mut layer = Layer::leaf(1, "pair", Bounds::new(-1.0, 0.0, 1.0, 1.0));
        layer.pixels = Some(base64::engine::general_purpose::STANDARD.encode(raw));

        let pixmap = SnapshotRasterizer
            .get_pixmap(&layer, &request(Some(Bounds::new(0.0, 0.0, 5.0, 5.0))))
            .unwrap();
        assert_eq!(pixmap.width, 1);
        assert_eq!(pixmap.pixels, vec![0, 255, 0, 255]);
    }

    #[test]
    fn test_snapshot_rejects_short_raster() {
        let mut layer = Layer::leaf(1, "bad", Bounds::new(0.0, 0.0, 2.0, 2.0));
        layer.pixels = Some(base64::engine::general_purpose::STANDARD.encode([0u8; 4]));
        assert!(SnapshotRasterizer.get_pixmap(&layer, &request(None)).is_err());
    }

    #[test]
    fn test_png_encoder_writes_signature() {
        let pixmap = Pixmap::transparent(Bounds::new(0.0, 0.0, 3.0, 2.0));
        let settings = EncodeSettings {
            format: OutputFormat::Png,
            ppi: 72.0,
            scale: None,
            icc_profile: "sRGB IEC61966-2.1",
        };
        let mut out = Vec::new();
        PngEncoder.stream_pixmap(&pixmap, &mut out, &settings).unwrap();
        assert_eq!(&out[..8], &BUILTIN_SPACER_PNG[..8]);
    }

    #[test]
    fn test_spacer_asset_per_variant() {
        let assets = SpacerAssets { srgb: vec![1], p3: vec![2] };
        assert_eq!(assets.for_variant(RootVariant::Art), &[1]);
        assert_eq!(assets.for_variant(RootVariant::ArtP3At2x), &[2]);
    }
}
