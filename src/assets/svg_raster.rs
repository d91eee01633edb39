use crate::foundation::error::{SlidecastError, SlidecastResult};

// Avoid pathological allocations from absurd SVG or scale inputs.
const MAX_DIM: u32 = 16_384;

/// Compute the raster size that scales an SVG, aspect-preserving, to
/// `target_height` pixels.
pub fn raster_size_for_height(tree: &usvg::Tree, target_height: u32) -> SlidecastResult<(u32, u32)> {
    let size = tree.size();
    let (base_w, base_h) = (size.width(), size.height());
    if !base_w.is_finite() || !base_h.is_finite() || base_w <= 0.0 || base_h <= 0.0 {
        return Err(SlidecastError::asset_load("svg has invalid width/height"));
    }
    if target_height == 0 {
        return Err(SlidecastError::validation("svg target height must be > 0"));
    }

    let scale = f64::from(target_height) / f64::from(base_h);
    let w = (f64::from(base_w) * scale).ceil().max(1.0) as u32;
    let h = target_height;
    if w > MAX_DIM || h > MAX_DIM {
        return Err(SlidecastError::asset_load(format!(
            "svg raster size too large: {w}x{h} (max {MAX_DIM}x{MAX_DIM})"
        )));
    }

    Ok((w, h))
}

/// Rasterize an SVG tree into premultiplied RGBA8 bytes at `width`×`height`.
pub fn rasterize_svg_to_premul_rgba8(
    tree: &usvg::Tree,
    width: u32,
    height: u32,
) -> SlidecastResult<Vec<u8>> {
    if width == 0 || height == 0 || width > MAX_DIM || height > MAX_DIM {
        return Err(SlidecastError::validation(format!(
            "svg raster dimensions out of range: {width}x{height}"
        )));
    }
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| SlidecastError::asset_load("failed to allocate svg pixmap"))?;

    let sx = (width as f32) / tree.size().width();
    let sy = (height as f32) / tree.size().height();
    let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);

    resvg::render(tree, xform, &mut pixmap.as_mut());
    Ok(pixmap.data().to_vec())
}
