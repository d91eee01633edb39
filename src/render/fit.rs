use crate::foundation::core::Rect;
use crate::scene::storyboard::FitPolicy;

/// Destination rectangle for drawing a `src_w` x `src_h` image onto a `dst_w` x `dst_h`
/// canvas under `policy`.
///
/// Cover scales up until the canvas is filled and lets the overflow crop; contain scales
/// down until the whole image is visible and letterboxes the rest. Both preserve the
/// source aspect ratio and center the result, so the returned rect may extend past the
/// canvas (cover) or leave bars inside it (contain).
pub fn fit_rect(policy: FitPolicy, src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Rect {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return Rect::ZERO;
    }
    let sw = f64::from(src_w);
    let sh = f64::from(src_h);
    let dw = f64::from(dst_w);
    let dh = f64::from(dst_h);

    let scale = match policy {
        FitPolicy::Cover => (dw / sw).max(dh / sh),
        FitPolicy::Contain => (dw / sw).min(dh / sh),
    };
    let out_w = sw * scale;
    let out_h = sh * scale;
    let x0 = (dw - out_w) * 0.5;
    let y0 = (dh - out_h) * 0.5;
    Rect::new(x0, y0, x0 + out_w, y0 + out_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_fills_canvas_and_crops_overflow() {
        let r = fit_rect(FitPolicy::Cover, 100, 50, 100, 100);
        assert_eq!(r.width(), 200.0);
        assert_eq!(r.height(), 100.0);
        assert_eq!(r.x0, -50.0);
        assert_eq!(r.y0, 0.0);
    }

    #[test]
    fn contain_letterboxes_inside_canvas() {
        let r = fit_rect(FitPolicy::Contain, 100, 50, 100, 100);
        assert_eq!(r.width(), 100.0);
        assert_eq!(r.height(), 50.0);
        assert_eq!(r.x0, 0.0);
        assert_eq!(r.y0, 25.0);
    }

    #[test]
    fn matching_aspect_is_exact_under_both_policies() {
        for policy in [FitPolicy::Cover, FitPolicy::Contain] {
            let r = fit_rect(policy, 32, 64, 128, 256);
            assert_eq!((r.x0, r.y0, r.x1, r.y1), (0.0, 0.0, 128.0, 256.0));
        }
    }

    #[test]
    fn degenerate_dimensions_collapse_to_zero() {
        assert_eq!(fit_rect(FitPolicy::Cover, 0, 50, 100, 100), Rect::ZERO);
        assert_eq!(fit_rect(FitPolicy::Contain, 100, 50, 0, 100), Rect::ZERO);
    }
}
