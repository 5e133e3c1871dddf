// Opacity module
// Holds the overlay opacity value and rewrites image alpha to fake translucency

use image::RgbaImage;

/// Lowest opacity the overlay can be turned down to
pub const MIN_OPACITY: u8 = 10;

/// Fully opaque
pub const MAX_OPACITY: u8 = 255;

/// Opacity used when nothing else is requested
pub const DEFAULT_OPACITY: u8 = 150;

/// Opacity change per wheel tick
pub const OPACITY_STEP: i32 = 15;

/// Target alpha for every visible pixel, always within [MIN_OPACITY, MAX_OPACITY]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Opacity(u8);

impl Opacity {
    /// Build an opacity from any integer, clamping into range
    pub fn new(value: i32) -> Self {
        Self(value.clamp(MIN_OPACITY as i32, MAX_OPACITY as i32) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Opacity after `ticks` wheel notches (positive = more opaque)
    pub fn adjusted(self, ticks: i32) -> Self {
        let delta = ticks.saturating_mul(OPACITY_STEP);
        Self::new((self.0 as i32).saturating_add(delta))
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self(DEFAULT_OPACITY)
    }
}

/// Produce a copy of `src` where every pixel with non-zero alpha carries `opacity` as alpha.
///
/// RGB channels and fully transparent pixels are left as they are. The source
/// is never modified, so repeated calls with the same opacity give the same bitmap.
pub fn apply_opacity(src: &RgbaImage, opacity: Opacity) -> RgbaImage {
    let alpha = opacity.value();
    let mut out = src.clone();
    for pixel in out.chunks_exact_mut(4) {
        if pixel[3] > 0 {
            pixel[3] = alpha;
        }
    }
    out
}
