// Application state module
// Overlay state and the mouse gesture state machine

use crate::image_loader::{self, ImageData, LoadError};
use crate::opacity::{apply_opacity, Opacity};
use image::RgbaImage;
use log::{debug, info};
use std::path::Path;

/// Bottom-right corner area (in pixels) where a left press starts a resize
pub const RESIZE_MARGIN: f64 = 20.0;

/// Smallest size a resize gesture can shrink the window to
pub const MIN_SIZE: u32 = 50;

/// Window size while the drop prompt is shown
pub const PLACEHOLDER_SIZE: u32 = 300;

pub const MIN_SCALE: f32 = 0.2;
pub const MAX_SCALE: f32 = 3.0;

/// Scale change per wheel tick
pub const SCALE_STEP: f32 = 0.1;

/// A pointer position
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Mouse buttons the overlay reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    Other(u32),
}

/// The interaction currently driven by a held mouse button
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    /// Moving the window; `anchor` is the last global pointer position
    Dragging { anchor: Point },
    /// Growing/shrinking from the bottom-right corner
    Resizing { anchor: Point },
    /// Wheel changes opacity while this is held
    AdjustingOpacity,
}

impl Gesture {
    /// Button whose release ends this gesture
    fn button(&self) -> Option<Button> {
        match self {
            Gesture::Idle => None,
            Gesture::Dragging { .. } | Gesture::Resizing { .. } => Some(Button::Left),
            Gesture::AdjustingOpacity => Some(Button::Right),
        }
    }
}

/// Window position (top-left, output coordinates) and size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// What the windowing layer has to do after a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Position changed
    Move,
    /// Size changed, a redraw is needed too
    Resize,
    /// Only the pixels changed
    Repaint,
}

/// What happens to the scale factor when a new image is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalePolicy {
    /// Start every new image at the startup scale (native size by default)
    #[default]
    Reset,
    /// Show the new image at the current scale factor
    Keep,
}

/// Startup settings for the overlay
#[derive(Debug, Clone, Copy)]
pub struct OverlayConfig {
    pub opacity: Opacity,
    pub scale: f32,
    pub scale_policy: ScalePolicy,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            opacity: Opacity::default(),
            scale: 1.0,
            scale_policy: ScalePolicy::default(),
        }
    }
}

/// Main overlay state, owned by the event loop
pub struct OverlayState {
    image: Option<ImageData>,
    /// Opacity-rewritten copy of `image`, the bitmap that gets shown
    displayed: Option<RgbaImage>,
    opacity: Opacity,
    scale_factor: f32,
    /// Scale a new image starts at under `ScalePolicy::Reset`
    initial_scale: f32,
    scale_policy: ScalePolicy,
    gesture: Gesture,
    geometry: Geometry,
    /// Bumped whenever `displayed` changes
    generation: u64,
    should_exit: bool,
}

impl OverlayState {
    /// Create an empty overlay showing the drop prompt
    pub fn new(config: OverlayConfig) -> Self {
        let scale = config.scale.clamp(MIN_SCALE, MAX_SCALE);
        Self {
            image: None,
            displayed: None,
            opacity: config.opacity,
            scale_factor: scale,
            initial_scale: scale,
            scale_policy: config.scale_policy,
            gesture: Gesture::Idle,
            geometry: Geometry {
                x: 0,
                y: 0,
                width: PLACEHOLDER_SIZE,
                height: PLACEHOLDER_SIZE,
            },
            generation: 0,
            should_exit: false,
        }
    }

    pub fn opacity(&self) -> Opacity {
        self.opacity
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn image(&self) -> Option<&ImageData> {
        self.image.as_ref()
    }

    /// The bitmap to present, with the current opacity applied
    pub fn displayed(&self) -> Option<&RgbaImage> {
        self.displayed.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The drop prompt is shown until the first image arrives
    pub fn placeholder_visible(&self) -> bool {
        self.image.is_none()
    }

    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn request_exit(&mut self) {
        self.should_exit = true;
    }

    /// Whether a surface-local position lies in the bottom-right resize corner
    pub fn in_resize_corner(&self, local: Point) -> bool {
        local.x > self.geometry.width as f64 - RESIZE_MARGIN
            && local.y > self.geometry.height as f64 - RESIZE_MARGIN
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.geometry.x = x;
        self.geometry.y = y;
    }

    /// Accept the compositor's idea of our size (it may clamp what we asked for)
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.geometry.width = width.max(1);
        self.geometry.height = height.max(1);
    }

    /// Start a gesture. Presses while another gesture is active are ignored.
    pub fn press(&mut self, button: Button, local: Point, global: Point) -> Effect {
        if self.gesture != Gesture::Idle {
            debug!("Ignoring {:?} press during {:?}", button, self.gesture);
            return Effect::None;
        }

        self.gesture = match button {
            Button::Left if self.in_resize_corner(local) => Gesture::Resizing { anchor: global },
            Button::Left => Gesture::Dragging { anchor: global },
            Button::Right => Gesture::AdjustingOpacity,
            Button::Other(_) => return Effect::None,
        };
        debug!("Gesture started: {:?}", self.gesture);
        Effect::None
    }

    /// Pointer moved to `global` (output coordinates)
    pub fn motion(&mut self, global: Point) -> Effect {
        match self.gesture {
            Gesture::Dragging { anchor } => {
                let (dx, dy) = delta(anchor, global);
                self.gesture = Gesture::Dragging { anchor: global };
                if dx == 0 && dy == 0 {
                    return Effect::None;
                }
                self.geometry.x = self.geometry.x.saturating_add(dx);
                self.geometry.y = self.geometry.y.saturating_add(dy);
                Effect::Move
            }
            Gesture::Resizing { anchor } => {
                let (dx, dy) = delta(anchor, global);
                self.gesture = Gesture::Resizing { anchor: global };
                let width = grow(self.geometry.width, dx);
                let height = grow(self.geometry.height, dy);
                if (width, height) == (self.geometry.width, self.geometry.height) {
                    return Effect::None;
                }
                self.geometry.width = width;
                self.geometry.height = height;
                Effect::Resize
            }
            Gesture::Idle | Gesture::AdjustingOpacity => Effect::None,
        }
    }

    /// End the gesture if `button` is the one that started it
    pub fn release(&mut self, button: Button) -> Effect {
        if self.gesture.button() != Some(button) {
            return Effect::None;
        }
        let was_resizing = matches!(self.gesture, Gesture::Resizing { .. });
        debug!("Gesture ended: {:?}", self.gesture);
        self.gesture = Gesture::Idle;
        // Resizing draws a fast preview; finish with a full quality frame
        if was_resizing {
            Effect::Repaint
        } else {
            Effect::None
        }
    }

    /// Drop whatever gesture is running, e.g. when the pointer goes away
    pub fn cancel_gesture(&mut self) {
        self.gesture = Gesture::Idle;
    }

    /// Wheel notches (positive = away from the user), meaning depends on the held button
    pub fn wheel(&mut self, ticks: i32) -> Effect {
        if ticks == 0 {
            return Effect::None;
        }
        match self.gesture {
            Gesture::Dragging { .. } | Gesture::Resizing { .. } => self.adjust_scale(ticks),
            Gesture::AdjustingOpacity => self.adjust_opacity(ticks),
            Gesture::Idle => Effect::None,
        }
    }

    /// Change the scale factor and size the window to native size × scale
    pub fn adjust_scale(&mut self, ticks: i32) -> Effect {
        self.scale_factor =
            (self.scale_factor + ticks as f32 * SCALE_STEP).clamp(MIN_SCALE, MAX_SCALE);
        debug!("Scale factor: {:.2}", self.scale_factor);

        let Some(image) = &self.image else {
            return Effect::None;
        };
        let (width, height) = scaled_size(image.width, image.height, self.scale_factor);
        if (width, height) == (self.geometry.width, self.geometry.height) {
            return Effect::None;
        }
        self.geometry.width = width;
        self.geometry.height = height;
        Effect::Resize
    }

    /// Change opacity and re-run the alpha rewrite over the whole image
    pub fn adjust_opacity(&mut self, ticks: i32) -> Effect {
        let opacity = self.opacity.adjusted(ticks);
        if opacity == self.opacity {
            return Effect::None;
        }
        self.opacity = opacity;
        info!("Opacity adjusted to: {}", opacity.value());
        if self.refresh_displayed() {
            Effect::Repaint
        } else {
            Effect::None
        }
    }

    /// Handle Ctrl+Q style shortcuts; `key` is the unmodified character
    pub fn key_pressed(&mut self, key: Option<char>, ctrl: bool) -> Effect {
        if ctrl && matches!(key, Some('q') | Some('Q')) {
            info!("Exit shortcut pressed");
            self.should_exit = true;
        }
        Effect::None
    }

    /// Load a dropped file. On any error the current image and window stay as they were.
    pub fn drop_path(&mut self, path: &Path) -> Result<Effect, LoadError> {
        let image = image_loader::load_image(path)?;
        Ok(self.set_image(image))
    }

    /// Replace the image wholesale and size the window to it
    pub fn set_image(&mut self, image: ImageData) -> Effect {
        if self.scale_policy == ScalePolicy::Reset {
            self.scale_factor = self.initial_scale;
        }
        let (width, height) = scaled_size(image.width, image.height, self.scale_factor);
        info!(
            "Showing {} ({}x{}) at {}x{}",
            image.path.display(),
            image.width,
            image.height,
            width,
            height
        );
        self.image = Some(image);
        self.refresh_displayed();
        // Same size means no configure will come, so the new pixels need an explicit draw
        if (width, height) == (self.geometry.width, self.geometry.height) {
            return Effect::Repaint;
        }
        self.geometry.width = width;
        self.geometry.height = height;
        Effect::Resize
    }

    /// Rebuild the displayed bitmap from the source pixels. False without an image.
    fn refresh_displayed(&mut self) -> bool {
        let Some(image) = &self.image else {
            return false;
        };
        self.displayed = Some(apply_opacity(&image.pixels, self.opacity));
        self.generation += 1;
        true
    }
}

/// Whole-pixel pointer delta
fn delta(from: Point, to: Point) -> (i32, i32) {
    ((to.x - from.x).round() as i32, (to.y - from.y).round() as i32)
}

fn grow(size: u32, by: i32) -> u32 {
    (size as i64 + by as i64).clamp(MIN_SIZE as i64, u32::MAX as i64) as u32
}

/// Native size times scale, truncated, never zero
pub fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    (
        ((width as f32 * scale) as u32).max(1),
        ((height as f32 * scale) as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opacity::{MAX_OPACITY, MIN_OPACITY};
    use image::{ImageFormat, Rgba};
    use std::path::PathBuf;

    fn image(width: u32, height: u32) -> ImageData {
        ImageData {
            width,
            height,
            pixels: RgbaImage::from_pixel(width, height, Rgba([9, 8, 7, 255])),
            path: PathBuf::from("test.png"),
        }
    }

    fn overlay_with_image(width: u32, height: u32) -> OverlayState {
        let mut state = OverlayState::new(OverlayConfig::default());
        state.set_image(image(width, height));
        state
    }

    fn left_drag(state: &mut OverlayState) {
        state.press(Button::Left, Point::new(5.0, 5.0), Point::new(105.0, 105.0));
    }

    #[test]
    fn starts_idle_with_placeholder() {
        let state = OverlayState::new(OverlayConfig::default());
        assert_eq!(state.gesture(), Gesture::Idle);
        assert!(state.placeholder_visible());
        assert!(state.displayed().is_none());
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
    }

    #[test]
    fn left_press_picks_drag_or_resize_by_corner() {
        let mut state = overlay_with_image(200, 100);
        state.press(Button::Left, Point::new(10.0, 10.0), Point::new(0.0, 0.0));
        assert!(matches!(state.gesture(), Gesture::Dragging { .. }));
        state.release(Button::Left);

        state.press(Button::Left, Point::new(190.0, 90.0), Point::new(0.0, 0.0));
        assert!(matches!(state.gesture(), Gesture::Resizing { .. }));
        state.release(Button::Left);

        // exactly on the margin edge is still a drag
        state.press(Button::Left, Point::new(180.0, 95.0), Point::new(0.0, 0.0));
        assert!(matches!(state.gesture(), Gesture::Dragging { .. }));
    }

    #[test]
    fn drag_translates_incrementally() {
        let mut state = overlay_with_image(200, 100);
        let start = state.geometry();
        left_drag(&mut state);

        assert_eq!(state.motion(Point::new(115.0, 100.0)), Effect::Move);
        assert_eq!(state.motion(Point::new(120.0, 90.0)), Effect::Move);
        let geo = state.geometry();
        assert_eq!((geo.x, geo.y), (start.x + 15, start.y - 15));
        assert_eq!((geo.width, geo.height), (200, 100));
        assert_eq!(
            state.gesture(),
            Gesture::Dragging { anchor: Point::new(120.0, 90.0) }
        );
    }

    #[test]
    fn resize_follows_pointer_and_floors_at_min() {
        let mut state = overlay_with_image(200, 100);
        let start = state.geometry();
        state.press(Button::Left, Point::new(195.0, 95.0), Point::new(300.0, 300.0));

        assert_eq!(state.motion(Point::new(330.0, 310.0)), Effect::Resize);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (230, 110));
        assert_eq!((geo.x, geo.y), (start.x, start.y));

        state.motion(Point::new(-1000.0, -1000.0));
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (MIN_SIZE, MIN_SIZE));

        // already at the floor, shrinking further changes nothing
        assert_eq!(state.motion(Point::new(-2000.0, -2000.0)), Effect::None);
        // and growing again works from the floor
        state.motion(Point::new(-1990.0, -1995.0));
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (MIN_SIZE + 10, MIN_SIZE + 5));
    }

    #[test]
    fn motion_without_gesture_does_nothing() {
        let mut state = overlay_with_image(200, 100);
        let before = state.geometry();
        assert_eq!(state.motion(Point::new(500.0, 500.0)), Effect::None);
        assert_eq!(state.geometry(), before);
    }

    #[test]
    fn releasing_other_button_keeps_gesture() {
        let mut state = overlay_with_image(200, 100);
        left_drag(&mut state);
        assert_eq!(state.release(Button::Right), Effect::None);
        assert!(matches!(state.gesture(), Gesture::Dragging { .. }));
        state.release(Button::Other(274));
        assert!(matches!(state.gesture(), Gesture::Dragging { .. }));
        state.release(Button::Left);
        assert_eq!(state.gesture(), Gesture::Idle);

        state.press(Button::Right, Point::default(), Point::default());
        state.release(Button::Left);
        assert_eq!(state.gesture(), Gesture::AdjustingOpacity);
        state.release(Button::Right);
        assert_eq!(state.gesture(), Gesture::Idle);
    }

    #[test]
    fn second_press_does_not_switch_gesture() {
        let mut state = overlay_with_image(200, 100);
        left_drag(&mut state);
        state.press(Button::Right, Point::default(), Point::default());
        assert!(matches!(state.gesture(), Gesture::Dragging { .. }));
    }

    #[test]
    fn wheel_while_left_held_scales_from_native_size() {
        let mut state = overlay_with_image(200, 100);
        left_drag(&mut state);

        assert_eq!(state.wheel(2), Effect::Resize);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), scaled_size(200, 100, state.scale_factor()));
        assert!((state.scale_factor() - 1.2).abs() < 1e-4);

        state.wheel(-5);
        assert!((state.scale_factor() - 0.7).abs() < 1e-4);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), scaled_size(200, 100, state.scale_factor()));
    }

    #[test]
    fn scale_always_clamped() {
        let mut state = overlay_with_image(200, 100);
        left_drag(&mut state);
        for ticks in [1000, -1000, 7, -3, i32::MAX / 2, i32::MIN / 2, 1, -1] {
            state.wheel(ticks);
            let s = state.scale_factor();
            assert!((MIN_SCALE..=MAX_SCALE).contains(&s), "{ticks} -> {s}");
        }
        state.wheel(1000);
        assert_eq!(state.scale_factor(), MAX_SCALE);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (600, 300));
    }

    #[test]
    fn wheel_while_right_held_rewrites_opacity() {
        let mut state = overlay_with_image(4, 4);
        let gen = state.generation();
        state.press(Button::Right, Point::default(), Point::default());

        assert_eq!(state.wheel(1), Effect::Repaint);
        assert_eq!(state.opacity().value(), 165);
        assert!(state.generation() > gen);
        let shown = state.displayed().unwrap();
        assert!(shown.pixels().all(|p| p[3] == 165));
        // rgb survives
        assert_eq!(&shown.get_pixel(0, 0).0[..3], &[9, 8, 7]);

        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (4, 4));
    }

    #[test]
    fn opacity_always_clamped() {
        let mut state = overlay_with_image(2, 2);
        state.press(Button::Right, Point::default(), Point::default());
        for ticks in [100, -100, 3, -7, i32::MAX, i32::MIN] {
            state.wheel(ticks);
            let o = state.opacity().value();
            assert!((MIN_OPACITY..=MAX_OPACITY).contains(&o));
        }
        state.wheel(-100);
        assert_eq!(state.opacity().value(), MIN_OPACITY);
        // pinned at the bound, nothing to repaint
        assert_eq!(state.wheel(-1), Effect::None);
    }

    #[test]
    fn opacity_without_image_is_a_no_op_rewrite() {
        let mut state = OverlayState::new(OverlayConfig::default());
        state.press(Button::Right, Point::default(), Point::default());
        assert_eq!(state.wheel(1), Effect::None);
        assert_eq!(state.opacity().value(), 165);
        assert!(state.displayed().is_none());
    }

    #[test]
    fn idle_wheel_is_ignored() {
        let mut state = overlay_with_image(20, 20);
        let before = (state.opacity(), state.scale_factor(), state.geometry());
        assert_eq!(state.wheel(3), Effect::None);
        assert_eq!((state.opacity(), state.scale_factor(), state.geometry()), before);
    }

    #[test]
    fn scale_wheel_without_image_keeps_placeholder_size() {
        let mut state = OverlayState::new(OverlayConfig::default());
        left_drag(&mut state);
        assert_eq!(state.wheel(1), Effect::None);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
    }

    #[test]
    fn ctrl_q_requests_exit() {
        let mut state = OverlayState::new(OverlayConfig::default());
        state.key_pressed(Some('q'), false);
        assert!(!state.should_exit());
        state.key_pressed(Some('w'), true);
        assert!(!state.should_exit());
        state.key_pressed(Some('q'), true);
        assert!(state.should_exit());
    }

    #[test]
    fn dropping_unsupported_file_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.txt");
        std::fs::write(&path, b"text").unwrap();

        let mut state = overlay_with_image(64, 32);
        let before = state.geometry();
        assert!(state.drop_path(&path).is_err());
        assert_eq!(state.geometry(), before);
        assert_eq!(state.image().unwrap().path, PathBuf::from("test.png"));
    }

    #[test]
    fn dropping_broken_image_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gif");
        std::fs::write(&path, b"GIF? no").unwrap();

        let mut state = OverlayState::new(OverlayConfig::default());
        assert!(state.drop_path(&path).is_err());
        assert!(state.placeholder_visible());
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
    }

    #[test]
    fn dropping_valid_image_resizes_and_hides_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.bmp");
        RgbaImage::from_pixel(40, 25, Rgba([1, 1, 1, 255]))
            .save_with_format(&path, ImageFormat::Bmp)
            .unwrap();

        let mut state = OverlayState::new(OverlayConfig::default());
        left_drag(&mut state);
        state.wheel(5);
        state.release(Button::Left);

        assert_eq!(state.drop_path(&path).unwrap(), Effect::Resize);
        assert!(!state.placeholder_visible());
        assert_eq!(state.scale_factor(), 1.0);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (40, 25));
        assert!(state
            .displayed()
            .unwrap()
            .pixels()
            .all(|p| p[3] == state.opacity().value()));
    }

    #[test]
    fn same_size_image_still_repaints() {
        let mut state = OverlayState::new(OverlayConfig::default());
        let before = state.generation();
        assert_eq!(
            state.set_image(image(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE)),
            Effect::Repaint
        );
        assert!(!state.placeholder_visible());
        assert!(state.generation() > before);

        let mut second = image(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE);
        second.path = PathBuf::from("second.png");
        assert_eq!(state.set_image(second), Effect::Repaint);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
    }

    #[test]
    fn reset_policy_returns_to_startup_scale() {
        let mut state = OverlayState::new(OverlayConfig {
            scale: 0.5,
            ..OverlayConfig::default()
        });
        state.set_image(image(100, 60));
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (50, 30));

        left_drag(&mut state);
        state.wheel(10);
        state.release(Button::Left);
        assert!((state.scale_factor() - 1.5).abs() < 1e-4);

        state.set_image(image(10, 10));
        assert_eq!(state.scale_factor(), 0.5);
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (5, 5));
    }

    #[test]
    fn keep_policy_applies_scale_to_new_image() {
        let mut state = OverlayState::new(OverlayConfig {
            scale: 2.0,
            scale_policy: ScalePolicy::Keep,
            ..OverlayConfig::default()
        });
        state.set_image(image(30, 10));
        let geo = state.geometry();
        assert_eq!((geo.width, geo.height), (60, 20));
    }

    #[test]
    fn finishing_resize_asks_for_repaint() {
        let mut state = overlay_with_image(200, 100);
        state.press(Button::Left, Point::new(199.0, 99.0), Point::new(0.0, 0.0));
        assert_eq!(state.release(Button::Left), Effect::Repaint);
        left_drag(&mut state);
        assert_eq!(state.release(Button::Left), Effect::None);
    }
}
