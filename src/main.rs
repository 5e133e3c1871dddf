// easy-overlay - a translucent always-on-top image overlay for Wayland
// Drop an image onto the window, drag it around, scale it and fade it with the mouse

mod app;
mod cli;
mod drop;
mod image_loader;
mod opacity;
mod render;
mod wayland;
mod wgpu_renderer;

use anyhow::{Context, Result};
use app::{OverlayConfig, OverlayState};
use log::info;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::parse_args();

    info!(
        "Starting easy-overlay (opacity: {}, scale: {}, GPU: {})",
        args.opacity,
        args.scale,
        !args.cpu
    );

    let mut overlay = OverlayState::new(OverlayConfig {
        opacity: args.opacity(),
        scale: args.scale,
        scale_policy: args.scale_policy(),
        ..OverlayConfig::default()
    });

    // A startup image goes through the same checks as a dropped one, but failing is fatal here
    if let Some(path) = &args.image_path {
        let image = image_loader::load_image(path)
            .with_context(|| format!("Failed to load image: {}", path.display()))?;
        info!("Image loaded: {}x{} pixels", image.width, image.height);
        overlay.set_image(image);
    }

    let position = match (args.pos_x, args.pos_y) {
        (Some(x), Some(y)) => Some((x, y)),
        (None, None) => None,
        (x, y) => Some((x.unwrap_or(0), y.unwrap_or(0))),
    };

    wayland::run(overlay, position, !args.cpu)
}
