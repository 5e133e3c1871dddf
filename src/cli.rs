// Command line interface module
// Startup options; everything is optional and the overlay works without any of them

use crate::app::{ScalePolicy, MAX_SCALE, MIN_SCALE};
use crate::opacity::{Opacity, DEFAULT_OPACITY, MAX_OPACITY, MIN_OPACITY};
use clap::Parser;
use std::path::PathBuf;

/// easy-overlay - a translucent always-on-top image overlay for Wayland
#[derive(Parser, Debug)]
#[command(name = "easy-overlay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image to show at startup (otherwise drop one onto the window)
    #[arg(value_name = "IMAGE")]
    pub image_path: Option<PathBuf>,

    /// Alpha given to every visible pixel (10 - 255)
    #[arg(short, long, default_value_t = DEFAULT_OPACITY, value_parser = parse_opacity)]
    pub opacity: u8,

    /// Scale factor applied to the image's native size (0.2 - 3.0)
    #[arg(short, long, default_value_t = 1.0, value_parser = parse_scale)]
    pub scale: f32,

    /// Initial X position of the window
    #[arg(short = 'x', long, allow_negative_numbers = true)]
    pub pos_x: Option<i32>,

    /// Initial Y position of the window
    #[arg(short = 'y', long, allow_negative_numbers = true)]
    pub pos_y: Option<i32>,

    /// Keep the current scale factor when a new image is dropped
    #[arg(long)]
    pub keep_scale: bool,

    /// Disable GPU rendering and use CPU rendering only
    #[arg(long)]
    pub cpu: bool,
}

impl Args {
    pub fn opacity(&self) -> Opacity {
        Opacity::new(self.opacity as i32)
    }

    pub fn scale_policy(&self) -> ScalePolicy {
        if self.keep_scale {
            ScalePolicy::Keep
        } else {
            ScalePolicy::Reset
        }
    }
}

/// Parse opacity value and ensure it's within valid range
fn parse_opacity(s: &str) -> Result<u8, String> {
    let opacity: u8 = s.parse().map_err(|_| "Invalid opacity value")?;
    if !(MIN_OPACITY..=MAX_OPACITY).contains(&opacity) {
        return Err(format!("Opacity must be between {MIN_OPACITY} and {MAX_OPACITY}"));
    }
    Ok(opacity)
}

/// Parse scale value and ensure it's within valid range
fn parse_scale(s: &str) -> Result<f32, String> {
    let scale: f32 = s.parse().map_err(|_| "Invalid scale value")?;
    if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
        return Err(format!("Scale must be between {MIN_SCALE} and {MAX_SCALE}"));
    }
    Ok(scale)
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["easy-overlay"]).unwrap();
        assert!(args.image_path.is_none());
        assert_eq!(args.opacity, DEFAULT_OPACITY);
        assert_eq!(args.scale, 1.0);
        assert_eq!(args.scale_policy(), ScalePolicy::Reset);
        assert!(!args.cpu);
        assert_eq!((args.pos_x, args.pos_y), (None, None));
    }

    #[test]
    fn all_options() {
        let args = Args::try_parse_from([
            "easy-overlay",
            "cat.png",
            "--opacity",
            "200",
            "-s",
            "0.5",
            "-x",
            "-40",
            "-y",
            "12",
            "--keep-scale",
            "--cpu",
        ])
        .unwrap();
        assert_eq!(args.image_path, Some(PathBuf::from("cat.png")));
        assert_eq!(args.opacity().value(), 200);
        assert_eq!(args.scale, 0.5);
        assert_eq!((args.pos_x, args.pos_y), (Some(-40), Some(12)));
        assert_eq!(args.scale_policy(), ScalePolicy::Keep);
        assert!(args.cpu);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Args::try_parse_from(["easy-overlay", "-o", "5"]).is_err());
        assert!(Args::try_parse_from(["easy-overlay", "-o", "256"]).is_err());
        assert!(Args::try_parse_from(["easy-overlay", "-s", "0.1"]).is_err());
        assert!(Args::try_parse_from(["easy-overlay", "-s", "3.5"]).is_err());
        assert!(Args::try_parse_from(["easy-overlay", "-s", "big"]).is_err());
    }
}
