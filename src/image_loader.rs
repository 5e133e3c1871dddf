// Image loading module
// Decides which dropped files are accepted and decodes them

use image::{ImageFormat, RgbaImage};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions a dropped file may carry to be loaded
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("unsupported file type: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Loaded image data ready for display
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Source pixels, never modified after load
    pub pixels: RgbaImage,
    /// Where the image came from
    pub path: PathBuf,
}

/// Map a file extension onto one of the accepted image formats
pub fn format_from_extension(ext: &str) -> Option<ImageFormat> {
    let ext = ext.to_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    ImageFormat::from_extension(&ext)
}

/// Check a dropped path against the extension allow-list and the filesystem
pub fn accept_dropped_path(path: &Path) -> Result<ImageFormat, LoadError> {
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(format_from_extension)
        .ok_or_else(|| LoadError::Unsupported(path.to_path_buf()))?;

    // metadata() follows symlinks, so a link to a regular file is accepted
    match path.metadata() {
        Ok(meta) if meta.is_file() => Ok(format),
        _ => Err(LoadError::NotAFile(path.to_path_buf())),
    }
}

/// Validate and decode an image file
pub fn load_image(path: &Path) -> Result<ImageData, LoadError> {
    let ext_format = accept_dropped_path(path)?;

    let data = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    // Trust the content over the extension; a .png holding JPEG data still loads
    let format = image::guess_format(&data).unwrap_or(ext_format);
    let img = image::load_from_memory_with_format(&data, format).map_err(|source| {
        LoadError::Decode {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let pixels = img.to_rgba8();
    let (width, height) = pixels.dimensions();
    debug!("Decoded {} ({}x{})", path.display(), width, height);

    Ok(ImageData {
        width,
        height,
        pixels,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn extension_allow_list() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(format_from_extension(ext).is_some(), "{ext}");
            assert!(format_from_extension(&ext.to_uppercase()).is_some(), "{ext}");
        }
        assert!(format_from_extension("webp").is_none());
        assert!(format_from_extension("tiff").is_none());
        assert!(format_from_extension("txt").is_none());
        assert!(format_from_extension("").is_none());
    }

    #[test]
    fn rejects_wrong_extension_even_if_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();
        assert!(matches!(accept_dropped_path(&path), Err(LoadError::Unsupported(_))));
    }

    #[test]
    fn rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.png");
        assert!(matches!(accept_dropped_path(&missing), Err(LoadError::NotAFile(_))));

        let folder = dir.path().join("folder.jpg");
        fs::create_dir(&folder).unwrap();
        assert!(matches!(accept_dropped_path(&folder), Err(LoadError::NotAFile(_))));
    }

    #[test]
    fn loads_png_with_uppercase_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.PNG");
        let img = RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 255]));
        img.save_with_format(&path, ImageFormat::Png).unwrap();

        let data = load_image(&path).unwrap();
        assert_eq!((data.width, data.height), (4, 3));
        assert_eq!(data.pixels.get_pixel(2, 1), &Rgba([1, 2, 3, 255]));
        assert_eq!(data.path, path);
    }

    #[test]
    fn content_wins_over_mislabelled_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jpg");
        let mut img = RgbaImage::from_pixel(5, 2, Rgba([10, 20, 30, 255]));
        img.put_pixel(4, 1, Rgba([0, 0, 0, 0]));
        img.save_with_format(&path, ImageFormat::Png).unwrap();

        let data = load_image(&path).unwrap();
        assert_eq!((data.width, data.height), (5, 2));
        assert_eq!(data.pixels.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(data.pixels.get_pixel(4, 1), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn garbage_content_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(load_image(&path), Err(LoadError::Decode { .. })));
    }
}
