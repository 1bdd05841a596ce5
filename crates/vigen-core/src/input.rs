//! Input image validation.
//!
//! Runs before any model call. An image that fails here is reported
//! immediately and never retried.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// File extensions accepted as image input.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Largest image sent inline to a provider.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Image container formats recognised by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Upper-case format name as recorded on generated images.
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Webp => "WEBP",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    /// Detect the format from the leading bytes of a file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }
}

/// Outcome of validating one input image.
#[derive(Debug, Clone, Default)]
pub struct InputCheck {
    pub format: Option<ImageFormat>,
    pub size_bytes: u64,
    pub issues: Vec<String>,
}

impl InputCheck {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues joined for an error message.
    pub fn summary(&self) -> String {
        self.issues.join("; ")
    }
}

/// Validate that `path` is a readable, supported, reasonably sized image.
pub fn validate_image(path: &Path) -> InputCheck {
    let mut check = InputCheck::default();

    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => {
            check.issues.push(format!("Image not found: {}", path.display()));
            return check;
        }
    };

    if !metadata.is_file() {
        check.issues.push(format!("Not a file: {}", path.display()));
        return check;
    }

    if !has_supported_extension(path) {
        check.issues.push(format!(
            "Unsupported extension (expected one of {}): {}",
            SUPPORTED_EXTENSIONS.join(", "),
            path.display()
        ));
    }

    check.size_bytes = metadata.len();
    if check.size_bytes == 0 {
        check.issues.push("Image file is empty".to_string());
        return check;
    }
    if check.size_bytes > MAX_IMAGE_BYTES {
        check.issues.push(format!(
            "Image is {} bytes, limit is {} bytes",
            check.size_bytes, MAX_IMAGE_BYTES
        ));
    }

    match read_header(path) {
        Ok(header) => match ImageFormat::sniff(&header) {
            Some(format) => check.format = Some(format),
            None => check.issues.push("File content is not a PNG, JPEG, GIF or WebP image".to_string()),
        },
        Err(e) => check.issues.push(format!("Failed to read image: {}", e)),
    }

    check
}

/// Whether the path's extension is one of [`SUPPORTED_EXTENSIONS`].
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_supported_extension(p))
        .collect();
    images.sort();
    Ok(images)
}

fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(16);
    File::open(path)?.take(16).read_to_end(&mut header)?;
    Ok(header)
}
