// Photo uploads: validated by extension, stored under a random name

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Extension including the dot, as given by the original file name
fn dotted_extension(original_name: &str) -> Result<String> {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("'{}' has no file extension", original_name)))?;

    if ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        Ok(format!(".{}", ext))
    } else {
        Err(Error::InvalidInput(format!(
            "unsupported image type '.{}' (allowed: png, jpg, jpeg)",
            ext
        )))
    }
}

/// Write uploaded bytes into `upload_dir` under `<uuid hex><ext>`
pub fn save_image(upload_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let ext = dotted_extension(original_name)?;
    fs::create_dir_all(upload_dir)?;

    let file_name = format!("{}{}", uuid::Uuid::new_v4().simple(), ext);
    let path = upload_dir.join(file_name);
    fs::write(&path, bytes)?;

    info!(original = original_name, stored = %path.display(), "image stored");
    Ok(path)
}

/// Copy an image from disk into the upload directory
pub fn import_image_file(upload_dir: &Path, source: &Path) -> Result<PathBuf> {
    let original_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("invalid image path {}", source.display())))?;

    // Check the extension before touching the file system
    dotted_extension(original_name)?;
    let bytes = fs::read(source)?;
    save_image(upload_dir, original_name, &bytes)
}
