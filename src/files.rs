//! Filesystem helpers around the in-memory core.
//!
//! The conversion pipeline only ever sees bytes. These helpers sit at the
//! edge: they read files into [`ImageAsset`]s and write converted assets
//! back out. Every failure here is fatal for the file involved and reported
//! as [`ImgConvError`].

use crate::error::ImgConvError;
use crate::output::ImageAsset;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read `path` into an asset, sniffing the encoding.
///
/// The asset is named after the file name (no directories), which is what
/// output names are later derived from.
pub async fn load_asset(path: impl AsRef<Path>) -> Result<ImageAsset, ImgConvError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Loaded '{}' ({} bytes)", path.display(), bytes.len());
    ImageAsset::sniff(bytes, name)
}

/// Read several files, stopping at the first one that cannot be loaded.
pub async fn load_assets<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ImageAsset>, ImgConvError> {
    let mut assets = Vec::with_capacity(paths.len());
    for path in paths {
        assets.push(load_asset(path).await?);
    }
    Ok(assets)
}

/// Write `asset` as `dir/file_name`, creating `dir` if needed.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
/// Only the final component of `file_name` is used, so a crafted name
/// cannot escape `dir`.
///
/// An existing file at the destination is only replaced when `overwrite`
/// is true; otherwise the call fails with [`ImgConvError::OutputExists`]
/// and the existing file is left untouched.
pub async fn save_asset(
    asset: &ImageAsset,
    file_name: &str,
    dir: impl AsRef<Path>,
    overwrite: bool,
) -> Result<PathBuf, ImgConvError> {
    let dir = dir.as_ref();
    let file_name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("converted.{}", asset.encoding().extension()));
    let path = dir.join(&file_name);

    let write_err = |source: io::Error| ImgConvError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_err)?;

    // Claim the name first; the rename below then only replaces our own
    // empty placeholder.
    if !overwrite {
        let claimed = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match claimed {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ImgConvError::OutputExists { path: path.clone() });
            }
            Err(e) => return Err(write_err(e)),
        }
    }

    let tmp_path = dir.join(format!(".{file_name}.tmp"));
    let written = match tokio::fs::write(&tmp_path, asset.bytes()).await {
        Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        if !overwrite {
            let _ = tokio::fs::remove_file(&path).await;
        }
        return Err(write_err(e));
    }

    debug!("Wrote '{}' ({} bytes)", path.display(), asset.len());
    Ok(path)
}

fn read_error(path: &Path, e: io::Error) -> ImgConvError {
    let path = path.to_path_buf();
    match e.kind() {
        io::ErrorKind::NotFound => ImgConvError::FileNotFound { path },
        io::ErrorKind::PermissionDenied => ImgConvError::PermissionDenied { path },
        _ => ImgConvError::ReadFailed { path, source: e },
    }
}
