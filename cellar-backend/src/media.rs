use crate::helpers;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Subdirectory of the media root bottle photos are written to
pub const BOTTLE_DIR: &str = "bottles";

/// Uploaded files on local disk, served back under a URL prefix.
#[derive(Debug, Clone)]
pub struct MediaStore {
  root: PathBuf,
  url_prefix: String,
}

impl MediaStore {
  pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
    Self {
      root: root.into(),
      url_prefix: url_prefix.into(),
    }
  }

  /// Write a bottle photo and return its path relative to the media root.
  ///
  /// Taken names get a random suffix on the stem rather than overwriting.
  pub async fn save_bottle_image(&self, file_name: &str, bytes: &[u8]) -> std::io::Result<String> {
    let dir = self.root.join(BOTTLE_DIR);
    fs::create_dir_all(&dir).await?;

    let (stem, extension) = sanitize_file_name(file_name);
    let mut candidate = format!("{stem}{extension}");
    loop {
      let opened = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dir.join(&candidate))
        .await;
      match opened {
        Ok(file) => {
          fill_new_file(&dir.join(&candidate), file, bytes).await?;
          break;
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
          candidate = format!("{stem}_{}{extension}", helpers::generate_file_suffix());
        }
        Err(e) => return Err(e),
      }
    }

    let relative = format!("{BOTTLE_DIR}/{candidate}");
    tracing::debug!(path = %relative, size = bytes.len(), "stored media file");
    Ok(relative)
  }

  /// Remove a stored file. Failures are logged and otherwise ignored.
  pub async fn delete(&self, relative: &str) {
    let Some(path) = self.resolve(relative) else {
      tracing::warn!(path = %relative, "refusing to delete media outside the media root");
      return;
    };
    match fs::remove_file(&path).await {
      Ok(()) => tracing::debug!(path = %relative, "deleted media file"),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => tracing::warn!(path = %relative, error = %e, "failed to delete media file"),
    }
  }

  /// Public URL for a stored file
  pub fn url(&self, relative: &str) -> String {
    format!("{}{}", self.url_prefix, relative.trim_start_matches('/'))
  }

  fn resolve(&self, relative: &str) -> Option<PathBuf> {
    let path = Path::new(relative);
    let plain = path
      .components()
      .all(|c| matches!(c, std::path::Component::Normal(_)));
    plain.then(|| self.root.join(path))
  }
}

/// Write `bytes` into a file just created at `path`. A failed write removes
/// the partial file.
async fn fill_new_file<W>(path: &Path, mut file: W, bytes: &[u8]) -> std::io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  let written = async {
    file.write_all(bytes).await?;
    file.flush().await
  }
  .await;

  if let Err(e) = written {
    drop(file);
    if let Err(remove_err) = fs::remove_file(path).await {
      tracing::warn!(
        path = %path.display(),
        error = %remove_err,
        "failed to remove partial media file"
      );
    }
    return Err(e);
  }
  Ok(())
}

/// Split a client file name into a safe stem and lowercase extension
/// (with its dot). Anything but ASCII letters, digits, `-` and `_` becomes `_`.
fn sanitize_file_name(file_name: &str) -> (String, String) {
  // Browsers on Windows may send the full path
  let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
  let path = Path::new(base);

  let stem: String = path
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or_default()
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
        c
      } else {
        '_'
      }
    })
    .take(100)
    .collect();
  let stem = if stem.trim_matches('_').is_empty() {
    "image".to_string()
  } else {
    stem
  };

  let extension = path
    .extension()
    .and_then(|s| s.to_str())
    .filter(|s| s.chars().all(|c| c.is_ascii_alphanumeric()))
    .map(|s| format!(".{}", s.to_lowercase()))
    .unwrap_or_default();

  (stem, extension)
}
