//! Saving merged documents to the local filesystem.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use drivemerge_common::{Error, Result, PDF_MIME_TYPE};

/// Something that can persist a finished document.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Save `bytes` under the suggested `filename`.
    ///
    /// # Postconditions
    /// - Returns the location the document was written to
    ///
    /// # Errors
    /// - `InvalidInput` for an unusable file name
    /// - `Environment` if the host refuses the write
    async fn save(&self, bytes: &[u8], filename: &str) -> Result<PathBuf>;

    /// MIME type of everything this exporter writes.
    fn mime_type(&self) -> &str {
        PDF_MIME_TYPE
    }
}

/// Writes documents into a local directory.
///
/// Data lands in a temporary `.part` file first and is renamed into place,
/// so the target name never holds a truncated document.
pub struct LocalExporter {
    dir: PathBuf,
}

impl LocalExporter {
    /// Create an exporter for the given directory.
    ///
    /// The directory is created on first save if it does not exist.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate a suggested name and give it a `.pdf` extension.
    pub fn target_name(filename: &str) -> Result<String> {
        let name = filename.trim();
        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::InvalidInput(format!(
                "Invalid file name: '{}'",
                filename
            )));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(Error::InvalidInput(
                "File name cannot contain separators".to_string(),
            ));
        }

        let has_pdf_extension = Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if has_pdf_extension {
            Ok(name.to_string())
        } else {
            Ok(format!("{}.pdf", name))
        }
    }
}

#[async_trait]
impl Exporter for LocalExporter {
    async fn save(&self, bytes: &[u8], filename: &str) -> Result<PathBuf> {
        let name = Self::target_name(filename)?;
        let target = self.dir.join(&name);
        let partial = self.dir.join(format!(".{}.{}.part", name, Uuid::new_v4()));

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::Environment(format!("Cannot create {}: {}", self.dir.display(), e))
        })?;

        let written = match fs::write(&partial, bytes).await {
            Ok(()) => fs::rename(&partial, &target).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            let _ = fs::remove_file(&partial).await;
            return Err(Error::Environment(format!(
                "Cannot save {}: {}",
                target.display(),
                e
            )));
        }

        tracing::info!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }
}
