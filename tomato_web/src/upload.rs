use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const MAX_NAME_ATTEMPTS: u32 = 100;
const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No file selected")]
    NoFile,
    #[error("Invalid file type. Please upload JPG, JPEG, or PNG files.")]
    InvalidType,
    #[error("Error saving file: {0}")]
    Io(#[from] std::io::Error),
}

pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduces a client-supplied name to a safe single path component.
pub fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Checks the declared name of an upload and returns the name to store it under.
pub fn validate_filename(filename: Option<&str>) -> Result<String, UploadError> {
    let filename = filename.filter(|name| !name.is_empty()).ok_or(UploadError::NoFile)?;
    if !allowed_file(filename) {
        return Err(UploadError::InvalidType);
    }
    let secured = secure_filename(filename);
    if secured.is_empty() || !allowed_file(&secured) {
        return Err(UploadError::NoFile);
    }
    Ok(secured)
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes an accepted upload as `<unix-millis>_<name>` and returns the stored name.
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<String, UploadError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.save_at(timestamp, filename, data).await
    }

    /// Never overwrites: a name already taken gets a `-<n>` after the timestamp.
    async fn save_at(
        &self,
        timestamp: u128,
        filename: &str,
        data: &[u8],
    ) -> Result<String, UploadError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let stored = stored_name(timestamp, attempt, filename);
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&stored))
                .await;
            match file {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    tracing::debug!("Stored upload as {}", stored);
                    return Ok(stored);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!("{} already taken, trying another name", stored);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free name for {} at {}", filename, timestamp),
        )
        .into())
    }
}

fn stored_name(timestamp: u128, attempt: u32, filename: &str) -> String {
    if attempt == 0 {
        format!("{}_{}", timestamp, filename)
    } else {
        format!("{}-{}_{}", timestamp, attempt, filename)
    }
}
