//! Multipart form handling for media uploads.
//!
//! File parts are streamed into temporary files under the staging directory;
//! the temporary files are removed when the [`StagedFile`] is dropped, whether
//! or not the upload to the asset store succeeded.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use axum::extract::Multipart;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use super::response::{ApiError, ApiResult};

#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    content_type: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rejects the file unless its declared type is `{kind}/*`.
    pub fn require_kind(&self, kind: &str, field: &str) -> ApiResult<()> {
        let top_level = self.content_type.split('/').next().unwrap_or_default();
        if top_level.eq_ignore_ascii_case(kind) {
            Ok(())
        } else {
            Err(ApiError::bad_request(format!(
                "{field} must have a {kind}/* content type, got {}",
                self.content_type
            )))
        }
    }
}

#[derive(Debug, Default)]
pub struct UploadForm {
    texts: HashMap<String, String>,
    files: HashMap<String, StagedFile>,
}

impl UploadForm {
    /// Drains `multipart`. Parts named in `file_fields` are staged to disk,
    /// everything else is read as text. Empty file parts count as absent.
    pub async fn read(
        mut multipart: Multipart,
        staging_dir: &Path,
        file_fields: &[&str],
    ) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if !file_fields.contains(&name.as_str()) {
                let value = field.text().await?;
                form.texts.insert(name, value);
                continue;
            }

            let content_type = field
                .content_type()
                .map(str::to_string)
                .or_else(|| {
                    field
                        .file_name()
                        .and_then(|file| mime_guess::from_path(file).first_raw())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let suffix = staged_suffix(field.file_name(), &content_type);

            let staged = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&suffix)
                .tempfile_in(staging_dir)
                .with_context(|| format!("staging upload in {}", staging_dir.display()))?;
            let (file, path) = staged.into_parts();
            let mut file = tokio::fs::File::from_std(file);
            let mut size = 0u64;
            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk)
                    .await
                    .context("writing staged upload")?;
                size += chunk.len() as u64;
            }
            file.flush().await.context("flushing staged upload")?;

            if size == 0 {
                continue;
            }
            tracing::debug!(field = %name, size, content_type = %content_type, "staged upload");
            form.files.insert(
                name,
                StagedFile { path, content_type },
            );
        }
        Ok(form)
    }

    pub fn take_text(&mut self, name: &str) -> Option<String> {
        self.texts.remove(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

/// Keeps a short, safe extension on the staged file so the stored asset gets
/// a meaningful one.
fn staged_suffix(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|name| PathBuf::from(name).extension().map(|ext| ext.to_string_lossy().into_owned()));
    let from_type = || {
        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    };
    from_name
        .filter(|ext| is_plain_extension(ext))
        .or_else(from_type)
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|ch| ch.is_ascii_alphanumeric())
}
