//! Multipart form collection
//!
//! Reads a whole `multipart/form-data` body into text fields and file parts
//! before any handler logic runs, so validation can reject a request before
//! anything is written.

use axum::body::Bytes;
use axum::extract::Multipart;
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};

/// One uploaded file part
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    /// MIME type from the part header, or guessed from the file name
    pub fn mime_type(&self) -> String {
        match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
            _ => crate::docparse::guess_mime_type(&self.file_name).to_string(),
        }
    }
}

/// Collected multipart body
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
}

impl UploadForm {
    /// Drain `multipart` completely
    ///
    /// A file part with an empty file name and no content (what browsers
    /// send for an untouched file input) is dropped.
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await?;
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        data,
                    });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Text field, trimmed; blank counts as absent
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Raw text field (not trimmed); absent → empty
    pub fn text_or_empty(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Required integer field
    pub fn required_id(&self, name: &str) -> ApiResult<i64> {
        let raw = self
            .text(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing required field '{}'", name)))?;
        raw.parse().map_err(|_| {
            ApiError::BadRequest(format!(
                "Field '{}' must be an integer, got '{}'",
                name, raw
            ))
        })
    }

    /// First file uploaded under `field`
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }
}
