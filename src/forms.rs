//! Multipart form decoding shared by the catalog and site endpoints.

use std::collections::HashMap;

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
};
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    media::{ext_from_mime, Upload},
};

/// Text fields and image files of one multipart body. File parts that carry
/// no bytes (a file input left empty) are dropped.
#[derive(Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl Form {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_file(mut self, name: &str, upload: Upload) -> Self {
        self.files.insert(name.to_string(), upload);
        self
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation("File too large")
    } else {
        AppError::validation(format!("Invalid form data: {}", e.body_text()))
    }
}

/// Reads the whole body. Any part with a filename or a content type is
/// treated as a file and must be an image.
pub async fn read_form(mut mp: Multipart) -> AppResult<Form> {
    let mut form = Form::default();
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let is_file = field.file_name().is_some() || field.content_type().is_some();
        if !is_file {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_ascii_lowercase();
        let body = field.bytes().await.map_err(multipart_error)?;
        if body.is_empty() {
            continue;
        }
        if ext_from_mime(&content_type).is_none() {
            return Err(AppError::validation("Only image files are allowed"));
        }
        debug!(field = %name, bytes = body.len(), %content_type, "received upload");
        form.files.insert(name, Upload { body, content_type });
    }
    Ok(form)
}
