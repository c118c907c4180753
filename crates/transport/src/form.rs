//! Multipart form bodies
//!
//! `reqwest::multipart::Form` is consumed on send and cannot be cloned, but the
//! pipeline rebuilds a request for every attempt (retries, the retry after a
//! refresh). `MultipartForm` keeps the parts as plain data and produces a fresh
//! reqwest form per attempt.

use reqwest::multipart::{Form, Part};

/// One named part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Ordered multipart form, rebuilt into a reqwest form for each attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<(String, FormPart)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    /// Add a file part. Without a content type the server sees
    /// `application/octet-stream`.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<String>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                file_name: file_name.into(),
                content_type,
                bytes: bytes.into(),
            },
        ));
        self
    }

    pub fn parts(&self) -> &[(String, FormPart)] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Fails only on a malformed content type.
    pub(crate) fn to_reqwest(&self) -> reqwest::Result<Form> {
        let mut form = Form::new();
        for (name, part) in &self.parts {
            form = match part {
                FormPart::Text(value) => form.text(name.clone(), value.clone()),
                FormPart::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(content_type) = content_type {
                        file = file.mime_str(content_type)?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}
