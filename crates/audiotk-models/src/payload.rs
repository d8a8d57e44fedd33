//! Uploaded payloads.

use std::fmt;
use std::path::Path;

/// Raw uploaded bytes plus the metadata the client declared for them.
///
/// Nothing here is trusted until the admission validator has inspected it.
#[derive(Clone, Default)]
pub struct UploadedPayload {
    data: Vec<u8>,
    filename: String,
    content_type: Option<String>,
}

impl UploadedPayload {
    pub fn new(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            data,
            filename: filename.into(),
            content_type: None,
        }
    }

    /// Attach the declared content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Measured byte length of the payload.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lower-cased extension of the declared filename, if any.
    pub fn declared_extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// Declared filename without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }
}

// Payloads can be large; never dump the bytes into logs.
impl fmt::Debug for UploadedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedPayload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}
