use std::collections::HashMap;

use tracing::warn;

/// MIME type reported when no mapping matches a file name.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// File extension to MIME type table.
///
/// An explicit value handed to each [`Database`](crate::Database) at
/// construction; there is no process-wide singleton. The standard table
/// covers the types the platform ships by default.
#[derive(Clone, Debug)]
pub struct ContentTypeMap {
    mappings: HashMap<String, String>,
}

impl ContentTypeMap {
    /// An empty table: every lookup falls back to
    /// [`FALLBACK_CONTENT_TYPE`].
    pub fn empty() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    /// The standard platform table.
    pub fn standard() -> Self {
        let mut map = Self::empty();
        for (ext, mime) in [
            ("bin", "application/octet-stream"),
            ("css", "text/css"),
            ("csv", "text/csv"),
            ("gif", "image/gif"),
            ("htc", "text/x-component"),
            ("html", "text/html"),
            ("ico", "image/x-icon"),
            ("jpeg", "image/jpeg"),
            ("jpg", "image/jpeg"),
            ("js", "text/javascript"),
            ("less", "text/x-lesscss"),
            ("pdf", "application/pdf"),
            ("png", "image/png"),
            ("txt", "text/plain"),
            ("xml", "text/xml"),
        ] {
            map.insert(ext, mime);
        }
        map
    }

    /// Add or replace a mapping.
    pub fn insert(&mut self, extension: impl Into<String>, mime: impl Into<String>) {
        self.mappings.insert(extension.into(), mime.into());
    }

    /// The MIME type for a file name, determined by its final extension.
    pub fn content_type_for(&self, file_name: &str) -> &str {
        if let Some(dot) = file_name.rfind('.') {
            if dot > 0 {
                if let Some(mime) = self.mappings.get(&file_name[dot + 1..]) {
                    return mime;
                }
            }
        }
        warn!(file_name, "no MIME type mapping; using fallback");
        FALLBACK_CONTENT_TYPE
    }
}

impl Default for ContentTypeMap {
    fn default() -> Self {
        Self::standard()
    }
}
