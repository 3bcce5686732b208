/// Bytes of an uploaded image, or why they could not be read.
#[derive(Debug, Clone)]
pub enum ImageContent {
    Loaded(Vec<u8>),
    Unreadable(String),
}

/// One image submitted for recognition.
#[derive(Debug, Clone)]
pub struct ImageTask {
    pub filename: String,
    /// Size as declared by the upload; checked before the content is touched.
    pub size_bytes: u64,
    pub content: ImageContent,
}

impl ImageTask {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            size_bytes: content.len() as u64,
            content: ImageContent::Loaded(content),
        }
    }

    pub fn unreadable(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            size_bytes: 0,
            content: ImageContent::Unreadable(reason.into()),
        }
    }

    /// Lowercased extension without the leading dot, empty when absent.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default()
    }
}
