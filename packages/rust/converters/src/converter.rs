//! The format converter trait and its input/output types.

use std::path::Path;

use async_trait::async_trait;

use contentplan_shared::{ContentPlanError, DocumentMetadata, Result};

/// An uploaded or local file to convert.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ContentPlanError::io(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }

    /// Lowercased extension without the dot, or `""`.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Markdown plus metadata produced by a converter.
#[derive(Debug, Clone, Default)]
pub struct Converted {
    pub markdown: String,
    pub metadata: DocumentMetadata,
}

/// A capability-matched converter for one or more file extensions.
///
/// The registry filters converters by extension, orders them by
/// [`weight`](FormatConverter::weight) (lower first) and picks the first whose
/// [`requirements_met`](FormatConverter::requirements_met) returns `true`.
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Stable identifier recorded as `processor_id`.
    fn id(&self) -> &str;

    /// Lowercased extensions without the dot.
    fn extensions(&self) -> &[String];

    fn weight(&self) -> i32;

    /// Whether the converter can run in this environment (binaries present, ...).
    fn requirements_met(&self) -> bool {
        true
    }

    /// Convert the whole file. Never truncates.
    async fn process(&self, file: &SourceFile) -> Result<Converted>;

    /// Metadata only, without producing Markdown.
    async fn extract_metadata(&self, file: &SourceFile) -> Result<DocumentMetadata> {
        Ok(self.process(file).await?.metadata)
    }

    fn supports(&self, extension: &str) -> bool {
        self.extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }
}

/// Owned, lowercased extension list from string literals.
pub(crate) fn extension_list(exts: &[&str]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}
