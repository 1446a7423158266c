//! Format detection seam.
//!
//! Detectors look at the original uploaded bytes (never the gzip wrapper the
//! storage layer may add) and return a format label, or `None` when the file
//! is not an importable case.

use crate::archive;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

#[async_trait]
pub trait FormatDetector: Send + Sync {
    async fn detect(&self, filename: &str, content: &Path) -> Result<Option<String>>;
}

/// Detects the format from the extension of the logical file name
#[derive(Debug, Clone)]
pub struct ExtensionFormatDetector {
    labels: HashMap<String, String>,
}

impl Default for ExtensionFormatDetector {
    fn default() -> Self {
        Self::new([
            ("xiidm", "XIIDM"),
            ("iidm", "XIIDM"),
            ("xml", "XIIDM"),
            ("jiidm", "JIIDM"),
            ("json", "JIIDM"),
            ("biidm", "BIIDM"),
            ("uct", "UCTE"),
            ("dgs", "DGS"),
            ("raw", "PSS/E"),
            ("rawx", "PSS/E"),
            ("m", "MATPOWER"),
            ("mat", "MATPOWER"),
            ("txt", "IEEE-CDF"),
            ("zip", "CGMES"),
            ("tar", "CGMES"),
        ])
    }
}

impl ExtensionFormatDetector {
    pub fn new<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            labels: labels
                .into_iter()
                .map(|(ext, label)| (ext.to_ascii_lowercase(), label.to_string()))
                .collect(),
        }
    }

    /// Label for a filename, looked up on the extension left once any
    /// compression suffix is removed
    pub fn label_for(&self, filename: &str) -> Option<&str> {
        let logical = archive::logical_name(filename, archive::classify(filename));
        let (_, ext) = logical.rsplit_once('.')?;
        self.labels.get(&ext.to_ascii_lowercase()).map(String::as_str)
    }
}

#[async_trait]
impl FormatDetector for ExtensionFormatDetector {
    async fn detect(&self, filename: &str, content: &Path) -> Result<Option<String>> {
        let metadata = tokio::fs::metadata(content)
            .await
            .with_context(|| format!("Failed to inspect staged file {:?}", content))?;
        if metadata.len() == 0 {
            return Ok(None);
        }
        Ok(self.label_for(filename).map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_ignore_compression_suffix() {
        let detector = ExtensionFormatDetector::default();
        assert_eq!(detector.label_for("grid.xiidm"), Some("XIIDM"));
        assert_eq!(detector.label_for("grid.UCT.bz2"), Some("UCTE"));
        assert_eq!(detector.label_for("bundle.zip"), Some("CGMES"));
        assert_eq!(detector.label_for("notes.docx"), None);
        assert_eq!(detector.label_for("archive.gz"), None);
    }

    #[tokio::test]
    async fn test_empty_content_is_not_importable() {
        let detector = ExtensionFormatDetector::default();
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(detector.detect("grid.xiidm", file.path()).await.unwrap(), None);

        std::fs::write(file.path(), b"<network/>").unwrap();
        assert_eq!(
            detector.detect("grid.xiidm", file.path()).await.unwrap(),
            Some("XIIDM".to_string())
        );
    }
}
