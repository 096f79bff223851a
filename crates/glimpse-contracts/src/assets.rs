use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Prefix carried by the analysis text of every image whose transport failed.
pub const ERROR_MARKER: &str = "Error processing image: ";

/// Image bytes plus the name shown in the report.
///
/// Bytes are shared, so cloning an asset into its result never copies pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Arc<[u8]>,
    display_name: String,
}

impl ImageAsset {
    pub fn new(bytes: impl Into<Arc<[u8]>>, display_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            display_name: display_name.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("display_name", &self.display_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Succeeded,
    Failed { reason: String },
}

/// Final analysis of one input image. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    image: ImageAsset,
    analysis_text: String,
    status: AnalysisStatus,
}

impl AnalysisResult {
    pub fn succeeded(image: ImageAsset, analysis_text: String) -> Self {
        Self {
            image,
            analysis_text,
            status: AnalysisStatus::Succeeded,
        }
    }

    /// Builds a failed result whose text is the reason behind [`ERROR_MARKER`].
    pub fn failed(image: ImageAsset, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            image,
            analysis_text: format!("{ERROR_MARKER}{reason}"),
            status: AnalysisStatus::Failed { reason },
        }
    }

    pub fn image(&self) -> &ImageAsset {
        &self.image
    }

    pub fn display_name(&self) -> &str {
        self.image.display_name()
    }

    pub fn analysis_text(&self) -> &str {
        &self.analysis_text
    }

    pub fn status(&self) -> &AnalysisStatus {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, AnalysisStatus::Succeeded)
    }
}
