use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assets::{AnalysisResult, AnalysisStatus};
use crate::events::now_utc_iso;

/// Per-image line of the batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub display_name: String,
    #[serde(flatten)]
    pub status: AnalysisStatus,
}

impl From<&AnalysisResult> for ImageOutcome {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            display_name: result.display_name().to_string(),
            status: result.status().clone(),
        }
    }
}

impl ImageOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, AnalysisStatus::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_images: u64,
    pub failed_images: u64,
    pub report_path: Option<String>,
    pub outcomes: Vec<ImageOutcome>,
}

impl BatchSummary {
    pub fn new(
        batch_id: impl Into<String>,
        started_at: impl Into<String>,
        outcomes: Vec<ImageOutcome>,
    ) -> Self {
        let failed_images = outcomes.iter().filter(|outcome| !outcome.succeeded()).count();
        Self {
            batch_id: batch_id.into(),
            started_at: started_at.into(),
            finished_at: now_utc_iso(),
            total_images: outcomes.len() as u64,
            failed_images: failed_images as u64,
            report_path: None,
            outcomes,
        }
    }
}

pub fn write_summary(path: &Path, summary: &BatchSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}
