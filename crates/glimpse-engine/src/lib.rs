//! Batch image analysis: stream each image through a vision service, then lay
//! the answers out in a spreadsheet report.

pub mod batch;
pub mod error;
pub mod report;
pub mod thumbnail;
pub mod transport;

use glimpse_contracts::runs::ImageOutcome;
use glimpse_contracts::{AnalysisResult, ImageAsset};

pub use batch::{analyze_image, run_batch, BatchOptions, Progress};
pub use error::{ImageDecodeError, ReportError, Stage, TransportError};
pub use report::{render_report, ReportDocument};
pub use transport::{DifyClient, LineStream, TransportConfig, VisionTransport};

/// Serialized report plus the per-image status it was built from.
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub buffer: Vec<u8>,
    pub outcomes: Vec<ImageOutcome>,
    pub results: Vec<AnalysisResult>,
}

impl ReportOutput {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.succeeded())
            .count()
    }
}

/// The analyze → layout → render pipeline over one transport.
pub struct Pipeline<T> {
    transport: T,
    options: BatchOptions,
}

impl<T: VisionTransport> Pipeline<T> {
    pub fn new(transport: T, options: BatchOptions) -> Self {
        Self { transport, options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn analyze<F>(&self, images: &[ImageAsset], on_progress: F) -> Vec<AnalysisResult>
    where
        F: FnMut(Progress, &AnalysisResult),
    {
        run_batch(&self.transport, images, &self.options, on_progress)
    }

    /// Runs the whole batch. Only report serialization can fail it.
    pub fn run<F>(&self, images: &[ImageAsset], on_progress: F) -> Result<ReportOutput, ReportError>
    where
        F: FnMut(Progress, &AnalysisResult),
    {
        let results = self.analyze(images, on_progress);
        let buffer = render_report(&results)?;
        let outcomes = results.iter().map(ImageOutcome::from).collect();
        Ok(ReportOutput {
            buffer,
            outcomes,
            results,
        })
    }
}
