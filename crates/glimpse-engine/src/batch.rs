use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use glimpse_contracts::stream::{accumulate, Answer, DecoderConfig, FragmentStream};
use glimpse_contracts::{AnalysisResult, ImageAsset};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::VisionTransport;

pub const DEFAULT_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    workers: usize,
    pub decoder: DecoderConfig,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            decoder: DecoderConfig::default(),
        }
    }
}

impl BatchOptions {
    /// Worker count is clamped to `1..=MAX_WORKERS`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    pub fn with_decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Reported on the calling thread after each image finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Input position of the image that just finished.
    pub index: usize,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

/// Uploads one image, decodes its stream, and folds the answer.
///
/// Transport failures become a failed result rather than an error.
pub fn analyze_image<T>(transport: &T, decoder: &DecoderConfig, image: &ImageAsset) -> AnalysisResult
where
    T: VisionTransport + ?Sized,
{
    match fetch_answer(transport, decoder, image) {
        Ok(answer) => {
            debug!(
                image = image.display_name(),
                fragments = answer.fragments,
                chars = answer.text.chars().count(),
                "analysis complete"
            );
            AnalysisResult::succeeded(image.clone(), answer.text)
        }
        Err(err) => {
            warn!(image = image.display_name(), "analysis failed: {err}");
            AnalysisResult::failed(image.clone(), err.to_string())
        }
    }
}

fn fetch_answer<T>(
    transport: &T,
    decoder: &DecoderConfig,
    image: &ImageAsset,
) -> Result<Answer, TransportError>
where
    T: VisionTransport + ?Sized,
{
    let file_id = transport.upload(image)?;
    let lines = transport.analyze(&file_id)?;
    let mut fragments = FragmentStream::new(lines, decoder.clone());
    let answer = accumulate(fragments.by_ref())?;
    if fragments.skipped() > 0 {
        debug!(
            image = image.display_name(),
            skipped = fragments.skipped(),
            "malformed frames skipped"
        );
    }
    Ok(answer)
}

/// Analyzes every image and returns one result per input, in input order.
///
/// With one worker images are processed strictly in sequence. With more, a
/// bounded pool pulls the next unclaimed index and results are slotted back by
/// position, so completion order never leaks into the output.
pub fn run_batch<T, F>(
    transport: &T,
    images: &[ImageAsset],
    options: &BatchOptions,
    mut on_progress: F,
) -> Vec<AnalysisResult>
where
    T: VisionTransport + ?Sized,
    F: FnMut(Progress, &AnalysisResult),
{
    let total = images.len();
    let workers = options.workers().min(total);

    if workers <= 1 {
        let mut results = Vec::with_capacity(total);
        for (index, image) in images.iter().enumerate() {
            let result = analyze_image(transport, &options.decoder, image);
            on_progress(
                Progress {
                    index,
                    completed: index + 1,
                    total,
                },
                &result,
            );
            results.push(result);
        }
        return results;
    }

    let mut slots: Vec<Option<AnalysisResult>> = vec![None; total];
    let next = AtomicUsize::new(0);
    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, AnalysisResult)>();
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            let decoder = &options.decoder;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(image) = images.get(index) else {
                    break;
                };
                let result = analyze_image(transport, decoder, image);
                if tx.send((index, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut completed = 0;
        for (index, result) in rx {
            completed += 1;
            on_progress(
                Progress {
                    index,
                    completed,
                    total,
                },
                &result,
            );
            slots[index] = Some(result);
        }
    });

    slots
        .into_iter()
        .zip(images)
        .map(|(slot, image)| {
            slot.unwrap_or_else(|| {
                AnalysisResult::failed(image.clone(), "worker stopped before finishing")
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_are_clamped() {
        assert_eq!(BatchOptions::default().workers(), 1);
        assert_eq!(BatchOptions::default().with_workers(0).workers(), 1);
        assert_eq!(BatchOptions::default().with_workers(64).workers(), MAX_WORKERS);
        assert_eq!(BatchOptions::default().with_workers(3).workers(), 3);
    }

    #[test]
    fn progress_fraction_handles_empty_batches() {
        let empty = Progress {
            index: 0,
            completed: 0,
            total: 0,
        };
        assert_eq!(empty.fraction(), 1.0);
        let half = Progress {
            index: 1,
            completed: 2,
            total: 4,
        };
        assert_eq!(half.fraction(), 0.5);
    }
}
