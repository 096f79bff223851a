use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use glimpse_contracts::{AnalysisStatus, ImageAsset, ERROR_MARKER};
use glimpse_engine::{
    run_batch, BatchOptions, LineStream, Pipeline, Stage, TransportError, VisionTransport,
};

#[derive(Clone)]
enum Script {
    Answer { fragments: Vec<&'static str>, delay_ms: u64 },
    UploadFails,
    TimesOut,
    DropsMidStream,
}

/// In-memory service keyed by display name.
struct FakeService {
    scripts: HashMap<String, Script>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeService {
    fn new(scripts: Vec<(&str, Script)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(name, script)| (name.to_string(), script))
                .collect(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn script(&self, name: &str) -> Script {
        self.scripts.get(name).cloned().unwrap_or(Script::Answer {
            fragments: vec![],
            delay_ms: 0,
        })
    }
}

fn frame(answer: &str) -> String {
    format!(
        "data: {}",
        serde_json::json!({ "event": "message", "answer": answer })
    )
}

impl VisionTransport for FakeService {
    fn upload(&self, image: &ImageAsset) -> Result<String, TransportError> {
        match self.script(image.display_name()) {
            Script::UploadFails => Err(TransportError::Status {
                stage: Stage::Upload,
                code: 503,
                body: "service unavailable".to_string(),
            }),
            _ => Ok(image.display_name().to_string()),
        }
    }

    fn analyze(&self, file_id: &str) -> Result<LineStream, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let script = self.script(file_id);
        let outcome = match script {
            Script::Answer {
                fragments,
                delay_ms,
            } => {
                thread::sleep(Duration::from_millis(delay_ms));
                let mut lines: Vec<Result<String, TransportError>> = vec![Ok(": ping".into())];
                for fragment in fragments {
                    lines.push(Ok(frame(fragment)));
                    lines.push(Ok(String::new()));
                }
                lines.push(Ok("data: {\"event\": \"message_end\"}".into()));
                Ok(Box::new(lines.into_iter()) as LineStream)
            }
            Script::TimesOut => Err(TransportError::Timeout {
                stage: Stage::Analyze,
                seconds: 5,
            }),
            Script::DropsMidStream => {
                let lines: Vec<Result<String, TransportError>> = vec![
                    Ok(frame("partial ")),
                    Err(TransportError::Stream {
                        message: "connection reset".to_string(),
                    }),
                ];
                Ok(Box::new(lines.into_iter()) as LineStream)
            }
            Script::UploadFails => unreachable!("upload already failed"),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn assets(names: &[&str]) -> Vec<ImageAsset> {
    names
        .iter()
        .map(|name| ImageAsset::new(name.as_bytes().to_vec(), *name))
        .collect()
}

#[test]
fn sequential_batch_preserves_order_and_reports_progress() {
    let service = FakeService::new(vec![
        ("one.png", Script::Answer { fragments: vec!["A ", "cat."], delay_ms: 0 }),
        ("two.png", Script::Answer { fragments: vec!["A dog."], delay_ms: 0 }),
    ]);
    let images = assets(&["one.png", "two.png"]);
    let mut seen = Vec::new();
    let results = run_batch(&service, &images, &BatchOptions::default(), |progress, _| {
        seen.push((progress.index, progress.completed, progress.total));
    });

    assert_eq!(seen, vec![(0, 1, 2), (1, 2, 2)]);
    let texts: Vec<&str> = results.iter().map(|result| result.analysis_text()).collect();
    assert_eq!(texts, vec!["A cat.", "A dog."]);
    assert!(results.iter().all(|result| result.is_success()));
}

#[test]
fn transport_failure_on_third_image_is_isolated() {
    for workers in [1, 3] {
        let service = FakeService::new(vec![
            ("1.png", Script::Answer { fragments: vec!["one"], delay_ms: 0 }),
            ("2.png", Script::Answer { fragments: vec!["two"], delay_ms: 0 }),
            ("3.png", Script::UploadFails),
            ("4.png", Script::Answer { fragments: vec!["four"], delay_ms: 0 }),
            ("5.png", Script::Answer { fragments: vec!["five"], delay_ms: 0 }),
        ]);
        let images = assets(&["1.png", "2.png", "3.png", "4.png", "5.png"]);
        let options = BatchOptions::default().with_workers(workers);
        let results = run_batch(&service, &images, &options, |_, _| {});

        assert_eq!(results.len(), 5);
        assert!(results[2].analysis_text().starts_with(ERROR_MARKER));
        assert!(results[2].analysis_text().contains("503"));
        assert!(matches!(results[2].status(), AnalysisStatus::Failed { .. }));
        for (idx, expected) in [(0, "one"), (1, "two"), (3, "four"), (4, "five")] {
            assert_eq!(results[idx].analysis_text(), expected);
            assert!(results[idx].is_success());
        }
    }
}

#[test]
fn timeouts_and_dropped_streams_become_error_results() {
    let service = FakeService::new(vec![
        ("slow.png", Script::TimesOut),
        ("cut.png", Script::DropsMidStream),
        ("fine.png", Script::Answer { fragments: vec!["ok"], delay_ms: 0 }),
    ]);
    let images = assets(&["slow.png", "cut.png", "fine.png"]);
    let results = run_batch(&service, &images, &BatchOptions::default(), |_, _| {});

    assert_eq!(
        results[0].analysis_text(),
        format!("{ERROR_MARKER}analysis request timed out after 5s")
    );
    assert_eq!(
        results[1].analysis_text(),
        format!("{ERROR_MARKER}analysis stream interrupted: connection reset")
    );
    assert_eq!(results[2].analysis_text(), "ok");
}

#[test]
fn pooled_batch_keeps_input_order_despite_completion_order() {
    let names = ["a.png", "b.png", "c.png", "d.png", "e.png", "f.png"];
    let delays = [60, 5, 40, 0, 25, 10];
    let fragments = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];
    let service = FakeService::new(
        names
            .iter()
            .zip(delays)
            .zip(fragments)
            .map(|((name, delay_ms), fragment)| {
                (
                    *name,
                    Script::Answer {
                        fragments: vec![fragment],
                        delay_ms,
                    },
                )
            })
            .collect(),
    );
    let images = assets(&names);
    let options = BatchOptions::default().with_workers(3);

    let mut completed = Vec::new();
    let results = run_batch(&service, &images, &options, |progress, _| {
        completed.push(progress.completed);
    });

    let texts: Vec<&str> = results.iter().map(|result| result.analysis_text()).collect();
    assert_eq!(texts, fragments.to_vec());
    let names_out: Vec<&str> = results.iter().map(|result| result.display_name()).collect();
    assert_eq!(names_out, names.to_vec());
    assert_eq!(completed, vec![1, 2, 3, 4, 5, 6]);
    assert!(service.peak.load(Ordering::SeqCst) <= 3);
}

#[test]
fn pipeline_returns_buffer_and_outcomes_for_every_image() -> anyhow::Result<()> {
    let service = FakeService::new(vec![
        ("ok.png", Script::Answer { fragments: vec!["fine"], delay_ms: 0 }),
        ("bad.png", Script::UploadFails),
    ]);
    let images = assets(&["ok.png", "bad.png"]);
    let pipeline = Pipeline::new(service, BatchOptions::default());
    let output = pipeline.run(&images, |_, _| {})?;

    assert!(output.buffer.starts_with(b"PK"));
    assert_eq!(output.outcomes.len(), 2);
    assert!(output.outcomes[0].succeeded());
    assert!(!output.outcomes[1].succeeded());
    assert_eq!(output.failed(), 1);
    assert_eq!(output.results[1].display_name(), "bad.png");
    Ok(())
}
