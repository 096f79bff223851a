use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::assets::{AnalysisResult, AnalysisStatus};

pub type EventPayload = Map<String, Value>;

/// Append-only writer for a batch's `events.jsonl`.
///
/// Every line carries `type`, `batch_id` and `ts`; the caller payload is merged
/// last and may override them. One compact JSON object per line.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    batch_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, batch_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                batch_id: batch_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn batch_id(&self) -> &str {
        &self.inner.batch_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "batch_id".to_string(),
            Value::String(self.inner.batch_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        event.extend(payload);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    /// Records one finished image as `image_analyzed` or `image_failed`.
    pub fn emit_result(
        &self,
        index: usize,
        total: usize,
        result: &AnalysisResult,
    ) -> anyhow::Result<Value> {
        let mut payload = EventPayload::new();
        payload.insert("index".to_string(), Value::from(index));
        payload.insert("total".to_string(), Value::from(total));
        payload.insert(
            "display_name".to_string(),
            Value::String(result.display_name().to_string()),
        );
        match result.status() {
            AnalysisStatus::Succeeded => {
                payload.insert(
                    "chars".to_string(),
                    Value::from(result.analysis_text().chars().count()),
                );
                self.emit("image_analyzed", payload)
            }
            AnalysisStatus::Failed { reason } => {
                payload.insert("error".to_string(), Value::String(reason.clone()));
                self.emit("image_failed", payload)
            }
        }
    }
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
