use serde::Deserialize;
use thiserror::Error;

pub const DATA_MARKER: &str = "data:";
pub const MESSAGE_EVENT: &str = "message";

/// One decoded `data:` record. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnalysisFrame {
    pub event: String,
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Error)]
#[error("malformed stream frame: {source}")]
pub struct FrameDecodeError {
    #[from]
    source: serde_json::Error,
}

/// What a single raw line turned out to be.
#[derive(Debug)]
pub enum LineOutcome {
    Blank,
    Ignored,
    Malformed(FrameDecodeError),
    Frame(AnalysisFrame),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    fragment_events: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            fragment_events: vec![MESSAGE_EVENT.to_string()],
        }
    }
}

impl DecoderConfig {
    /// Replaces the event kinds whose `answer` counts as text. Blank kinds are dropped.
    pub fn with_fragment_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragment_events = events
            .into_iter()
            .map(|event| {
                let event: String = event.into();
                event.trim().to_string()
            })
            .filter(|event| !event.is_empty())
            .collect();
        Self { fragment_events }
    }

    pub fn fragment_events(&self) -> &[String] {
        &self.fragment_events
    }

    pub fn is_fragment_event(&self, event: &str) -> bool {
        self.fragment_events.iter().any(|kind| kind == event)
    }

    /// The text this frame contributes, if any.
    pub fn fragment_of(&self, frame: AnalysisFrame) -> Option<String> {
        if self.is_fragment_event(&frame.event) {
            frame.answer
        } else {
            None
        }
    }
}

pub fn decode_line(line: &str) -> LineOutcome {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return LineOutcome::Blank;
    }
    let Some(payload) = line.strip_prefix(DATA_MARKER) else {
        return LineOutcome::Ignored;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    match serde_json::from_str::<AnalysisFrame>(payload) {
        Ok(frame) => LineOutcome::Frame(frame),
        Err(err) => LineOutcome::Malformed(err.into()),
    }
}
