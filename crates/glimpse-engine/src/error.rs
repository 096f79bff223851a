use thiserror::Error;

/// Which request of the upload/analyze pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Analyze,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Upload => f.write_str("upload"),
            Stage::Analyze => f.write_str("analysis"),
        }
    }
}

/// Failure talking to the vision service. Confined to the image it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{stage} request timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("{stage} request could not be sent: {message}")]
    Request { stage: Stage, message: String },

    #[error("{stage} request failed ({code}): {body}")]
    Status { stage: Stage, code: u16, body: String },

    #[error("{stage} response was invalid: {message}")]
    InvalidResponse { stage: Stage, message: String },

    #[error("analysis stream interrupted: {message}")]
    Stream { message: String },

    #[error("http client could not be built: {message}")]
    Client { message: String },
}

#[derive(Debug, Error)]
#[error("image could not be decoded: {message}")]
pub struct ImageDecodeError {
    pub message: String,
}

/// Whole-report failure. A partial workbook is never returned.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report serialization failed: {0}")]
    Serialization(#[from] rust_xlsxwriter::XlsxError),
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

/// Flattens an error and its sources into one line.
pub(crate) fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = cause {
        let text = current.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        cause = current.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}
