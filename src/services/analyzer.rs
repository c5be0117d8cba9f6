use std::sync::Arc;
use std::time::Duration;

use super::vision::{RemoteCallFailure, VisionModel};
use crate::models::{AnalysisRequest, AnalysisResult, LINE_BREAK_LABELS};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const NO_RESPONSE_PLACEHOLDER: &str = "(No response received.)";
pub const ERROR_MARKER: &str = "❌ Error calling Gemini:";

/// Sends one wound photo per call to the vision model and tidies the reply.
pub struct WoundAnalyzer {
    model: Arc<dyn VisionModel>,
    timeout: Duration,
}

impl WoundAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn analyze(&self, image_bytes: Vec<u8>) -> Result<AnalysisResult, RemoteCallFailure> {
        let request = AnalysisRequest::new(image_bytes);
        log::info!(
            "📸 Analyzing {} byte image with {}",
            request.image_bytes.len(),
            self.model.name()
        );

        let raw_text = tokio::time::timeout(self.timeout, self.model.generate(&request))
            .await
            .map_err(|_| RemoteCallFailure::Timeout(self.timeout))??;

        let text = match raw_text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => {
                log::warn!("⚠️ Model returned no text, using placeholder");
                NO_RESPONSE_PLACEHOLDER
            }
        };

        let formatted_text = format_reply(text);
        log::debug!("💬 Formatted reply:\n{}", formatted_text);

        Ok(AnalysisResult {
            raw_text,
            formatted_text,
        })
    }

    /// Like `analyze`, but failures come back as an `ERROR_MARKER` line instead of an `Err`.
    pub async fn analyze_to_text(&self, image_bytes: Vec<u8>) -> String {
        match self.analyze(image_bytes).await {
            Ok(result) => result.formatted_text,
            Err(e) => error_text(&e),
        }
    }
}

/// Renders a failure as one line; API error bodies often arrive pretty-printed.
pub fn error_text(err: &RemoteCallFailure) -> String {
    log::error!("❌ Vision model call failed: {}", err);
    let description = err.to_string().split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{} {}", ERROR_MARKER, description)
}

/// Trims the reply and puts each known label at the start of its own line.
pub fn format_reply(raw: &str) -> String {
    LINE_BREAK_LABELS
        .iter()
        .fold(raw.trim().to_string(), |text, label| break_before(&text, label))
}

/// Inserts a newline before every occurrence of `label` unless it already starts a line.
/// Spaces and tabs left dangling before the break are dropped.
fn break_before(text: &str, label: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut last = 0;

    for (idx, _) in text.match_indices(label) {
        out.push_str(&text[last..idx]);
        last = idx;

        let kept = out.trim_end_matches(|c: char| c == ' ' || c == '\t').len();
        out.truncate(kept);
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }

    out.push_str(&text[last..]);
    out
}
