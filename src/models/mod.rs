use serde::{Deserialize, Serialize};

/// Bumped whenever `INSTRUCTION_TEXT` changes wording.
pub const PROMPT_VERSION: &str = "2025-06-wound-v1";

/// Fixed instruction sent with every image. Never user-supplied.
pub const INSTRUCTION_TEXT: &str = "You are a medical imaging analysis assistant. \
Analyze the attached wound image and respond in EXACTLY 5 lines as follows, \
with no explanations and no markdown, just plain text:\n\n\
Disease Diagnosis: <the single most probable bacterial or fungal disease>\n\
Probability: <only a number with % sign>\n\
Urgency Advice: <choose exactly one of: SEEK IMMEDIATE ATTENTION / Seek attention if causes discomfort / Attention may not be required>\n\
Home Remedy: <one short at-home remedy if not severe>\n\
Confidence Statement: <a single sentence showing how confident you are>\n\n\
Ensure each line is separated by a newline character.";

pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

pub const DIAGNOSIS_LABEL: &str = "Disease Diagnosis:";
pub const PROBABILITY_LABEL: &str = "Probability:";
pub const URGENCY_LABEL: &str = "Urgency Advice:";
pub const REMEDY_LABEL: &str = "Home Remedy:";
pub const CONFIDENCE_LABEL: &str = "Confidence Statement:";

/// Labels that get their own line, in the order the reformat applies them.
/// `Disease Diagnosis:` is expected to open the reply so it is not listed.
pub const LINE_BREAK_LABELS: [&str; 4] = [
    PROBABILITY_LABEL,
    URGENCY_LABEL,
    REMEDY_LABEL,
    CONFIDENCE_LABEL,
];

/// One submission's worth of data for the remote model.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image_bytes: Vec<u8>,
    pub instruction_text: &'static str,
}

impl AnalysisRequest {
    pub fn new(image_bytes: Vec<u8>) -> Self {
        Self {
            image_bytes,
            instruction_text: INSTRUCTION_TEXT,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        IMAGE_MIME_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Reply exactly as the model returned it; `None` when it had no text.
    pub raw_text: Option<String>,
    pub formatted_text: String,
}

impl AnalysisResult {
    pub fn report(&self) -> Result<AdvisoryReport, MalformedResponse> {
        AdvisoryReport::parse(&self.formatted_text)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("model reply is missing the '{missing}' field")]
pub struct MalformedResponse {
    pub missing: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Immediate,
    IfDiscomfort,
    NotRequired,
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UrgencyLevel::Immediate => "SEEK IMMEDIATE ATTENTION",
            UrgencyLevel::IfDiscomfort => "Seek attention if causes discomfort",
            UrgencyLevel::NotRequired => "Attention may not be required",
        };
        write!(f, "{}", s)
    }
}

impl UrgencyLevel {
    /// Matches the three phrases the instruction allows, ignoring case and a trailing period.
    pub fn from_advice(advice: &str) -> Option<Self> {
        let normalized = advice.trim().trim_end_matches('.').trim().to_lowercase();

        match normalized.as_str() {
            "seek immediate attention" => Some(UrgencyLevel::Immediate),
            "seek attention if causes discomfort" => Some(UrgencyLevel::IfDiscomfort),
            "attention may not be required" => Some(UrgencyLevel::NotRequired),
            _ => None,
        }
    }
}

/// The five reply fields read back out of the formatted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryReport {
    pub diagnosis: String,
    pub probability: String,
    pub probability_percent: Option<f64>,
    pub urgency_advice: String,
    pub urgency: Option<UrgencyLevel>,
    pub home_remedy: String,
    pub confidence_statement: String,
}

impl AdvisoryReport {
    /// Reads one value per label from lines that start with it. Later duplicates are ignored.
    pub fn parse(formatted: &str) -> Result<Self, MalformedResponse> {
        let field = |label: &'static str| -> Result<String, MalformedResponse> {
            formatted
                .lines()
                .map(str::trim)
                .find_map(|line| line.strip_prefix(label))
                .map(|value| value.trim().to_string())
                .ok_or(MalformedResponse {
                    missing: label.trim_end_matches(':'),
                })
        };

        let diagnosis = field(DIAGNOSIS_LABEL)?;
        let probability = field(PROBABILITY_LABEL)?;
        let urgency_advice = field(URGENCY_LABEL)?;
        let home_remedy = field(REMEDY_LABEL)?;
        let confidence_statement = field(CONFIDENCE_LABEL)?;

        Ok(Self {
            probability_percent: parse_percent(&probability),
            urgency: UrgencyLevel::from_advice(&urgency_advice),
            diagnosis,
            probability,
            urgency_advice,
            home_remedy,
            confidence_statement,
        })
    }
}

fn parse_percent(value: &str) -> Option<f64> {
    let number = value.trim().strip_suffix('%')?.trim();
    let parsed = number.replace(',', ".").parse::<f64>().ok()?;
    (0.0..=100.0).contains(&parsed).then_some(parsed)
}

/// Optional demographics from the form. Shown next to the result, never sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatientDetails {
    pub age: u32,
    pub height_cm: u32,
    pub weight_kg: u32,
}

impl Default for PatientDetails {
    fn default() -> Self {
        Self {
            age: 25,
            height_cm: 170,
            weight_kg: 65,
        }
    }
}

impl PatientDetails {
    pub const AGE_RANGE: std::ops::RangeInclusive<u32> = 1..=120;
    pub const HEIGHT_RANGE: std::ops::RangeInclusive<u32> = 50..=250;
    pub const WEIGHT_RANGE: std::ops::RangeInclusive<u32> = 10..=300;
}
