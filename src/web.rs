use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::ops::RangeInclusive;

use crate::models::{AdvisoryReport, PatientDetails, PROMPT_VERSION};
use crate::services::imaging::{self, ImageError};
use crate::services::{analyzer, WoundAnalyzer};

/// A parsed form submission, before the image is touched.
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub patient: PatientDetails,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Please upload an image (JPG, JPEG, PNG)")]
    MissingImage,
    #[error("Unsupported file type '{0}', expected JPG, JPEG or PNG")]
    UnsupportedType(String),
    #[error("'{field}' must be a whole number")]
    InvalidNumber { field: &'static str },
    #[error("'{field}' must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
    },
    #[error("Could not read the uploaded image: {0}")]
    InvalidImage(#[from] ImageError),
    #[error("The uploaded file is too large")]
    TooLarge,
    #[error("Malformed form submission: {0}")]
    Form(String),
    #[error("Internal error while preparing the image")]
    Internal,
}

impl UploadError {
    fn status(&self) -> StatusCode {
        match self {
            UploadError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge
        } else {
            UploadError::Form(err.body_text())
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            result: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    result: String,
}

/// What the page renders: the formatted text always, the parsed report when it parsed.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub ok: bool,
    pub result: String,
    pub report: Option<AdvisoryReport>,
    pub patient: PatientDetails,
    pub prompt_version: &'static str,
}

/// Collects the image and the optional demographics from the multipart form.
pub async fn read_upload(mut multipart: Multipart) -> Result<Upload, UploadError> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut patient = PatientDetails::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(UploadError::from)?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(UploadError::from)?;
                image = Some((file_name, bytes.to_vec()));
            }
            "age" => {
                if let Some(age) = read_number(field, "age", PatientDetails::AGE_RANGE).await? {
                    patient.age = age;
                }
            }
            "height" => {
                if let Some(height) =
                    read_number(field, "height", PatientDetails::HEIGHT_RANGE).await?
                {
                    patient.height_cm = height;
                }
            }
            "weight" => {
                if let Some(weight) =
                    read_number(field, "weight", PatientDetails::WEIGHT_RANGE).await?
                {
                    patient.weight_kg = weight;
                }
            }
            other => log::debug!("Ignoring unknown form field '{}'", other),
        }
    }

    match image {
        Some((file_name, bytes)) if !bytes.is_empty() => Ok(Upload {
            file_name,
            bytes,
            patient,
        }),
        _ => Err(UploadError::MissingImage),
    }
}

/// Blank fields keep their defaults.
async fn read_number(
    field: Field<'_>,
    name: &'static str,
    range: RangeInclusive<u32>,
) -> Result<Option<u32>, UploadError> {
    let text = field
        .text()
        .await
        .map_err(UploadError::from)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: u32 = text
        .parse()
        .map_err(|_| UploadError::InvalidNumber { field: name })?;
    if !range.contains(&value) {
        return Err(UploadError::OutOfRange {
            field: name,
            min: *range.start(),
            max: *range.end(),
        });
    }

    Ok(Some(value))
}

/// Checks the extension and re-encodes the upload off the async runtime.
pub async fn prepare_image(file_name: &str, bytes: Vec<u8>) -> Result<Vec<u8>, UploadError> {
    if !imaging::is_supported_upload(file_name) {
        return Err(UploadError::UnsupportedType(file_name.to_string()));
    }

    let jpeg = tokio::task::spawn_blocking(move || imaging::reencode_as_jpeg(&bytes))
        .await
        .map_err(|e| {
            log::error!("❌ Image re-encoding task failed: {}", e);
            UploadError::Internal
        })??;

    log::debug!("🔄 Re-encoded upload '{}' to {} byte JPEG", file_name, jpeg.len());
    Ok(jpeg)
}

/// Runs one submission end to end. Demographics are echoed back, never forwarded.
pub async fn handle_upload(analyzer: &WoundAnalyzer, upload: Upload) -> Response {
    let Upload {
        file_name,
        bytes,
        patient,
    } = upload;

    log::info!("📨 Upload received: '{}' ({} bytes)", file_name, bytes.len());

    let jpeg = match prepare_image(&file_name, bytes).await {
        Ok(jpeg) => jpeg,
        Err(e) => {
            log::warn!("⚠️ Rejected upload '{}': {}", file_name, e);
            return e.into_response();
        }
    };

    match analyzer.analyze(jpeg).await {
        Ok(result) => {
            let report = match result.report() {
                Ok(report) => {
                    if let Some(urgency) = report.urgency {
                        log::info!("✅ Analysis complete: {} ({})", report.diagnosis, urgency);
                    } else {
                        log::info!("✅ Analysis complete: {}", report.diagnosis);
                    }
                    Some(report)
                }
                Err(e) => {
                    log::warn!("⚠️ Reply did not follow the five-line template: {}", e);
                    None
                }
            };

            let body = AnalyzeResponse {
                ok: true,
                result: result.formatted_text,
                report,
                patient,
                prompt_version: PROMPT_VERSION,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            let body = AnalyzeResponse {
                ok: false,
                result: analyzer::error_text(&e),
                report: None,
                patient,
                prompt_version: PROMPT_VERSION,
            };
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
    }
}

pub mod server {
    use super::*;
    use axum::{
        extract::{DefaultBodyLimit, State},
        http::header,
        middleware,
        response::Html,
        routing::{get, post},
        Router,
    };
    use std::sync::Arc;
    use tower_http::limit::RequestBodyLimitLayer;

    pub struct AppState {
        pub analyzer: Arc<WoundAnalyzer>,
    }

    pub fn create_router(analyzer: Arc<WoundAnalyzer>, max_upload_bytes: usize) -> Router {
        let state = Arc::new(AppState { analyzer });

        Router::new()
            .route("/", get(index_page))
            .route("/api/analyze", post(analyze_handler))
            .route("/health", get(health_check))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(max_upload_bytes))
            .layer(middleware::map_response(json_limit_rejection))
            .with_state(state)
    }

    /// The body limit layer answers 413 in plain text; the page expects the JSON error shape.
    async fn json_limit_rejection(response: Response) -> Response {
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
            log::warn!("⚠️ Upload rejected by body size limit");
            UploadError::TooLarge.into_response()
        } else {
            response
        }
    }

    async fn index_page() -> Html<&'static str> {
        Html(include_str!("../static/index.html"))
    }

    async fn analyze_handler(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
        match read_upload(multipart).await {
            Ok(upload) => handle_upload(&state.analyzer, upload).await,
            Err(e) => {
                log::warn!("⚠️ Invalid form submission: {}", e);
                e.into_response()
            }
        }
    }

    async fn health_check() -> &'static str {
        "OK"
    }
}

#[cfg(test)]
mod tests {
    use super::server::create_router;
    use super::*;
    use crate::models::INSTRUCTION_TEXT;
    use crate::services::imaging::tests::sample_png;
    use crate::services::vision::mock::{MockReply, MockVisionModel};
    use crate::services::RemoteCallFailure;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pathoscan-test-boundary";

    const REPLY: &str = "Disease Diagnosis: Impetigo Probability: 70% \
        Urgency Advice: Seek attention if causes discomfort Home Remedy: Warm compress \
        Confidence Statement: Fairly confident";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, file_name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n",
                            name, file_name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_form(
        model: Arc<MockVisionModel>,
        parts: &[Part<'_>],
    ) -> (StatusCode, serde_json::Value) {
        let analyzer = Arc::new(WoundAnalyzer::new(model, Duration::from_secs(30)));
        let app = create_router(analyzer, 10 * 1024 * 1024);

        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let model = Arc::new(MockVisionModel::replying(REPLY));
        let png = sample_png();

        let (status, json) = post_form(model.clone(), &[Part::File("image", "wound.png", &png)]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["result"].as_str().unwrap().lines().count(), 5);
        assert_eq!(json["report"]["diagnosis"], "Impetigo");
        assert_eq!(json["report"]["urgency"], "if_discomfort");
        assert_eq!(json["patient"]["age"], 25);
        assert_eq!(json["prompt_version"], PROMPT_VERSION);

        let requests = model.recorded();
        assert_eq!(requests.len(), 1);
        assert_eq!(&requests[0].image_bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_demographics_never_reach_the_model() {
        let model = Arc::new(MockVisionModel::replying(REPLY));
        let png = sample_png();

        let (status, json) = post_form(
            model.clone(),
            &[
                Part::Text("age", "87"),
                Part::Text("height", "193"),
                Part::Text("weight", "211"),
                Part::File("image", "wound.png", &png),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["patient"]["age"], 87);
        assert_eq!(json["patient"]["height_cm"], 193);
        assert_eq!(json["patient"]["weight_kg"], 211);

        let requests = model.recorded();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].instruction_text, INSTRUCTION_TEXT);
        for value in ["87", "193", "211"] {
            assert!(!requests[0].instruction_text.contains(value));
        }
        assert_eq!(
            requests[0].image_bytes,
            imaging::reencode_as_jpeg(&png).unwrap()
        );
    }

    #[tokio::test]
    async fn test_remote_failure_is_displayable() {
        let model = Arc::new(MockVisionModel::new(MockReply::Fail(
            RemoteCallFailure::Network("connection refused".to_string()),
        )));
        let png = sample_png();

        let (status, json) = post_form(model, &[Part::File("image", "wound.jpg", &png)]).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["ok"], false);
        assert_eq!(
            json["result"],
            "❌ Error calling Gemini: network error: connection refused"
        );
        assert!(json["report"].is_null());
    }

    #[tokio::test]
    async fn test_off_template_reply_has_no_report() {
        let model = Arc::new(MockVisionModel::replying("I cannot analyze this image."));
        let png = sample_png();

        let (status, json) = post_form(model, &[Part::File("image", "wound.png", &png)]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"], "I cannot analyze this image.");
        assert!(json["report"].is_null());
    }

    #[tokio::test]
    async fn test_rejects_unsupported_extension() {
        let model = Arc::new(MockVisionModel::replying(REPLY));
        let png = sample_png();

        let (status, json) = post_form(model.clone(), &[Part::File("image", "wound.gif", &png)]).await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["ok"], false);
        assert!(model.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_missing_or_broken_image() {
        let model = Arc::new(MockVisionModel::replying(REPLY));

        let (status, _) = post_form(model.clone(), &[Part::Text("age", "30")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) =
            post_form(model.clone(), &[Part::File("image", "wound.jpg", b"not a jpeg")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["result"]
            .as_str()
            .unwrap()
            .starts_with("Could not read the uploaded image"));

        assert!(model.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_numbers() {
        let model = Arc::new(MockVisionModel::replying(REPLY));
        let png = sample_png();

        let (status, json) = post_form(
            model.clone(),
            &[Part::Text("age", "130"), Part::File("image", "wound.png", &png)],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["result"], "'age' must be between 1 and 120");

        let (status, json) = post_form(
            model.clone(),
            &[Part::Text("weight", "heavy"), Part::File("image", "wound.png", &png)],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["result"], "'weight' must be a whole number");
    }

    #[tokio::test]
    async fn test_blank_numbers_keep_defaults() {
        let model = Arc::new(MockVisionModel::replying(REPLY));
        let png = sample_png();

        let (status, json) = post_form(
            model,
            &[Part::Text("height", ""), Part::File("image", "wound.png", &png)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["patient"]["height_cm"], 170);
    }

    #[tokio::test]
    async fn test_oversized_upload_gets_json_error() {
        let model = Arc::new(MockVisionModel::replying(REPLY));
        let app = create_router(
            Arc::new(WoundAnalyzer::new(model.clone(), Duration::from_secs(30))),
            1024,
        );
        let oversized = vec![0u8; 4096];
        let body = multipart_body(&[Part::File("image", "wound.png", &oversized)]);

        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["ok"], false);
        assert_eq!(json["result"], "The uploaded file is too large");
        assert!(model.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let model = Arc::new(MockVisionModel::replying(REPLY));
        let app = create_router(Arc::new(WoundAnalyzer::new(model, Duration::from_secs(30))), 1024);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("PathoScan"));
    }
}
