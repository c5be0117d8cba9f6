use std::time::Duration;

use crate::models::AnalysisRequest;

/// Every way the remote call can go wrong, collapsed into one user-facing line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteCallFailure {
    #[error("timeout: no response from the model within {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("model API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
}

/// Trait for hosted multimodal models (Gemini, test doubles, ...)
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync {
    /// Returns the reply text, or `None` when the model answered without any.
    async fn generate(&self, request: &AnalysisRequest) -> Result<Option<String>, RemoteCallFailure>;

    fn name(&self) -> &str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    pub enum MockReply {
        Text(String),
        Nothing,
        Fail(RemoteCallFailure),
        Hang,
    }

    /// Records every request it receives and answers with a canned reply.
    pub struct MockVisionModel {
        reply: MockReply,
        requests: Mutex<Vec<AnalysisRequest>>,
    }

    impl MockVisionModel {
        pub fn new(reply: MockReply) -> Self {
            Self {
                reply,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str) -> Self {
            Self::new(MockReply::Text(text.to_string()))
        }

        pub fn recorded(&self) -> Vec<AnalysisRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl VisionModel for MockVisionModel {
        async fn generate(
            &self,
            request: &AnalysisRequest,
        ) -> Result<Option<String>, RemoteCallFailure> {
            self.requests.lock().unwrap().push(request.clone());

            match &self.reply {
                MockReply::Text(text) => Ok(Some(text.clone())),
                MockReply::Nothing => Ok(None),
                MockReply::Fail(err) => Err(err.clone()),
                MockReply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(None)
                }
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }
}
