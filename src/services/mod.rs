pub mod analyzer;
pub mod gemini; // Google Gemini generateContent client
pub mod imaging; // Upload decoding and JPEG re-encoding
pub mod vision;

pub use analyzer::WoundAnalyzer;
pub use gemini::GeminiService;
pub use vision::{RemoteCallFailure, VisionModel};
