pub mod config;
pub mod models;
pub mod services;
pub mod web; // Upload form and analysis endpoint

pub use config::Config;
pub use models::{AdvisoryReport, AnalysisRequest, AnalysisResult, PatientDetails};
pub use services::{GeminiService, RemoteCallFailure, VisionModel, WoundAnalyzer};
