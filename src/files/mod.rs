//! Uploaded-file handling: classification, transient storage, and local
//! heuristic analysis.

pub mod extract;
pub mod heuristic;
pub mod schema;
pub mod storage;

pub use schema::{AnalysisResult, AnalysisSource, FileInfo, UploadedFile};
pub use storage::{TempFile, TempStorage};
