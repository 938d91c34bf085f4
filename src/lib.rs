//! filecritic: upload a file, keep a copy in cloud storage and get review
//! feedback on it, from an AI model when one is configured and from a local
//! heuristic otherwise. Instruction files steer the review.

pub mod config;
pub mod error;
pub mod files;
pub mod gateway;
pub mod instructions;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod providers;

pub use crate::config::Config;
pub use crate::error::{ApiError, ApiResult};
pub use crate::gateway::{build_router, AppState};
