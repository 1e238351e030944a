pub mod backend;
pub mod client;
pub mod config;
pub mod dryrun;
pub mod export;
pub mod gemini;
pub mod session;
pub mod upload;

pub use backend::{default_backend_registry, BackendError, BackendRegistry, ImageBackend};
pub use client::{GenerationClient, GenerationError};
pub use config::{EngineConfig, EnvSource};
pub use session::{GeneratorSession, SessionState};
