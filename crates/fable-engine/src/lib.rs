//! The session orchestration engine: transcript management, command
//! dispatch, mode state, generation, and persistence, driven by a
//! single-writer session loop.

pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod modes;
pub mod scenario;
pub mod session;
pub mod tts;

pub use command::{parse, Command, Input};
pub use config::SessionConfig;
pub use context::ContextStore;
pub use error::EngineError;
pub use modes::ModeState;
pub use scenario::{Genre, Scenario, GENRES};
pub use session::{LoopOutcome, LoopState, SessionLoop};
pub use tts::TtsClient;
