pub mod backend;
pub mod errors;
pub mod events;
pub mod i18n;
pub mod ids;
pub mod prompt;
pub mod stream;
pub mod turn;

pub use backend::{GenerationOptions, NarrationBackend};
pub use errors::BackendError;
pub use events::SessionEvent;
pub use ids::SessionId;
pub use prompt::{ContentPolicy, PromptContext};
pub use stream::StreamEvent;
pub use turn::{Role, Turn};
