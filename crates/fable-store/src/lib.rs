//! Session persistence: a human-editable text format, one role-tagged turn
//! per line, with lenient loading of hand-edited files.

pub mod error;
pub mod save;

pub use error::StoreError;
pub use save::{load_turns, save_turns, LoadOutcome};
