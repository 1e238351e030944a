//! Line parser for the interactive session.

mod command_registry;
mod intent_parser;

pub use command_registry::{CommandHelp, SESSION_COMMANDS};
pub use intent_parser::{parse_intent, Intent};
