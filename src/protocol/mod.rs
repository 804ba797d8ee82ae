//! Protocol module - line framing, command strings, and reply classification.
//!
//! This module implements the text protocol spoken by the switcher:
//! - Line buffer for accumulating partial reads
//! - Command type with `MMM[A]` validation and wire encoding
//! - Reply classifier with alias substitution

mod classifier;
mod command;
mod line_buffer;

pub use classifier::{classify, AliasMap, Response, POWER_ALIASES};
pub use command::{parse_token, Command, COMMAND_TERMINATOR, MNEMONIC_LEN};
pub use line_buffer::{LineBuffer, Lines, LINE_FEED};
