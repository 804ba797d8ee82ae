//! Command strings and fixed-offset token parsing.
//!
//! Every command is a 3-character mnemonic optionally followed by an
//! argument: `PWR1`, `HMD`, `DMD12`. On the wire a command is terminated by
//! `\r\n`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ControlError, Result};

/// Length of a command mnemonic.
pub const MNEMONIC_LEN: usize = 3;

/// Terminator appended to every transmitted command.
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";

/// A validated device command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Validate and wrap a command string.
    ///
    /// The string must hold at least the 3-character mnemonic and consist
    /// only of printable, non-space ASCII.
    pub fn new(command: impl Into<String>) -> Result<Self> {
        let command = command.into();
        let valid = command.len() >= MNEMONIC_LEN && command.bytes().all(|b| b.is_ascii_graphic());
        if !valid {
            return Err(ControlError::InvalidCommand(command));
        }
        Ok(Self(command))
    }

    /// Attach an optional choice id to an action id.
    pub fn compose(action: &str, choice: Option<&str>) -> Result<Self> {
        match choice {
            Some(choice) => Self::new(format!("{action}{choice}")),
            None => Self::new(action),
        }
    }

    /// The 3-character mnemonic.
    pub fn mnemonic(&self) -> &str {
        &self.0[..MNEMONIC_LEN]
    }

    /// The argument following the mnemonic, if any.
    pub fn argument(&self) -> Option<&str> {
        Some(&self.0[MNEMONIC_LEN..]).filter(|arg| !arg.is_empty())
    }

    /// The command text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode the command as a terminated wire line.
    pub fn to_line(&self) -> Bytes {
        let mut line = BytesMut::with_capacity(self.0.len() + COMMAND_TERMINATOR.len());
        line.put_slice(self.0.as_bytes());
        line.put_slice(COMMAND_TERMINATOR);
        line.freeze()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Command {
    type Error = ControlError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Command {
    type Error = ControlError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

/// Split a reply line into its mnemonic part and trailing character.
///
/// The mnemonic part is the first three characters (fewer if the line is
/// shorter); the argument is the last character of the line. For lines of
/// three characters or less the argument overlaps the mnemonic.
pub fn parse_token(line: &str) -> (&str, Option<char>) {
    let end = line
        .char_indices()
        .nth(MNEMONIC_LEN)
        .map_or(line.len(), |(idx, _)| idx);
    (&line[..end], line.chars().next_back())
}
