//! Reply classification.
//!
//! Turns a raw reply line into the canonical token used to match the queue
//! head. The power command answers with prose (`Power On` / `Power Off`)
//! instead of echoing `PWR1` / `PWR0`; the alias map folds those back.

use super::command::{parse_token, MNEMONIC_LEN};

/// Reply characters that count as a command argument.
const ARGUMENT_CHARS: [char; 5] = ['0', '1', '2', '3', '4'];

/// Static mapping from device reply tokens to canonical tokens.
#[derive(Debug, Clone, Copy)]
pub struct AliasMap {
    entries: &'static [(&'static str, &'static str)],
}

/// Aliases observed on the HD-401MR.
pub const POWER_ALIASES: AliasMap = AliasMap {
    entries: &[("Pown", "PWR1"), ("Powf", "PWR0")],
};

impl AliasMap {
    /// Build an alias map from a static table.
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    /// Look up the canonical token for a device reply token.
    pub fn get(&self, token: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(alias, _)| *alias == token)
            .map(|(_, canonical)| *canonical)
    }
}

impl Default for AliasMap {
    fn default() -> Self {
        POWER_ALIASES
    }
}

/// A classified reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Canonical token, compared against the queue head.
    pub token: String,
    /// Mnemonic of the token.
    pub mnemonic: String,
}

/// Classify a reply line.
///
/// Trailing carriage returns and whitespace are trimmed first. Returns
/// `None` for lines that are blank after trimming.
pub fn classify(line: &str, aliases: &AliasMap) -> Option<Response> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }

    let (mut mnemonic, mut argument) = parse_token(line);
    let mut token = format!("{mnemonic}{}", argument.map(String::from).unwrap_or_default());

    if let Some(canonical) = aliases.get(&token) {
        (mnemonic, argument) = parse_token(canonical);
        token = canonical.to_string();
    }

    if !argument.is_some_and(|c| ARGUMENT_CHARS.contains(&c)) {
        token = mnemonic.to_string();
    }

    let mnemonic = token.chars().take(MNEMONIC_LEN).collect();
    Some(Response { token, mnemonic })
}
