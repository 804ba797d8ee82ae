//! Command table for the HD-401MR.
//!
//! Static metadata per action id: display labels, whether the device
//! acknowledges the command, and the argument choices it accepts. The
//! dispatch queue only reads `produces_reply`; labels and choices are for
//! whatever front end composes commands.
//!
//! # Example
//!
//! ```
//! use orei_control::commands::CommandTable;
//!
//! let table = CommandTable::standard();
//! assert!(table.spec("PWR").unwrap().produces_reply);
//! assert!(!table.spec("SWV").unwrap().produces_reply);
//!
//! let cmd = table.resolve("SMD", Some("3")).unwrap();
//! assert_eq!(cmd.as_str(), "SMD3");
//! ```

use crate::error::{ControlError, Result};
use crate::protocol::Command;

/// One selectable argument of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    /// Argument appended to the mnemonic.
    pub id: &'static str,
    /// Display text.
    pub label: &'static str,
}

/// Static description of one action.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Table key: the mnemonic, or a mnemonic with a fixed argument.
    pub id: &'static str,
    /// Display text.
    pub label: &'static str,
    /// Abbreviated label.
    pub short_label: &'static str,
    /// Grouping used by front ends.
    pub category: &'static str,
    /// `false` if the device never acknowledges this command.
    pub produces_reply: bool,
    /// Accepted arguments, in display order. Empty for fixed commands.
    pub choices: &'static [Choice],
}

impl CommandSpec {
    /// Find a choice by id.
    pub fn choice(&self, id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == id)
    }

    /// Every command this entry can produce.
    pub fn commands(&self) -> Vec<Command> {
        if self.choices.is_empty() {
            return Command::new(self.id).into_iter().collect();
        }
        self.choices
            .iter()
            .filter_map(|c| Command::compose(self.id, Some(c.id)).ok())
            .collect()
    }
}

const ON_OFF: &[Choice] = &[
    Choice { id: "1", label: "ON" },
    Choice { id: "0", label: "OFF" },
];

const RESOLUTION: &[Choice] = &[
    Choice { id: "2", label: "1080p @60hz" },
    Choice { id: "1", label: "720p @60hz" },
];

const INPUT: &[Choice] = &[
    Choice { id: "1", label: "Input 1" },
    Choice { id: "2", label: "Input 2" },
    Choice { id: "3", label: "Input 3" },
    Choice { id: "4", label: "Input 4" },
];

const DUAL: &[Choice] = &[
    Choice { id: "12", label: "Input 1 & 2" },
    Choice { id: "34", label: "Input 3 & 4" },
];

const fn spec(
    id: &'static str,
    label: &'static str,
    short_label: &'static str,
    category: &'static str,
    produces_reply: bool,
    choices: &'static [Choice],
) -> CommandSpec {
    CommandSpec {
        id,
        label,
        short_label,
        category,
        produces_reply,
        choices,
    }
}

static STANDARD: CommandTable = CommandTable {
    entries: &[
        spec("PWR", "Switcher Power", "Power", "Settings", true, ON_OFF),
        spec("OSD", "On Screen Display", "OSD", "Settings", true, ON_OFF),
        spec("VBX", "On Screen Split Line", "OSL", "Settings", true, ON_OFF),
        spec("RES", "Output Resolution", "OutRes", "Settings", true, RESOLUTION),
        spec("SMD", "Full Screen Mode", "FS", "Modes", true, INPUT),
        spec("DMD", "Dual Mode", "2x", "Modes", true, DUAL),
        spec("QMD", "1 x 3 Mode", "1x3", "Modes", true, INPUT),
        spec("HMD", "H Quad Mode", "HQuad", "Modes", true, &[]),
        spec("QMD0", "Quad Split Mode", "Quad", "Modes", true, &[]),
        // Input selection is never acknowledged.
        spec("SWV", "Select Video Input", "VIn", "Inputs", false, INPUT),
        spec("SWA", "Select Audio Input", "AIn", "Inputs", false, INPUT),
        spec("SWA0", "Mute Audio", "AMute", "Inputs", true, &[]),
    ],
};

/// Read-only command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandTable {
    entries: &'static [CommandSpec],
}

impl CommandTable {
    /// The HD-401MR command set.
    pub fn standard() -> &'static CommandTable {
        &STANDARD
    }

    /// Build a table from a static entry list.
    pub const fn new(entries: &'static [CommandSpec]) -> Self {
        Self { entries }
    }

    /// Look up an entry by exact id.
    pub fn spec(&self, id: &str) -> Option<&CommandSpec> {
        self.entries.iter().find(|s| s.id == id)
    }

    /// Whether the device acknowledges commands with this mnemonic.
    ///
    /// Unknown mnemonics are assumed to reply.
    pub fn produces_reply(&self, mnemonic: &str) -> bool {
        self.spec(mnemonic).map_or(true, |s| s.produces_reply)
    }

    /// Validate a choice against an entry and compose the command.
    pub fn resolve(&self, action: &str, choice: Option<&str>) -> Result<Command> {
        let spec = self
            .spec(action)
            .ok_or_else(|| ControlError::UnknownAction(action.to_string()))?;

        match (spec.choices.is_empty(), choice) {
            (true, None) => Command::new(spec.id),
            (false, Some(choice)) if spec.choice(choice).is_some() => {
                Command::compose(spec.id, Some(choice))
            }
            (_, choice) => Err(ControlError::InvalidChoice {
                action: action.to_string(),
                choice: choice.unwrap_or_default().to_string(),
            }),
        }
    }

    /// Iterate entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        STANDARD
    }
}
