//! Voice command recognition.
//!
//! Finalized transcripts are tested against an ordered table of named pattern
//! groups. The first matching pattern wins, so group order matters where
//! phrasings overlap ("make them more analytical" is an update-role command,
//! not a communication style).
//!
//! Recognition is best-effort: no match is the common case and is not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a recognized command asks the UI to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandAction {
    CreateAdvisor,
    EditAdvisor,
    DeleteAdvisor,
    UpdateField,
    AddExpertise,
    AddTrait,
    Save,
    Cancel,
    SelectAdvisor,
}

impl CommandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateAdvisor => "CREATE_ADVISOR",
            Self::EditAdvisor => "EDIT_ADVISOR",
            Self::DeleteAdvisor => "DELETE_ADVISOR",
            Self::UpdateField => "UPDATE_FIELD",
            Self::AddExpertise => "ADD_EXPERTISE",
            Self::AddTrait => "ADD_TRAIT",
            Self::Save => "SAVE",
            Self::Cancel => "CANCEL",
            Self::SelectAdvisor => "SELECT_ADVISOR",
        }
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisor field targeted by an `UPDATE_FIELD` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandField {
    Name,
    Role,
    CommunicationStyle,
}

impl CommandField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Role => "role",
            Self::CommunicationStyle => "communicationStyle",
        }
    }
}

/// A command extracted from a finalized transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCommand {
    pub action: CommandAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<CommandField>,
    pub value: String,
    pub original_text: String,
}

/// One named group of the command table.
#[derive(Debug, Clone)]
pub struct CommandPattern {
    pub name: &'static str,
    pub action: CommandAction,
    pub field: Option<CommandField>,
    pub regexes: Vec<Regex>,
}

impl CommandPattern {
    /// Compile a group. Patterns that fail to compile are logged and skipped.
    pub fn new(
        name: &'static str,
        action: CommandAction,
        field: Option<CommandField>,
        patterns: &[&str],
    ) -> Self {
        let regexes = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(&format!("(?i){pattern}")) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!("Failed to compile command pattern for {}: {}", name, e);
                    None
                }
            })
            .collect();

        Self {
            name,
            action,
            field,
            regexes,
        }
    }

    /// Captured argument of the first matching regex in this group.
    fn match_value(&self, text: &str) -> Option<String> {
        self.regexes.iter().find_map(|regex| {
            regex.captures(text).map(|caps| {
                caps.get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default()
            })
        })
    }
}

static DEFAULT_TABLE: Lazy<CommandTable> = Lazy::new(CommandTable::build_default);

/// Ordered, read-only command grammar.
#[derive(Debug, Clone)]
pub struct CommandTable {
    patterns: Vec<CommandPattern>,
}

impl CommandTable {
    pub fn new(patterns: Vec<CommandPattern>) -> Self {
        Self { patterns }
    }

    /// The built-in advisor-management grammar.
    pub fn default_table() -> &'static CommandTable {
        &DEFAULT_TABLE
    }

    pub fn patterns(&self) -> &[CommandPattern] {
        &self.patterns
    }

    /// Match a finalized transcript, first matching pattern wins.
    pub fn recognize(&self, transcript: &str) -> Option<VoiceCommand> {
        let text = normalize(transcript);
        if text.is_empty() {
            return None;
        }

        self.patterns.iter().find_map(|group| {
            group.match_value(text).map(|value| {
                tracing::debug!("Transcript matched command group '{}'", group.name);
                VoiceCommand {
                    action: group.action,
                    field: group.field,
                    value,
                    original_text: transcript.to_string(),
                }
            })
        })
    }

    fn build_default() -> Self {
        use CommandAction::*;

        Self::new(vec![
            CommandPattern::new(
                "create",
                CreateAdvisor,
                None,
                &[
                    r"^(?:create|add|make)\s+(?:a\s+)?(?:new\s+)?advisor(?:\s+(?:named|called))?\s+(.+)$",
                    r"^new\s+advisor(?:\s+(?:named|called))?\s+(.+)$",
                ],
            ),
            CommandPattern::new(
                "edit",
                EditAdvisor,
                None,
                &[
                    r"^(?:edit|modify|change|update)\s+(?:the\s+)?advisor\s+(.+)$",
                    r"^(?:edit|open)\s+(.+?)(?:'s)?\s+(?:profile|settings)$",
                ],
            ),
            CommandPattern::new(
                "delete",
                DeleteAdvisor,
                None,
                &[r"^(?:delete|remove)\s+(?:the\s+)?advisor\s+(.+)$"],
            ),
            CommandPattern::new(
                "update-name",
                UpdateField,
                Some(CommandField::Name),
                &[
                    r"^(?:change|set|update)\s+(?:the\s+|their\s+|his\s+|her\s+)?name\s+to\s+(.+)$",
                    r"^(?:rename|call)\s+(?:them|him|her|it|the\s+advisor)\s+(?:to\s+)?(.+)$",
                ],
            ),
            CommandPattern::new(
                "update-role",
                UpdateField,
                Some(CommandField::Role),
                &[
                    r"^(?:change|set|update)\s+(?:the\s+|their\s+|his\s+|her\s+)?role\s+to\s+(.+)$",
                    r"^make\s+(?:them|him|her)\s+(?:an?\s+)?(.+)$",
                ],
            ),
            CommandPattern::new(
                "add-expertise",
                AddExpertise,
                None,
                &[
                    r"^add\s+(?:an?\s+)?(?:expertise|skill)\s+(?:in\s+)?(.+)$",
                    r"^(?:they|he|she)\s+(?:are|is)\s+(?:an?\s+)?expert\s+in\s+(.+)$",
                ],
            ),
            CommandPattern::new(
                "add-trait",
                AddTrait,
                None,
                &[r"^add\s+(?:a\s+|the\s+)?(?:personality\s+)?trait\s+(?:of\s+)?(.+)$"],
            ),
            CommandPattern::new(
                "set-communication-style",
                UpdateField,
                Some(CommandField::CommunicationStyle),
                &[
                    r"^(?:change|set|update)\s+(?:the\s+|their\s+)?(?:communication\s+)?style\s+to\s+(.+)$",
                    r"^(?:speak|talk|communicate)\s+(?:more\s+)?(\w+ly)$",
                ],
            ),
            CommandPattern::new(
                "save",
                Save,
                None,
                &[r"^(?:save|save\s+(?:it|this|changes|the\s+advisor)|done|finish|confirm)$"],
            ),
            CommandPattern::new(
                "cancel",
                Cancel,
                None,
                &[r"^(?:cancel|never\s*mind|discard(?:\s+changes)?|go\s+back)$"],
            ),
            CommandPattern::new(
                "select-advisor",
                SelectAdvisor,
                None,
                &[
                    r"^(?:select|choose|pick|switch\s+to)\s+(?:the\s+)?(?:advisor\s+)?(.+)$",
                    r"^(?:talk|speak)\s+(?:to|with)\s+(?:the\s+)?(?:advisor\s+)?(.+)$",
                ],
            ),
        ])
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::build_default()
    }
}

/// Recognize a command with the default table.
pub fn recognize(transcript: &str) -> Option<VoiceCommand> {
    CommandTable::default_table().recognize(transcript)
}

/// Trim and drop trailing sentence punctuation.
fn normalize(transcript: &str) -> &str {
    transcript
        .trim()
        .trim_end_matches(['.', ',', '!', '?'])
        .trim_end()
}
