//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TapestryError};

/// Settings of a generation session. Every field has a default, so a JSON
/// document only needs the fields it changes:
///
/// ```json
/// { "userCodeBegin": "# BEGIN", "userCodeEnd": "# END", "maxDepth": 32 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    /// Text emitted by `startUserCode`.
    pub user_code_begin: String,
    /// Text emitted by `endUserCode`.
    pub user_code_end: String,
    /// Extension of script files, without the dot.
    pub script_extension: String,
    /// Appended to a generated path to name its lost-code file.
    pub lost_suffix: String,
    /// Maximum nesting of template calls.
    pub max_depth: usize,
    /// Maximum iteration count of a `for` over an integer.
    pub max_iterations: usize,
    /// Emitted by `nl`.
    pub line_separator: String,
    /// Spaces added by `indentSpace`.
    pub indent_width: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_code_begin: "// Start of user code".to_string(),
            user_code_end: "// End of user code".to_string(),
            script_extension: "tpl".to_string(),
            lost_suffix: ".lost".to_string(),
            max_depth: 64,
            max_iterations: 1_000_000,
            line_separator: "\n".to_string(),
            indent_width: 4,
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let problem = if self.user_code_begin.is_empty() || self.user_code_end.is_empty() {
            Some("user code markers must not be empty")
        } else if self.user_code_begin == self.user_code_end {
            Some("user code markers must differ")
        } else if self.script_extension.is_empty() || self.script_extension.contains(['.', '/']) {
            Some("script extension must be a plain, non-empty suffix")
        } else if self.lost_suffix.is_empty() {
            Some("lost code suffix must not be empty")
        } else if self.max_depth == 0 {
            Some("maximum depth must be positive")
        } else if self.max_iterations == 0 {
            Some("maximum iteration count must be positive")
        } else {
            None
        };
        match problem {
            Some(message) => Err(TapestryError::InvalidSettings {
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}
