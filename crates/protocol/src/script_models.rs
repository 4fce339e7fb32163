//! Script models handed to the supervisor by the access layer.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

/// Script languages the supervisor knows how to launch.
///
/// Each variant maps to a launch strategy (see
/// [`LaunchStrategy`](crate::config_models::LaunchStrategy)).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TS)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    /// Interpreted with `python3`.
    Python,

    /// Compiled and run with `go run`.
    Golang,

    /// Interpreted with `sh`.
    Shell,
}

impl ScriptType {
    pub const ALL: [ScriptType; 3] = [ScriptType::Python, ScriptType::Golang, ScriptType::Shell];

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptType::Python => "python",
            ScriptType::Golang => "golang",
            ScriptType::Shell => "shell",
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a declared script type has no matching [`ScriptType`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown script type '{0}'")]
pub struct UnknownScriptType(pub String);

impl FromStr for ScriptType {
    type Err = UnknownScriptType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(ScriptType::Python),
            "golang" | "go" => Ok(ScriptType::Golang),
            "shell" | "sh" => Ok(ScriptType::Shell),
            other => Err(UnknownScriptType(other.to_string())),
        }
    }
}

/// A script as resolved for a specific caller.
///
/// The declared type is kept as free text because it comes from an
/// external store; the launcher decides whether it is supported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ScriptSource {
    #[ts(type = "string")]
    pub id: Uuid,

    #[ts(type = "string")]
    pub owner_id: Uuid,

    pub name: String,

    pub content: String,

    /// Declared script type, e.g. `"python"` or `"golang"`.
    #[serde(rename = "type")]
    pub script_type: String,
}
