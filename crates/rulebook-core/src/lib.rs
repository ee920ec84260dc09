pub mod error;
pub mod frontmatter;
pub mod matcher;
pub mod paths;
pub mod repository;

pub use error::{Error, Result};
pub use matcher::{match_rules, RuleMatcher};
pub use repository::{FileSystemRuleRepository, RuleRepository, RuleSource};

use serde::{Deserialize, Serialize};

// --- Types ---

/// Applicability metadata stored in a rule's frontmatter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetadata {
    /// File-type patterns of the form "*.ts". One extension per pattern.
    pub file_types: Vec<String>,
    /// Folder scopes, e.g. "src/components". An empty string matches every path.
    pub folders: Vec<String>,
    /// Optional tag such as "style" or "refactor". Only queries with the same intent match it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Higher priorities sort first. Missing counts as 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl RuleMetadata {
    /// A rule needs at least one file type and one folder scope to ever match.
    pub fn is_valid(&self) -> bool {
        !self.file_types.is_empty() && !self.folders.is_empty()
    }

    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }
}

/// A rule document. The id is its path relative to the rules directory, with `/` separators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct Rule {
    pub id: String,
    pub content: String,
    pub metadata: RuleMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatchCriteria {
    /// File paths being worked on. Either `/` or `\` separators.
    pub file_paths: Vec<String>,
    /// Optional intent filter (e.g. "refactor", "style", "pattern"). When set, only rules tagged with exactly this intent match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl RuleMatchCriteria {
    pub fn for_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            file_paths: paths.into_iter().map(Into::into).collect(),
            intent: None,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }
}
