//! Prompt types for taxguide.

use serde::{Deserialize, Serialize};

/// A prompt definition, built in or loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Behavioral settings
    pub behavior: PromptBehavior,

    /// System instruction template with Handlebars syntax
    pub template: String,

    /// Output specification
    pub output: PromptOutputSpec,
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    /// Tone (e.g., "professional", "plain-language")
    pub tone: String,

    /// Style (e.g., "concise", "detailed")
    pub style: String,
}

/// Output specification for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format (e.g., "markdown")
    pub format: String,
}

/// One retrieved passage exposed to the template.
#[derive(Debug, Clone, Serialize)]
pub struct GroundingSource {
    /// 1-based position, used for "[Source N]" references
    pub index: usize,

    /// Document title
    pub title: String,

    /// Section path, e.g. "RRSP Guide > Contributions"
    pub section: String,

    /// Passage text
    pub content: String,
}

/// Everything the system template can refer to.
///
/// A closed record: templates see exactly these fields and nothing else.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    /// Retrieved passages, best first
    pub sources: Vec<GroundingSource>,

    /// Summary of the asker's tax profile, if provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Text of a document the asker supplied, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,

    /// Set when retrieval confidence is not high
    pub cautious: bool,

    /// Tone and style copied from the definition
    pub tone: String,
    pub style: String,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltPrompt {
    /// Rendered system instruction
    pub system: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    pub source_prompt_id: String,

    /// Number of grounding passages embedded
    pub source_count: usize,

    /// Whether a profile block was included
    pub profile_included: bool,

    /// Whether a user document block was included
    pub document_included: bool,
}
