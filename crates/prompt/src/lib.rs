//! Prompt system for taxguide.
//!
//! Structured prompt management with:
//! - YAML-based prompt definitions (optional override of the built-in one)
//! - Handlebars rendering of the grounded system instruction
//! - Retrieved-source, profile and document context injection

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{default_prompt, load_prompt, load_prompt_or_default};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, GroundingSource, PromptBehavior, PromptContext,
    PromptDefinition, PromptOutputSpec,
};
