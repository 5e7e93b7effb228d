//! Prompt builder for rendering the grounded system instruction.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptContext, PromptDefinition};
use handlebars::Handlebars;
use serde::Serialize;
use taxguide_core::{AppError, AppResult};

/// Render a prompt definition against retrieved sources and user context.
///
/// Tone and style are copied from the definition into `context` before
/// rendering, so templates can refer to `{{tone}}` and `{{style}}`.
pub fn build_prompt(
    definition: &PromptDefinition,
    mut context: PromptContext,
) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        "Building prompt {} with {} sources",
        definition.id,
        context.sources.len()
    );

    context.tone = definition.behavior.tone.clone();
    context.style = definition.behavior.style.clone();

    let system = render_template(&definition.template, &context)?;

    Ok(BuiltPrompt {
        system,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            source_count: context.sources.len(),
            profile_included: context.profile.is_some(),
            document_included: context.document.is_some(),
        },
    })
}

fn render_template<T: Serialize>(template: &str, data: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
