//! Prompt loader for YAML prompt definitions.

use crate::types::{PromptBehavior, PromptDefinition, PromptOutputSpec};
use std::path::Path;
use taxguide_core::{AppError, AppResult};

/// Identifier of the built-in grounded answer prompt.
pub const DEFAULT_PROMPT_ID: &str = "answer.grounded";

const DEFAULT_TEMPLATE: &str = r#"You are a careful assistant answering Canadian personal tax questions.

Answer ONLY from the sources below. If the sources do not contain enough information to answer, say so explicitly and suggest where the user could look instead. Never invent amounts, dates, limits or form numbers.
{{#if cautious}}
The retrieved sources are only a partial match for this question. Be conservative and point out anything you could not confirm.
{{/if}}
Formatting rules:
- Write in a {{tone}}, {{style}} style.
- Use **bold** for every dollar amount, percentage and deadline.
- Use short headed sections (### Heading) when the answer covers more than one topic.
- Use bullet points whenever you list three or more items.
- Refer to sources inline as [Source N].
- End with a single line starting with "Sources:" listing the titles you relied on.
{{#if profile}}

## About the user
{{profile}}
{{/if}}
{{#if document}}

## Document provided by the user
{{document}}
{{/if}}

## Sources
{{#each sources}}

[Source {{index}}] {{title}}{{#if section}} ({{section}}){{/if}}
{{content}}
{{else}}

(no sources were found for this question)
{{/each}}
"#;

/// The prompt used when no override file is configured.
pub fn default_prompt() -> PromptDefinition {
    PromptDefinition {
        id: DEFAULT_PROMPT_ID.to_string(),
        title: "Grounded tax answer".to_string(),
        api_version: "1.0".to_string(),
        behavior: PromptBehavior {
            tone: "plain-language".to_string(),
            style: "concise".to_string(),
        },
        template: DEFAULT_TEMPLATE.to_string(),
        output: PromptOutputSpec {
            format: "markdown".to_string(),
        },
    }
}

/// Load a prompt definition from a YAML file.
pub fn load_prompt(path: &Path) -> AppResult<PromptDefinition> {
    tracing::debug!("Loading prompt from: {:?}", path);

    if !path.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            path
        )));
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Prompt(format!("Failed to read prompt file {:?}: {}", path, e)))?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {:?}: {}", path, e)))?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Load the configured override, or fall back to the built-in prompt.
pub fn load_prompt_or_default(path: Option<&Path>) -> AppResult<PromptDefinition> {
    match path {
        Some(path) => load_prompt(path),
        None => Ok(default_prompt()),
    }
}

fn validate_prompt(definition: &PromptDefinition) -> AppResult<()> {
    if definition.id.trim().is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if definition.template.trim().is_empty() {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' has an empty template",
            definition.id
        )));
    }

    if !definition.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid API version format: {}",
            definition.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_prompt_is_valid() {
        let def = default_prompt();
        assert!(validate_prompt(&def).is_ok());
        assert_eq!(def.id, DEFAULT_PROMPT_ID);
    }

    #[test]
    fn test_load_prompt_from_file() {
        let file = write_yaml(
            r#"
id: answer.short
title: Short answers
apiVersion: "1.0"
behavior:
  tone: friendly
  style: brief
template: "Use only these: {{#each sources}}{{title}} {{/each}}"
output:
  format: markdown
"#,
        );

        let def = load_prompt(file.path()).unwrap();
        assert_eq!(def.id, "answer.short");
        assert_eq!(def.behavior.style, "brief");
    }

    #[test]
    fn test_load_prompt_missing_file() {
        let result = load_prompt(Path::new("/nonexistent/prompt.yml"));
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_load_prompt_rejects_bad_version() {
        let file = write_yaml(
            r#"
id: answer.bad
title: Bad
apiVersion: "1"
behavior:
  tone: friendly
  style: brief
template: "x"
output:
  format: markdown
"#,
        );

        let err = load_prompt(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid API version"));
    }

    #[test]
    fn test_load_prompt_or_default_without_path() {
        let def = load_prompt_or_default(None).unwrap();
        assert_eq!(def.id, DEFAULT_PROMPT_ID);
    }
}
