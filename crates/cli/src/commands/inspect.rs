//! Inspect command handler.
//!
//! Shows the redacted text and the classification it produces, without
//! calling any provider.

use clap::Args;
use taxguide_core::AppResult;
use taxguide_rag::{redact, QueryClassifier};

/// Show what redaction and classification make of a text
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Text to inspect
    pub text: String,
}

impl InspectCommand {
    pub fn execute(&self) -> AppResult<()> {
        let redaction = redact(&self.text);
        let classification = QueryClassifier::new().classify(&redaction.text);

        let output = serde_json::json!({
            "redaction": redaction,
            "classification": classification,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
