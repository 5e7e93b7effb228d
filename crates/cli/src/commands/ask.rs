//! Ask command handler.
//!
//! Runs one question through the pipeline and prints the answer, or every
//! stream event as a JSON line.

use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use taxguide_core::{config::AppConfig, AppError, AppResult};
use taxguide_rag::{Answer, AskRequest, RagPipeline, StreamEvent};

/// Answer one question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Read a description of the asker's situation from a file
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Read the text of a document the question refers to from a file
    #[arg(long)]
    pub document: Option<PathBuf>,

    /// Print stream events as JSON lines instead of the final answer
    #[arg(long)]
    pub events: bool,

    /// Print the final answer as JSON
    #[arg(long, conflicts_with = "events")]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::debug!("Ask command options: {:?}", self);
        config.validate()?;

        let request = AskRequest {
            question: self.question.clone(),
            conversation_history: Vec::new(),
            document_context: read_optional(self.document.as_ref())?,
            profile_context: read_optional(self.profile.as_ref())?,
            stream: self.events,
        };

        let pipeline = RagPipeline::from_config(config).await?;

        if self.events {
            return self.print_events(Arc::new(pipeline), request).await;
        }

        let answer = pipeline.answer(request).await?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        } else {
            print_answer(&answer);
        }
        Ok(())
    }

    async fn print_events(&self, pipeline: Arc<RagPipeline>, request: AskRequest) -> AppResult<()> {
        let mut rx = pipeline.answer_stream(request);
        let stdout = std::io::stdout();

        while let Some(event) = rx.recv().await {
            let line = serde_json::to_string(&event)?;
            let mut out = stdout.lock();
            writeln!(out, "{}", line)?;
            out.flush()?;

            if let StreamEvent::Error { message } = &event {
                tracing::warn!("Pipeline reported an error: {}", message);
            }
        }
        Ok(())
    }
}

fn read_optional(path: Option<&PathBuf>) -> AppResult<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p)
            .map_err(|e| AppError::Config(format!("Failed to read {:?}: {}", p, e)))
    })
    .transpose()
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);

    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, citation) in answer.citations.iter().enumerate() {
            match &citation.url {
                Some(url) => println!("  [{}] {} <{}>", i + 1, citation.title, url),
                None => println!("  [{}] {}", i + 1, citation.title),
            }
        }
    }

    println!();
    println!("{}", answer.disclaimer);

    tracing::debug!(
        "Confidence {:?}, {} prompt / {} completion tokens, ${:.6}{}",
        answer.confidence,
        answer.usage.prompt_tokens,
        answer.usage.completion_tokens,
        answer.usage.cost_usd,
        if answer.usage.estimated { " (estimated)" } else { "" }
    );
}
