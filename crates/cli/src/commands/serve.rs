//! Serve command handler.
//!
//! `POST /api/ask` answers with a JSON [`Answer`], or with server-sent events
//! when the body sets `stream: true` or the client accepts
//! `text/event-stream`. `GET /health` reports liveness.
//!
//! [`Answer`]: taxguide_rag::Answer

use actix_web::http::{header, StatusCode};
use actix_web::web::{self, Bytes};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, ResponseError};
use clap::Args;
use std::fmt;
use std::sync::Arc;
use taxguide_core::{config::AppConfig, AppError, AppResult};
use taxguide_rag::{AskRequest, RagPipeline, StreamEvent};

pub const EVENT_STREAM: &str = "text/event-stream";

/// Serve the ask API over HTTP
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides server.port)
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServeCommand {
    pub async fn execute(&self, config: AppConfig) -> AppResult<()> {
        config.validate()?;

        let host = self.host.clone().unwrap_or_else(|| config.server.host.clone());
        let port = self.port.unwrap_or(config.server.port);

        let pipeline = web::Data::new(RagPipeline::from_config(&config).await?);

        tracing::info!("Listening on http://{}:{}", host, port);
        HttpServer::new(move || App::new().app_data(pipeline.clone()).configure(routes))
            .bind((host.as_str(), port))?
            .run()
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/ask", web::post().to(ask))
        .route("/health", web::get().to(health));
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    App(AppError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(message) => write!(f, "{}", message),
            ApiError::App(e) => write!(f, "{}", e),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::App(AppError::Retrieval(_))
            | ApiError::App(AppError::Embedding(_))
            | ApiError::App(AppError::Llm(_)) => StatusCode::BAD_GATEWAY,
            ApiError::App(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "taxguide"
    }))
}

fn wants_event_stream(req: &HttpRequest, body: &AskRequest) -> bool {
    body.stream
        || req
            .headers()
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(EVENT_STREAM))
}

/// One SSE frame: `data: <json>` and a blank line.
pub fn sse_frame(event: &StreamEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {}\n\n", json)),
        Err(e) => {
            tracing::error!("Failed to encode {} event: {}", event.kind(), e);
            Bytes::new()
        }
    }
}

async fn ask(
    req: HttpRequest,
    pipeline: web::Data<RagPipeline>,
    body: web::Json<AskRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    if !wants_event_stream(&req, &body) {
        let answer = pipeline.answer(body).await?;
        return Ok(HttpResponse::Ok().json(answer));
    }

    let pipeline: Arc<RagPipeline> = pipeline.into_inner();
    let rx = pipeline.answer_stream(body);

    // Dropping the body (client gone) drops the receiver and stops generation
    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, actix_web::Error>(sse_frame(&event)), rx))
    });

    Ok(HttpResponse::Ok()
        .content_type(EVENT_STREAM)
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(events))
}
