use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod config;
mod error;
mod extract;
mod llm;
mod rag;
mod resolver;
mod server;
mod service;
mod store;
#[cfg(test)]
mod testing;

use config::Config;
use service::AiService;

#[derive(Parser)]
#[command(name = "noterag")]
#[command(version = "1.0")]
#[command(about = "Lecture note Q&A, summaries and quizzes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Run the HTTP API (Default)
    Serve {
        /// Address to listen on, overrides the configured one
        #[arg(long)]
        bind: Option<String>,
    },
    /// Ask a question about a note
    Ask { note_id: String, question: String },
    /// Summarize a note in an exact number of lines
    Summarize {
        note_id: String,
        #[arg(long, default_value_t = 3)]
        lines: usize,
    },
    /// Generate a multiple-choice quiz for a note
    Quiz {
        note_id: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Extract text from a local PDF, with OCR for image-only pages
    ExtractPdf { path: std::path::PathBuf },
    /// Write the effective configuration (file + environment) to the config file
    SaveConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let app_dir = Config::get_app_data_dir();
    let file_appender = tracing_appender::rolling::daily(&app_dir, "noterag.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,noterag=debug".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::EnvFilter::new(file_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Config::load();
    if config.llm.api_key.is_none() {
        tracing::warn!("No API key configured; set OPENAI_API_KEY unless the endpoint is local");
    }

    let command = cli.command.unwrap_or(Commands::Serve { bind: None });

    match command {
        Commands::SaveConfig => {
            config.save()?;
            println!("Configuration written to {}", app_dir.join("config.json").display());
        }
        Commands::ExtractPdf { path } => {
            let extractor = extract::PdfExtractor::with_system_tools(config.extraction.clone())?;
            let pages = extractor.extract_local(&path).await?;
            println!("{}", extract::combine_pages(&pages));
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let service = Arc::new(AiService::from_config(config)?);
            serve(service, &bind).await?;
        }
        Commands::Ask { note_id, question } => {
            let service = AiService::from_config(config)?;
            println!("{}", service.ask(&note_id, &question, true).await?);
        }
        Commands::Summarize { note_id, lines } => {
            let service = AiService::from_config(config)?;
            println!("{}", service.summarize(&note_id, lines, true).await?);
        }
        Commands::Quiz { note_id, count } => {
            let service = AiService::from_config(config)?;
            let quizzes = service.generate_quiz(&note_id, count, true).await;
            println!("{}", serde_json::to_string_pretty(&quizzes)?);
        }
    }

    Ok(())
}

async fn serve(service: Arc<AiService>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("NoteRag AI service listening on {}", bind);

    axum::serve(listener, server::router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down, {} cached indexes released", service.cached_indexes());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
