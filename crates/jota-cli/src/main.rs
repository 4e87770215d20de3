use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod app;
mod commands;

#[derive(Parser)]
#[command(name = "jota")]
#[command(about = "Jota - a conversational assistant grounded in a courses database")]
#[command(version)]
struct Cli {
    /// Run a single prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Your name, as shown to the assistant
    #[arg(short, long)]
    name: Option<String>,

    /// Model for replies and classification
    #[arg(short, long)]
    model: Option<String>,

    /// SQLite database used for search results
    #[arg(long)]
    database: Option<PathBuf>,

    /// File describing the database schema
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reply without classifying or searching
    #[arg(long)]
    no_hints: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut settings = match cli.config {
        Some(ref path) => jota_core::Settings::load_from(path)?,
        None => jota_core::Settings::load(),
    };

    if let Some(ref model) = cli.model {
        settings.llm.chat_model = model.clone();
    }
    if let Some(database) = cli.database {
        settings.sql.database = Some(database);
    }
    if let Some(schema) = cli.schema {
        settings.sql.schema_file = Some(schema);
    }
    if cli.no_hints {
        settings.classifier.enabled = false;
    }

    if let Some(prompt) = cli.prompt {
        let sender = cli.name.unwrap_or_else(|| "user".to_string());
        app::run_single_prompt(&settings, &sender, &prompt).await?;
    } else {
        app::run_chat(&settings, cli.name).await?;
    }

    Ok(())
}
