//! # Course RAG CLI (`rag`)
//!
//! Ingest course documents and answer questions about them.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag ingest <folder>` | Ingest a folder of course documents |
//! | `rag courses` | List indexed courses |
//! | `rag query "<question>"` | Answer a question |
//! | `rag serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! rag init
//! rag ingest ./docs --clear
//! rag query "What does lesson 2 of the MCP course cover?"
//! rag query "And lesson 3?" --session 5d1c...
//! rag serve --docs ./docs
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use course_rag::config::{self, Config};
use course_rag::rag::RagSystem;
use course_rag::{logging, migrate, server};

#[derive(Parser)]
#[command(
    name = "rag",
    about = "Course RAG: answer questions about course materials",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml`.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Ingest a folder of course documents (.txt, .pdf, .docx).
    ///
    /// Courses whose title is already indexed are skipped.
    Ingest {
        /// Folder to walk.
        folder: PathBuf,

        /// Clear the index before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// List indexed courses with their lesson counts.
    Courses,

    /// Answer a question about the indexed courses.
    Query {
        /// The question.
        query: String,

        /// Session id from a previous answer, to continue the conversation.
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP server.
    Serve {
        /// Ingest this folder before serving.
        #[arg(long)]
        docs: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("ok");
        }
        Commands::Ingest { folder, clear } => {
            let rag = build(cfg).await?;
            ingest(&rag, &folder, clear).await?;
        }
        Commands::Courses => {
            let rag = build(cfg).await?;
            let courses = rag.index().courses().await?;
            println!("courses: {}", courses.len());
            for course in &courses {
                println!("  {} ({} lessons)", course.title, course.lessons.len());
            }
        }
        Commands::Query { query, session } => {
            let rag = build(cfg).await?;
            let resp = rag
                .answer(&query, session.as_deref())
                .await
                .context("query failed")?;
            println!("{}", resp.answer);
            if !resp.sources.is_empty() {
                println!();
                println!("sources:");
                for source in &resp.sources {
                    match &source.link {
                        Some(link) => println!("  {} <{}>", source.label, link),
                        None => println!("  {}", source.label),
                    }
                }
            }
            println!();
            println!("session: {}", resp.session_id);
        }
        Commands::Serve { docs } => {
            let rag = build(cfg).await?;
            if let Some(folder) = docs {
                ingest(&rag, &folder, false).await?;
            }
            server::run_server(Arc::new(rag)).await?;
        }
    }

    Ok(())
}

async fn build(cfg: Config) -> anyhow::Result<RagSystem> {
    RagSystem::from_config(cfg)
        .await
        .context("failed to initialize the query pipeline")
}

async fn ingest(rag: &RagSystem, folder: &Path, clear: bool) -> anyhow::Result<()> {
    let report = rag
        .add_course_folder(folder, clear)
        .await
        .with_context(|| format!("failed to ingest {}", folder.display()))?;

    for title in &report.skipped {
        println!("skipped (already indexed): {}", title);
    }
    for (path, reason) in &report.failed {
        println!("failed: {} ({})", path.display(), reason);
    }
    println!("added courses: {}", report.courses_added);
    println!("added units: {}", report.units_added);
    println!("ok");
    Ok(())
}
