use analyst_pipeline::{AnalystService, HeuristicLlm};
use analyst_protocol::{AnalysisEvent, ContextBounds, QueryRequest};
use analyst_store::{CodeIndex, FileStore, GitStore};
use analyst_tools::{ToolRegistry, Toolbox};
use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "repo-analyst")]
#[command(about = "Ask questions about a repository and get cited answers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project and report what was found
    Index {
        /// Project path to index
        path: PathBuf,
    },

    /// Locate code by symbol, text, or meaning
    Search {
        /// Search query
        query: String,

        /// Project path (defaults to current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Path prefix to limit search scope
        #[arg(short, long)]
        scope: Option<String>,
    },

    /// Read a bounded file slice, recovering from near-miss paths
    Read {
        /// File path (relative to project root)
        path: String,

        /// Project path (defaults to current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// First line (1-indexed)
        #[arg(long)]
        start: Option<usize>,

        /// Last line (inclusive)
        #[arg(long)]
        end: Option<usize>,
    },

    /// List symbols defined in a file
    Symbols {
        /// File path (relative to project root)
        file: String,

        /// Project path (defaults to current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Run the full analysis pipeline against a question
    Ask {
        /// The question to answer
        query: String,

        /// Project path (defaults to current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Session id for cross-request context
        #[arg(long)]
        session: Option<String>,

        /// Print stage events as they happen
        #[arg(long)]
        events: bool,
    },
}

fn project_root(project: Option<PathBuf>) -> Result<PathBuf> {
    let root = match project {
        Some(path) => path,
        None => std::env::current_dir().context("failed to determine current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("invalid project path {}", root.display()))
}

async fn build_toolbox(root: &PathBuf) -> Result<(Arc<Toolbox>, ToolRegistry)> {
    let index = Arc::new(
        CodeIndex::build(root)
            .await
            .with_context(|| format!("failed to index {}", root.display()))?,
    );
    let files = Arc::new(FileStore::new(root));
    let git = Arc::new(GitStore::new(root));
    let toolbox = Arc::new(Toolbox::new(index, files, git, ContextBounds::default()));
    let registry = ToolRegistry::builtin()?;
    Ok((toolbox, registry))
}

async fn run_tool(
    root: PathBuf,
    tool: &str,
    arguments: serde_json::Value,
) -> Result<()> {
    let (toolbox, registry) = build_toolbox(&root).await?;
    let result = registry.invoke(&toolbox, tool, arguments).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    match cli.command {
        Commands::Index { path } => {
            let root = project_root(Some(path))?;
            let index = CodeIndex::build(&root)
                .await
                .with_context(|| format!("failed to index {}", root.display()))?;
            let output = json!({
                "root": root.display().to_string(),
                "files": index.files().len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Search {
            query,
            project,
            scope,
        } => {
            let root = project_root(project)?;
            run_tool(
                root,
                "search_code",
                json!({ "query": query, "scope": scope }),
            )
            .await?;
        }

        Commands::Read {
            path,
            project,
            start,
            end,
        } => {
            let root = project_root(project)?;
            run_tool(
                root,
                "read_code",
                json!({ "path": path, "start_line": start, "end_line": end }),
            )
            .await?;
        }

        Commands::Symbols { file, project } => {
            let root = project_root(project)?;
            run_tool(root, "get_file_symbols", json!({ "path": file })).await?;
        }

        Commands::Ask {
            query,
            project,
            session,
            events,
        } => {
            let root = project_root(project)?;
            let service = AnalystService::open(&root, Arc::new(HeuristicLlm::new())).await?;

            let mut request = QueryRequest::new(query);
            request.session_id = session;

            if events {
                let (handle, mut rx) = service.query_stream(request);
                while let Some(event) = rx.recv().await {
                    match event {
                        AnalysisEvent::Stage(event) => {
                            eprintln!(
                                "[{}] {} {:?}: {}",
                                event.timestamp_ms, event.stage, event.status, event.summary
                            );
                        }
                        AnalysisEvent::Terminal(event) => {
                            println!("{}", event.response.final_response);
                            if let Some(explanation) = event.explanation {
                                eprintln!("note: {explanation}");
                            }
                        }
                    }
                }
                handle.task.await.context("runtime task panicked")?;
            } else {
                let response = service.query(request).await?;
                println!("{}", response.final_response);
                if let Some(explanation) = response.termination_reason.explanation() {
                    eprintln!("note: {explanation}");
                }
            }
        }
    }

    Ok(())
}
