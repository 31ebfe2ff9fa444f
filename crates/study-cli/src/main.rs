use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use study_client::{AssistantApi, MessageRole, OpenAIAssistantClient, ThreadMessage};
use study_core::{ChatRole, ChatTurn, Config, DocumentHandle};
use study_session::{
    learn_file_names, CitationResolver, ConversationSession, DocumentStore, FileNames,
    RetryPolicy, RunOptions, SessionError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const QUIT_COMMAND: &str = "/quit";

#[derive(Parser)]
#[command(name = "study-buddy")]
#[command(about = "Chat with an assistant about your own documents")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload documents and print their file ids
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Upload documents and chat about them
    Chat {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the messages of a thread
    History {
        /// Thread to show; defaults to THREAD_ID
        #[arg(long)]
        thread_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = Config::load().context("Failed to load configuration")?;
    tracing::debug!("Using API base {}", config.api_base);

    let api: Arc<dyn AssistantApi> = Arc::new(OpenAIAssistantClient::from_config(&config)?);

    match cli.command {
        Commands::Upload { files } => upload(&config, api, &files).await,
        Commands::Chat { files } => chat(&config, api, &files).await,
        Commands::History { thread_id } => history(&config, api, thread_id).await,
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(debug)
                .with_file(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn document_store(config: &Config, api: Arc<dyn AssistantApi>) -> DocumentStore {
    DocumentStore::new(api, config.scratch_dir.clone()).with_retry_policy(RetryPolicy {
        max_retries: config.upload_max_retries,
        ..RetryPolicy::default()
    })
}

async fn upload_all(store: &DocumentStore, files: &[PathBuf]) -> anyhow::Result<Vec<DocumentHandle>> {
    let mut handles = Vec::with_capacity(files.len());
    for file in files {
        let handle = store
            .upload_path(file)
            .await
            .with_context(|| format!("Failed to upload {}", file.display()))?;
        println!(
            "{}",
            format!("File ID:: {} ({})", handle.id, handle.display_name).green()
        );
        handles.push(handle);
    }
    Ok(handles)
}

async fn upload(config: &Config, api: Arc<dyn AssistantApi>, files: &[PathBuf]) -> anyhow::Result<()> {
    let store = document_store(config, api);
    upload_all(&store, files).await?;
    Ok(())
}

async fn chat(config: &Config, api: Arc<dyn AssistantApi>, files: &[PathBuf]) -> anyhow::Result<()> {
    let options = RunOptions::from_config(config)?;
    let store = document_store(config, api.clone());
    let mut session = ConversationSession::new(api, options);

    for handle in upload_all(&store, files).await? {
        session.attach_document(handle)?;
    }
    let thread_id = session.start().await?;

    println!("{}", "📚 Study Buddy".cyan().bold());
    println!("{}", format!("Thread ID: {}", thread_id).dimmed());
    println!(
        "{}",
        format!("Type {} or press Ctrl-D to leave", QUIT_COMMAND).dimmed()
    );
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input == QUIT_COMMAND {
            break;
        }
        if input.is_empty() {
            continue;
        }

        println!("{}", "Wait... Generating response...".dimmed());
        match ask(&mut session, input).await {
            Ok(turns) => {
                for turn in &turns {
                    print_turn(turn);
                }
            }
            Err(SessionError::Cancelled) => println!("{}", "Cancelled".yellow()),
            Err(e) => println!("{}", format!("❌ Error: {}", e).red()),
        }
        println!();
    }

    println!("{}", "👋 Goodbye!".cyan());
    Ok(())
}

/// Submit one utterance; Ctrl-C while waiting cancels the run.
async fn ask(session: &mut ConversationSession, input: &str) -> Result<Vec<ChatTurn>, SessionError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = session.submit_utterance_with_cancel(input, &cancel).await;
    watcher.abort();
    result
}

fn print_prompt() -> anyhow::Result<()> {
    use std::io::Write;

    print!("{} ", "You:".cyan().bold());
    std::io::stdout().flush()?;
    Ok(())
}

fn print_turn(turn: &ChatTurn) {
    let tag = match turn.role {
        ChatRole::User => "You:".cyan().bold(),
        ChatRole::Assistant => "Assistant:".green().bold(),
    };
    println!("{}", tag);
    println!("{}", turn.content.trim_end());
}

async fn history(
    config: &Config,
    api: Arc<dyn AssistantApi>,
    thread_id: Option<String>,
) -> anyhow::Result<()> {
    let Some(thread_id) = thread_id.or_else(|| config.thread_id.clone()) else {
        anyhow::bail!("No thread given; pass --thread-id or set THREAD_ID");
    };

    let mut messages = api.list_messages(&thread_id).await?;
    messages.reverse();

    let mut names = FileNames::new();
    learn_file_names(api.as_ref(), &mut names, &messages).await;
    let resolver = CitationResolver::new(&names);

    println!("{}", format!("Thread ID: {}", thread_id).dimmed());
    for message in &messages {
        print_turn(&history_turn(&resolver, message)?);
        println!();
    }
    Ok(())
}

fn history_turn(
    resolver: &CitationResolver<'_, FileNames>,
    message: &ThreadMessage,
) -> anyhow::Result<ChatTurn> {
    Ok(match message.role {
        MessageRole::User => ChatTurn::user(
            message
                .text_parts()
                .map(|part| part.value.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        MessageRole::Assistant => ChatTurn::assistant(resolver.resolve_message(message)?.display()),
    })
}
