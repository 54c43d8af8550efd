use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use colloquy::auth::{AuthSynchronizer, DurableTier, MemoryTier};
use colloquy::channel::{ConsoleAdapter, InboundTurn};
use colloquy::cli::{Cli, Commands};
use colloquy::config::Settings;
use colloquy::core::completion::CompletionClient;
use colloquy::core::index::DocumentIndex;
use colloquy::core::verifier::CredentialVerifier;
use colloquy::store::{
    DocumentStore, HistoryReader, InMemoryStore, MessageStore, SqliteStore, SummaryStore,
};
use colloquy::tools::executor::ToolExecutor;
use colloquy::tools::registry::ToolRegistry;
use colloquy::tools::search::KnowledgeSearchTool;
use colloquy::tools::ToolConfig;
use colloquy::{utils, Bot};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone())),
        )
        .init();

    let cli = Cli::parse();

    let store: Arc<dyn DocumentStore> = match settings.store.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "sqlite" => Arc::new(SqliteStore::open(Path::new(&settings.store.path))?),
        other => anyhow::bail!("unknown store backend '{other}' (expected 'sqlite' or 'memory')"),
    };

    let summaries = Arc::new(SummaryStore::new(
        store.clone(),
        settings.store.touch_attempts,
    ));

    match cli.command {
        Commands::Console {
            conversation_id,
            user_id,
            display_name,
        } => {
            let bot = build_bot(&settings, store, summaries)?;
            run_console(bot, conversation_id, user_id, display_name).await
        }
        Commands::History {
            conversation_id,
            user_id,
            limit,
        } => {
            let reader = HistoryReader::new(store);
            for record in reader.history(&conversation_id, &user_id, limit).await {
                println!(
                    "{}  {:>9}  {}",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.role,
                    record.text
                );
            }
            Ok(())
        }
        Commands::Conversations => {
            for summary in summaries.active().await {
                println!(
                    "{}  {:>5} msgs  last active {}  {}",
                    summary.conversation_id,
                    summary.message_count,
                    summary.last_activity_at.format("%Y-%m-%d %H:%M"),
                    summary.display_name
                );
            }
            Ok(())
        }
        Commands::Archive { conversation_id } => {
            if summaries.archive(&conversation_id).await {
                utils::print_system(&format!("archived {conversation_id}"));
            } else {
                utils::print_error(&format!("no summary for {conversation_id}"));
            }
            Ok(())
        }
        Commands::Purge => {
            let removed = store
                .purge_expired(Utc::now())
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            utils::print_system(&format!("purged {removed} expired message records"));
            Ok(())
        }
    }
}

fn build_bot(
    settings: &Settings,
    store: Arc<dyn DocumentStore>,
    summaries: Arc<SummaryStore>,
) -> Result<Bot> {
    let api_key = Settings::api_key()?;

    let auth = AuthSynchronizer::new(
        Arc::new(MemoryTier::new()),
        Arc::new(DurableTier::new(store.clone())),
    );
    let history = HistoryReader::new(store.clone());
    let messages = MessageStore::new(
        store,
        summaries,
        settings.store.max_message_chars,
        settings.store.retention_days,
    );

    let completion = CompletionClient::new(api_key, settings.completion.clone());
    let verifier = CredentialVerifier::new(settings.verifier.clone());
    let index = Arc::new(DocumentIndex::new(settings.index.clone()));

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(KnowledgeSearchTool::new(index)));

    Ok(Bot::new(
        auth,
        history,
        messages,
        completion,
        verifier,
        Arc::new(tools),
        ToolExecutor::new(ToolConfig::default()),
        settings.history.limit,
        settings.completion.max_tool_rounds,
    ))
}

async fn run_console(
    bot: Bot,
    conversation_id: String,
    user_id: String,
    display_name: String,
) -> Result<()> {
    utils::print_banner("colloquy console");
    utils::print_system("Type your messages. `/login <username> <password>` to sign in, `logout` to sign out, Ctrl+C to exit.\n");

    let adapter = ConsoleAdapter::new();
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt("you: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            return Ok(());
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let turn = match input.strip_prefix("/login ") {
            Some(rest) => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(username), Some(password)) => {
                        let mut turn = InboundTurn::text(
                            conversation_id.clone(),
                            user_id.clone(),
                            display_name.clone(),
                            "",
                        );
                        turn.payload = Some(json!({"username": username, "password": password}));
                        turn
                    }
                    _ => {
                        utils::print_error("usage: /login <username> <password>");
                        continue;
                    }
                }
            }
            None => InboundTurn::text(
                conversation_id.clone(),
                user_id.clone(),
                display_name.clone(),
                input,
            ),
        };

        if let Err(err) = bot.handle_turn(&turn, &adapter).await {
            utils::print_error(&format!("channel send failed: {err}"));
        }
    }
}
