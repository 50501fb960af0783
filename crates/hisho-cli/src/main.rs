//! Hisho CLI: a terminal secretary for your calendar and mail.

mod render;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use futures_util::StreamExt;
use hisho_api::GeminiProvider;
use hisho_auth::CredentialManager;
use hisho_config::{CliOverrides, HishoConfig};
use hisho_core::{ReplyFragment, Secretary, StartReport};
use hisho_types::{HishoError, Usage};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hisho", version, about = "A terminal secretary for your calendar and mail")]
struct Cli {
    /// Send a single request and print the reply (non-interactive)
    #[arg(short, long)]
    print: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// API key (overrides HISHO_API_KEY / GEMINI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Tool server announce URL (overrides HISHO_MCP_URL)
    #[arg(long)]
    mcp_url: Option<String>,

    /// Maximum tool-calling rounds per request
    #[arg(long)]
    max_tool_rounds: Option<usize>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = HishoConfig::load(CliOverrides {
        api_key: cli.api_key,
        model: cli.model,
        mcp_url: cli.mcp_url,
        max_tool_rounds: cli.max_tool_rounds,
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut secretary = create_secretary(&config)?;
    secretary.on_tool_activity(|activity| {
        eprintln!("{}", render::tool_activity_line(&activity));
    });

    if let Some(request) = cli.print {
        // Print mode: one request, fail fast when the tool server is down
        let report = secretary.start().await.map_err(report_error)?;
        warn_missing(&report);
        let usage = stream_reply(&secretary, &request).await.map_err(report_error)?;
        eprintln!("{}", render::usage(&usage));
        secretary.disconnect();
        return Ok(());
    }

    repl(&secretary, &config).await
}

fn create_secretary(config: &HishoConfig) -> Result<Secretary> {
    let store = config
        .auth
        .credential_store()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let credentials = CredentialManager::with_safety_margin(store, config.auth.safety_margin());
    let provider = GeminiProvider::new(&config.api_key, &config.base_url)
        .context("Failed to create API client")?;
    Ok(Secretary::new(
        config.secretary_config(),
        Arc::new(provider),
        credentials,
    ))
}

async fn repl(secretary: &Secretary, config: &HishoConfig) -> Result<()> {
    eprintln!("hisho v{} (model: {})", env!("CARGO_PKG_VERSION"), config.model);
    match secretary.start().await {
        Ok(report) => {
            eprintln!(
                "Connected to {} {} ({} tools)",
                report.server.name,
                report.server.version,
                report.tools.len()
            );
            warn_missing(&report);
        }
        Err(e) => {
            print_error(&e);
            eprintln!("Tools are unavailable until /reconnect succeeds.");
        }
    }
    eprintln!("Type your request. Ctrl+C cancels a reply, Ctrl+D exits.\n");

    let stdin = io::stdin();
    let mut total_usage = Usage::default();

    loop {
        eprint!("> ");
        io::stderr().flush()?;

        let mut input = String::new();
        let bytes_read = stdin.lock().read_line(&mut input)?;
        if bytes_read == 0 {
            eprintln!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(handled) = handle_slash_command(input, secretary, &total_usage).await {
            match handled {
                SlashResult::Continue => continue,
                SlashResult::Break => break,
                SlashResult::Unknown => {
                    eprintln!("Unknown command: {input}. Type /help for available commands.");
                    continue;
                }
            }
        }

        match stream_reply(secretary, input).await {
            Ok(usage) => total_usage.add(&usage),
            Err(e) => print_error(&e),
        }
        println!();
    }

    secretary.disconnect();
    eprintln!("{}", render::usage(&total_usage));
    Ok(())
}

enum SlashResult {
    Continue,
    Break,
    Unknown,
}

async fn handle_slash_command(
    input: &str,
    secretary: &Secretary,
    total_usage: &Usage,
) -> Option<SlashResult> {
    if !input.starts_with('/') {
        return None;
    }

    let (cmd, args) = match input.split_once(' ') {
        Some((c, a)) => (c, Some(a.trim())),
        None => (input, None),
    };

    match cmd {
        "/quit" | "/exit" => Some(SlashResult::Break),
        "/help" => {
            print_help();
            Some(SlashResult::Continue)
        }
        "/clear" => {
            match secretary.conversation().clear() {
                Ok(()) => eprintln!("Conversation cleared."),
                Err(e) => print_error(&e),
            }
            Some(SlashResult::Continue)
        }
        "/usage" => {
            eprintln!("{}", render::usage(total_usage));
            Some(SlashResult::Continue)
        }
        "/dashboard" => {
            handle_dashboard(secretary, args).await;
            Some(SlashResult::Continue)
        }
        "/tools" => {
            match secretary.tools().await {
                Ok(tools) => eprint!("{}", render::tool_list(&tools)),
                Err(e) => print_error(&e),
            }
            Some(SlashResult::Continue)
        }
        "/reconnect" => {
            match secretary.reconnect().await {
                Ok(report) => {
                    eprintln!("Reconnected to {}.", report.server.name);
                    warn_missing(&report);
                }
                Err(e) => print_error(&e),
            }
            Some(SlashResult::Continue)
        }
        "/signout" => {
            secretary.sign_out().await;
            eprintln!("Signed out. Use /reconnect to sign in again.");
            Some(SlashResult::Continue)
        }
        _ => Some(SlashResult::Unknown),
    }
}

async fn handle_dashboard(secretary: &Secretary, args: Option<&str>) {
    let date = match args {
        Some(text) => match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                eprintln!("Usage: /dashboard [YYYY-MM-DD]");
                return;
            }
        },
        None => chrono::Local::now().date_naive(),
    };
    match secretary.dashboard(date).await {
        Ok(board) => eprint!("{}", render::dashboard(&board)),
        Err(e) => print_error(&e),
    }
}

/// Stream one reply to stdout. Ctrl+C cancels the turn.
async fn stream_reply(secretary: &Secretary, input: &str) -> Result<Usage, HishoError> {
    let mut stream = secretary.submit(input);
    let stdout = io::stdout();

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(ReplyFragment::Text(text))) => {
                    let mut out = stdout.lock();
                    let _ = write!(out, "{text}");
                    let _ = out.flush();
                }
                Some(Ok(ReplyFragment::Finished { truncated, usage })) => {
                    println!();
                    if truncated {
                        eprintln!("(stopped after the tool-call limit for one request)");
                    }
                    return Ok(usage);
                }
                Some(Err(e)) => {
                    println!();
                    return Err(e);
                }
                None => return Err(HishoError::Cancelled),
            },
            _ = tokio::signal::ctrl_c() => stream.cancel(),
        }
    }
}

fn warn_missing(report: &StartReport) {
    if !report.missing_procedures.is_empty() {
        eprintln!(
            "Warning: the server does not advertise: {}",
            report.missing_procedures.join(", ")
        );
    }
}

fn print_error(error: &HishoError) {
    tracing::debug!(error = %error, "request failed");
    eprintln!("Error: {}", error.user_message());
    if matches!(error, HishoError::ReauthenticationRequired(_)) {
        eprintln!("Run /reconnect after renewing your credentials.");
    }
}

fn report_error(error: HishoError) -> anyhow::Error {
    tracing::debug!(error = %error, "request failed");
    anyhow::anyhow!("{}", error.user_message())
}

fn print_help() {
    eprintln!("Available commands:");
    eprintln!("  /help                    Show this help");
    eprintln!("  /dashboard [YYYY-MM-DD]  Show the day's events and unread mail");
    eprintln!("  /tools                   List the tools the server advertises");
    eprintln!("  /reconnect               Start a fresh tool server session");
    eprintln!("  /signout                 Disconnect and forget the cached credential");
    eprintln!("  /usage                   Show token usage");
    eprintln!("  /clear                   Clear the conversation");
    eprintln!("  /quit                    Exit");
}
