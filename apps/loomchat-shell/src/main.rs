#![allow(clippy::print_stdout, clippy::print_stderr)]

mod identity;
mod render;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;

use loomchat_client_core::auth::{AuthSnapshot, IdentityWiring};
use loomchat_client_core::page::{ChatLayout, PageView, select_page_view};
use loomchat_thread_client::{ThreadServiceClient, ThreadServiceConfig};

#[derive(Debug, Parser)]
#[command(name = "loomchat")]
#[command(about = "Terminal chat client for a graph-based LM thread service")]
struct ShellArgs {
    /// Thread service base URL (falls back to LOOMCHAT_THREAD_BASE_URL)
    #[arg(long)]
    thread_base_url: Option<String>,

    /// Assistant (graph) id submitted with each run (falls back to
    /// LOOMCHAT_ASSISTANT_ID)
    #[arg(long)]
    assistant_id: Option<String>,

    /// API key forwarded to the thread service (falls back to
    /// LOOMCHAT_THREAD_API_KEY)
    #[arg(long)]
    thread_api_key: Option<String>,

    /// Identity wiring: "shared" (host-established session) or "direct"
    /// (provider configured from the LOOMCHAT_IDENTITY_* variables)
    #[arg(long, default_value = "shared")]
    identity: String,

    /// Chat surface: "full" or "minimal"
    #[arg(long, default_value = "full")]
    layout: String,

    /// Resume an existing thread instead of starting fresh
    #[arg(long)]
    thread: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = ShellArgs::parse();
    run(args).await
}

async fn run(args: ShellArgs) -> Result<()> {
    let layout = ChatLayout::parse(&args.layout)
        .with_context(|| format!("unknown chat layout {:?} (expected \"full\" or \"minimal\")", args.layout))?;
    let wiring = resolve_identity_wiring(&args.identity)?;

    render::page(&select_page_view(&AuthSnapshot::loading()), &wiring);
    let auth = identity::resolve_auth(&wiring).await;

    let view = select_page_view(&auth);
    render::page(&view, &wiring);
    if view != PageView::Chat {
        return Ok(());
    }

    let client = ThreadServiceClient::new(thread_config(&args)?)?;
    repl::run_chat(client, layout, args.thread, auth.user).await
}

fn resolve_identity_wiring(raw: &str) -> Result<IdentityWiring> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "shared" => Ok(IdentityWiring::shared_from_env()),
        "direct" => IdentityWiring::direct_from_env()
            .context("direct identity wiring is not fully configured"),
        other => anyhow::bail!("unknown identity wiring {other:?} (expected \"shared\" or \"direct\")"),
    }
}

fn thread_config(args: &ShellArgs) -> Result<ThreadServiceConfig> {
    let base_url = args
        .thread_base_url
        .clone()
        .or_else(|| env_non_empty(loomchat_thread_client::ENV_THREAD_BASE_URL))
        .context("thread service base url is not configured; pass --thread-base-url or set LOOMCHAT_THREAD_BASE_URL")?;

    let mut config = ThreadServiceConfig::new(base_url);
    config.api_key = args
        .thread_api_key
        .clone()
        .or_else(|| env_non_empty(loomchat_thread_client::ENV_THREAD_API_KEY));
    if let Some(assistant_id) = args
        .assistant_id
        .clone()
        .or_else(|| env_non_empty(loomchat_thread_client::ENV_ASSISTANT_ID))
    {
        config.assistant_id = assistant_id;
    }
    Ok(config)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
