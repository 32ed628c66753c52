use std::time::Duration;

use anyhow::{Context, Result};
use bridge_core::{
    ConversationId, CoordinationConfig, DEFAULT_TENANT, KeySpace, TenantId, ThreadId,
    system_clock,
};
use bridge_mapping::ConversationResolver;
use bridge_ratelimit::{RateLimit, RateLimits, StoreRateLimiter};
use bridge_store::store_from_config;
use bridge_token::TokenCache;
use clap::{Parser, Subcommand};
use serde::Serialize;

mod creator;

use creator::HttpConversationCreator;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bridge coordination state CLI")]
struct Cli {
    /// Emit JSON output
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the conversation mapped to a consumer thread
    Lookup {
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
        thread: String,
    },
    /// Show the consumer thread mapped to a conversation
    Reverse {
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
        conversation: String,
    },
    /// Get or create the conversation for a thread
    Resolve {
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
        thread: String,
        /// Endpoint receiving `{tenant, thread_id}` and answering `{conversation_id}`
        #[arg(long)]
        create_url: String,
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Remove both directions of a thread's mapping
    Invalidate {
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
        thread: String,
    },
    /// Inspect or drop a tenant's cached access token
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Rate limit counters
    Rate {
        #[command(subcommand)]
        command: RateCommands,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommands {
    Show {
        #[arg(long)]
        tenant: String,
    },
    Drop {
        #[arg(long)]
        tenant: String,
    },
}

#[derive(Subcommand, Debug)]
enum RateCommands {
    /// Counts calls against a budget; probing consumes the budget like real traffic
    Probe {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        resource: String,
        /// Overrides the configured limit
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        window_secs: Option<u64>,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

#[derive(Serialize)]
struct MappingView {
    tenant: String,
    thread: Option<String>,
    conversation: Option<String>,
}

#[derive(Serialize)]
struct TokenView {
    tenant: String,
    cached: bool,
    token_preview: Option<String>,
    expires_at_ms: Option<i64>,
    cached_at_ms: Option<i64>,
    usable_for_ms: Option<i64>,
}

#[derive(Serialize)]
struct ProbeView {
    tenant: String,
    resource: String,
    limit: u64,
    window_secs: u64,
    admitted: u32,
    rejected: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    bridge_telemetry::install("bridge-statectl")?;
    let cli = Cli::parse();

    let cfg = CoordinationConfig::from_env();
    let store = store_from_config(&cfg)
        .await
        .context("connecting to coordination store")?;
    let keys = KeySpace::new(cfg.namespace.clone());

    match cli.command {
        Commands::Lookup { tenant, thread } => {
            let resolver = ConversationResolver::from_config(store, &cfg);
            let (tenant, thread) = (TenantId::new(tenant), ThreadId::new(thread));
            let conversation = resolver.lookup(&tenant, &thread).await?;
            print_mapping(cli.json, &tenant, Some(&thread), conversation.as_ref())?;
        }
        Commands::Reverse {
            tenant,
            conversation,
        } => {
            let resolver = ConversationResolver::from_config(store, &cfg);
            let (tenant, conversation) = (TenantId::new(tenant), ConversationId::new(conversation));
            let thread = resolver
                .resolve_by_conversation_id(&tenant, &conversation)
                .await?;
            print_mapping(cli.json, &tenant, thread.as_ref(), Some(&conversation))?;
        }
        Commands::Resolve {
            tenant,
            thread,
            create_url,
            timeout_secs,
        } => {
            let resolver = ConversationResolver::from_config(store, &cfg);
            let creator =
                HttpConversationCreator::new(create_url, Duration::from_secs(timeout_secs.max(1)))?;
            let (tenant, thread) = (TenantId::new(tenant), ThreadId::new(thread));
            let conversation = resolver.resolve(&tenant, &thread, &creator).await?;
            print_mapping(cli.json, &tenant, Some(&thread), Some(&conversation))?;
        }
        Commands::Invalidate { tenant, thread } => {
            let resolver = ConversationResolver::from_config(store, &cfg);
            let (tenant, thread) = (TenantId::new(tenant), ThreadId::new(thread));
            let removed = resolver.invalidate(&tenant, &thread).await?;
            if cli.json {
                print_mapping(true, &tenant, Some(&thread), removed.as_ref())?;
            } else {
                match removed {
                    Some(conversation) => {
                        println!("Removed mapping {thread} -> {conversation} (tenant={tenant})")
                    }
                    None => println!("No mapping for thread {thread} (tenant={tenant})"),
                }
            }
        }
        Commands::Token { command } => {
            let cache = TokenCache::from_config(store, &cfg);
            match command {
                TokenCommands::Show { tenant } => {
                    let tenant = TenantId::new(tenant);
                    let cached = cache.peek(&tenant).await?;
                    let now = system_clock().now_unix_ms();
                    let buffer = cache.settings().buffer;
                    let view = TokenView {
                        tenant: tenant.to_string(),
                        cached: cached.is_some(),
                        token_preview: cached.as_ref().map(|t| preview(&t.access_token)),
                        expires_at_ms: cached.as_ref().map(|t| t.expires_at_ms),
                        cached_at_ms: cached.as_ref().map(|t| t.cached_at_ms),
                        usable_for_ms: cached.as_ref().map(|t| t.usable_for_ms(now, buffer)),
                    };
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&view)?);
                    } else if let (Some(token), Some(usable)) =
                        (&view.token_preview, view.usable_for_ms)
                    {
                        println!("tenant : {}", view.tenant);
                        println!("token  : {token}");
                        println!("usable : {}s", usable / 1000);
                    } else {
                        println!("No cached token for tenant={tenant}");
                    }
                }
                TokenCommands::Drop { tenant } => {
                    let tenant = TenantId::new(tenant);
                    cache.invalidate(&tenant).await?;
                    if cli.json {
                        println!("{}", serde_json::json!({ "tenant": tenant, "dropped": true }));
                    } else {
                        println!("Dropped cached token for tenant={tenant}");
                    }
                }
            }
        }
        Commands::Rate {
            command:
                RateCommands::Probe {
                    tenant,
                    resource,
                    limit,
                    window_secs,
                    count,
                },
        } => {
            let tenant = TenantId::new(tenant);
            let configured = RateLimits::from_env(&cfg).get(&tenant, &resource);
            let budget = RateLimit {
                limit: limit.unwrap_or(configured.limit),
                window: window_secs
                    .map(Duration::from_secs)
                    .unwrap_or(configured.window),
            };
            let limits = RateLimits::new(budget);
            let limiter = StoreRateLimiter::new(store, keys);
            let mut view = ProbeView {
                tenant: tenant.to_string(),
                resource: resource.clone(),
                limit: budget.limit,
                window_secs: budget.window.as_secs(),
                admitted: 0,
                rejected: 0,
            };
            for _ in 0..count {
                if limits.check(&limiter, &tenant, &resource).await? {
                    view.admitted += 1;
                } else {
                    view.rejected += 1;
                }
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!(
                    "{} admitted, {} rejected (limit {} per {}s, tenant={} resource={})",
                    view.admitted,
                    view.rejected,
                    view.limit,
                    view.window_secs,
                    view.tenant,
                    view.resource
                );
            }
        }
    }

    Ok(())
}

fn print_mapping(
    json: bool,
    tenant: &TenantId,
    thread: Option<&ThreadId>,
    conversation: Option<&ConversationId>,
) -> Result<()> {
    if json {
        let view = MappingView {
            tenant: tenant.to_string(),
            thread: thread.map(ToString::to_string),
            conversation: conversation.map(ToString::to_string),
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    match (thread, conversation) {
        (Some(thread), Some(conversation)) => {
            println!("{thread} -> {conversation} (tenant={tenant})")
        }
        (Some(thread), None) => println!("No mapping for thread {thread} (tenant={tenant})"),
        (None, Some(conversation)) => {
            println!("No mapping for conversation {conversation} (tenant={tenant})")
        }
        (None, None) => println!("No mapping (tenant={tenant})"),
    }
    Ok(())
}

fn preview(token: &str) -> String {
    let head: String = token.chars().take(6).collect();
    format!("{head}…")
}
