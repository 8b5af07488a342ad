//! LMS notification CLI
//!
//! Polls the LMS backend for one user and role and keeps a local notification feed.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lms_notify::cli::{
    format_feed, format_item, format_preferences, format_report, material_signature, to_json,
    ConnectArgs, Context,
};
use lms_notify::notification::{Category, CycleOutcome, Trigger};
use lms_notify::PollScheduler;

#[derive(Parser)]
#[command(name = "lms-notify")]
#[command(about = "LMS notifications - poll the dashboard backend and keep a notification feed")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously and print new notifications
    Watch {
        /// Poll interval in seconds (overrides config)
        #[arg(long, short)]
        interval: Option<u64>,
        /// Print new notifications as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Run one poll cycle
    Poll {
        #[arg(long)]
        json: bool,
    },
    /// Show the notification feed
    Feed {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
        #[arg(long)]
        json: bool,
    },
    /// Mark notifications read
    Read {
        /// Notification ids
        ids: Vec<String>,
        /// Mark everything in the feed read
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
    /// Acknowledge a material as opened
    OpenMaterial {
        material_id: String,
        /// Signature to acknowledge (default: current one from the backend)
        #[arg(long)]
        signature: Option<String>,
    },
    /// List or change notification preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
        #[arg(long)]
        json: bool,
    },
    /// Forget seen, read and feed state for this user
    Reset {
        /// Required to confirm
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Enable a category
    Enable { category: Category },
    /// Disable a category
    Disable { category: Category },
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=lms_notify=debug lms-notify watch
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lms_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let ctx = Context::build(&cli.connect)?;
    let engine = ctx.engine.clone();

    match cli.command {
        Commands::Watch { interval, json } => {
            ctx.require_backend()?;
            let every = interval
                .map(|s| Duration::from_secs(s.max(1)))
                .unwrap_or_else(|| ctx.config.interval());
            let mut feed_rx = engine.subscribe_feed();
            let mut printed: HashSet<String> = feed_rx
                .borrow()
                .items
                .iter()
                .map(|i| i.record.id.clone())
                .collect();

            let (handle, task) = PollScheduler::new(engine.clone(), every)
                .with_prefs_refresh(ctx.config.prefs_refresh())
                .spawn();

            if !json {
                println!(
                    "🔍 Memantau notifikasi {} ({}) setiap {} detik... Ctrl-C untuk berhenti",
                    engine.user(),
                    engine.role(),
                    every.as_secs()
                );
            }

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, stopping");
                        handle.cancel();
                        break;
                    }
                    changed = feed_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let view = feed_rx.borrow_and_update().clone();
                        for item in view.items.iter().rev() {
                            if !printed.insert(item.record.id.clone()) {
                                continue;
                            }
                            if json {
                                println!("{}", serde_json::to_string(&item.record)?);
                            } else {
                                println!("{}", format_item(item));
                            }
                        }
                    }
                }
            }
            if let Err(e) = task.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        Commands::Poll { json } => {
            ctx.require_backend()?;
            let outcome = engine
                .run_cycle(Trigger::Manual, &CancellationToken::new())
                .await?;
            match outcome {
                CycleOutcome::Completed(report) => {
                    if json {
                        println!("{}", to_json(&report));
                    } else {
                        println!("{}", format_report(&report));
                    }
                }
                CycleOutcome::Coalesced | CycleOutcome::Cancelled => {
                    eprintln!("Polling tidak dijalankan");
                }
            }
        }
        Commands::Feed { unread, json } => {
            let view = engine.feed_view();
            if json {
                println!("{}", to_json(&view));
            } else {
                println!("{}", format_feed(&view, unread));
            }
        }
        Commands::Read { ids, all } => {
            let marked = if all {
                engine.mark_all_read()?
            } else if ids.is_empty() {
                return Err(anyhow!("give notification ids or --all"));
            } else {
                engine.mark_read(ids)?
            };
            println!("✅ {} notifikasi ditandai dibaca", marked);
        }
        Commands::OpenMaterial {
            material_id,
            signature,
        } => {
            let signature = match signature {
                Some(s) => s,
                None => {
                    ctx.require_backend()?;
                    material_signature(ctx.backend.as_ref(), &material_id).await?
                }
            };
            engine.acknowledge_material(&material_id, &signature)?;
            println!("✅ Materi {} ditandai sudah dibuka ({})", material_id, signature);
        }
        Commands::Prefs { action, json } => {
            match action {
                Some(PrefsAction::Enable { category }) => engine.set_preference(category, true)?,
                Some(PrefsAction::Disable { category }) => engine.set_preference(category, false)?,
                None => {}
            }
            let prefs = engine.preference_list();
            if json {
                let map: serde_json::Map<String, serde_json::Value> = prefs
                    .iter()
                    .map(|(c, on)| (c.as_str().to_string(), serde_json::Value::Bool(*on)))
                    .collect();
                println!("{}", to_json(&map));
            } else {
                println!("Preferensi notifikasi ({}):\n", engine.role());
                println!("{}", format_preferences(&prefs));
            }
        }
        Commands::Reset { yes } => {
            if !yes {
                return Err(anyhow!(
                    "reset forgets every seen and read notification for {}; pass --yes to confirm",
                    engine.user()
                ));
            }
            let removed = engine.reset()?;
            println!("🗑️  {} entri state dihapus untuk {}", removed, engine.user());
        }
    }

    Ok(())
}
