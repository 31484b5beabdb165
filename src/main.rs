mod gateway;

use clap::{Parser, Subcommand};
use polyglot_channels::{ChannelLinks, LineBridge, WebhookSink};
use polyglot_core::{config, config::Config, shellexpand, traits::Translator, Lang};
use polyglot_memory::{learn_from_log, Learner, Store, UsageLog};
use polyglot_providers::GoogleTranslator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "polyglot",
    version,
    about = "Multilingual chat relay backed by a self-improving translation memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay, reading JSON-line events from stdin.
    Start,
    /// Resolve a message into every other language (memory, then translator).
    Resolve {
        /// Language the text is written in (ja, en, ko, zh).
        lang: Lang,
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Look up a phrase in memory only.
    Lookup {
        src: Lang,
        tgt: Lang,
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Run one learning cycle over the usage log now.
    Learn,
    /// Add a better phrasing for text already in memory.
    Correct { original: String, corrected: String },
    /// Bind a channel to a language and delivery endpoint.
    Link {
        channel: String,
        lang: Lang,
        sink: String,
    },
    /// Remove a channel binding.
    Unlink { channel: String },
    /// Show configuration, memory and link status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_logging(&cfg);

    match cli.command {
        Commands::Start => {
            let translator = build_translator(&cfg)?;
            if translator.is_none() {
                tracing::warn!("translator backend is \"none\": only remembered phrases will be relayed");
            }
            let store = Store::from_config(&cfg).await?;
            let usage_log = Arc::new(UsageLog::new(cfg.usage_log_path()));
            let links = Arc::new(ChannelLinks::load(cfg.links_path())?);
            let sink = WebhookSink::new(
                cfg.polyglot.name.clone(),
                Duration::from_secs(cfg.translator.timeout_secs),
            )?;

            eprintln!("{} - starting relay...", cfg.polyglot.name);
            let gw = gateway::Gateway::new(
                build_pipeline(&cfg, &store, translator, usage_log.clone()),
                store,
                usage_log,
                links,
                Arc::new(LineBridge::stdio()),
                Arc::new(sink),
                cfg.learning,
            );
            Arc::new(gw).run().await?;
        }
        Commands::Resolve { lang, text } => {
            let text = text.join(" ");
            let store = Store::from_config(&cfg).await?;
            let usage_log = Arc::new(UsageLog::new(cfg.usage_log_path()));
            let pipeline = build_pipeline(&cfg, &store, build_translator(&cfg)?, usage_log);

            let res = pipeline.resolve(&text, lang, chrono::Utc::now()).await;
            match &res.source {
                gateway::Source::Memory { entry_id } => println!("source: memory (entry {entry_id})"),
                gateway::Source::Translator { entry_id } => println!(
                    "source: translator (entry {})",
                    entry_id.as_deref().unwrap_or("-")
                ),
                gateway::Source::Unresolved => println!("source: none"),
            }
            for (l, t) in &res.translations {
                println!("  {l}: {t}");
            }
            for l in &res.missing {
                println!("  {l}: (missing)");
            }
            if let Some(e) = res.persist_error {
                eprintln!("warning: result not saved: {e}");
            }
        }
        Commands::Lookup { src, tgt, text } => {
            let text = text.join(" ");
            let store = Store::from_config(&cfg).await?;
            match store.find_translation(&text, src, tgt).await {
                Some(found) => println!("{found}"),
                None => {
                    // Fall back to sentence-by-sentence lookup.
                    let segmented = store.translate_text(&text, src, &[tgt]).await;
                    match segmented.get(&tgt) {
                        Some(t) if *t != text => println!("{t}"),
                        _ => anyhow::bail!("no {tgt} translation in memory for {text:?}"),
                    }
                }
            }
        }
        Commands::Learn => {
            let store = Store::from_config(&cfg).await?;
            let log = UsageLog::new(cfg.usage_log_path());
            let report = learn_from_log(&store, &log, &Learner::new(cfg.learning)).await?;
            println!(
                "learned from {} records: {} new entries, {} reinforced",
                report.records,
                report.created.len(),
                report.reinforced
            );
        }
        Commands::Correct { original, corrected } => {
            let store = Store::from_config(&cfg).await?;
            let outcome = store.submit_correction(&original, &corrected).await?;
            if outcome.updated {
                println!("updated entries: {}", outcome.touched.join(", "));
            } else {
                println!("no entry contains {original:?}; nothing changed");
            }
        }
        Commands::Link { channel, lang, sink } => {
            let links = ChannelLinks::load(cfg.links_path())?;
            match links.link(&channel, lang, &sink).await? {
                Some(prev) => println!("{channel}: {} -> {lang}", prev.lang),
                None => println!("{channel}: linked as {lang}"),
            }
        }
        Commands::Unlink { channel } => {
            let links = ChannelLinks::load(cfg.links_path())?;
            match links.unlink(&channel).await? {
                Some(_) => println!("{channel}: unlinked"),
                None => anyhow::bail!("channel {channel} is not linked"),
            }
        }
        Commands::Status => {
            println!("{} - Status Check\n", cfg.polyglot.name);
            println!("Config: {}", cli.config);
            println!("Data dir: {}", shellexpand(&cfg.polyglot.data_dir));
            println!();

            let store = Store::from_config(&cfg).await?;
            println!("  memory: {} entries ({})", store.len().await, store.path().display());
            let links = ChannelLinks::load(cfg.links_path())?;
            let linked = links.get_links().await;
            println!("  links: {}", linked.len());
            for (id, link) in &linked {
                println!("    {id}: {}", link.lang);
            }
            let translator = match cfg.translator.backend.as_str() {
                "none" => "disabled".to_string(),
                backend if cfg.translator.resolved_api_key().is_some() => {
                    format!("{backend} (configured)")
                }
                backend => format!("{backend} (missing api key)"),
            };
            println!("  translator: {translator}");
            println!(
                "  learning: {}",
                if cfg.learning.enabled {
                    format!("every {}s", cfg.learning.interval_secs)
                } else {
                    "disabled".to_string()
                }
            );
        }
    }

    Ok(())
}

/// Stderr plus a daily file under `{data_dir}/logs/`. Stdout stays free for
/// the bridge.
fn init_logging(cfg: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.polyglot.log_level));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let log_dir = PathBuf::from(shellexpand(&cfg.polyglot.data_dir)).join("logs");
    match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "polyglot.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            tracing::warn!("file logging disabled, cannot create {}: {e}", log_dir.display());
            None
        }
    }
}

/// Build the configured translator backend. `none` means memory-only.
fn build_translator(cfg: &Config) -> anyhow::Result<Option<Arc<dyn Translator>>> {
    match cfg.translator.backend.as_str() {
        "google" => Ok(Some(Arc::new(GoogleTranslator::from_config(&cfg.translator)?))),
        "none" => Ok(None),
        other => anyhow::bail!("unsupported translator backend: {other}"),
    }
}

fn build_pipeline(
    cfg: &Config,
    store: &Store,
    translator: Option<Arc<dyn Translator>>,
    usage_log: Arc<UsageLog>,
) -> gateway::Pipeline {
    gateway::Pipeline::new(
        store.clone(),
        translator,
        usage_log,
        Duration::from_secs(cfg.translator.timeout_secs),
        cfg.learning.initial_confidence,
    )
}
