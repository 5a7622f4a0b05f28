//! jimaku-button CLI application.
//!
//! Hosts the tab handler outside a browser: single lookups, credential
//! management, cache maintenance, and a `watch` mode that reads tab events
//! from stdin.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use jimaku_lookup::{
    classify, CacheManager, CredentialSettings, Credentials, Host, IndicatorMode, JimakuClient,
    LookupManager, SaveOutcome, Tab, TabActionHandler, TabId, TabState,
};
use shared::{Config, Database, KeyValueStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a URL is classified
    Classify { url: String },
    /// Evaluate a single page as the active tab
    Resolve { url: String },
    /// Verify and store an API key
    SetKey { key: String },
    /// Remove the stored API key
    ClearKey,
    /// Inspect or reset the lookup cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Read tab events from stdin and drive the indicator
    Watch,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Stats,
    Clear,
}

/// Host that reports indicator changes on stdout
#[derive(Default)]
struct ConsoleHost {
    tabs: Mutex<HashMap<TabId, String>>,
    active: Mutex<Option<TabId>>,
}

impl ConsoleHost {
    fn with_active(tab: &Tab) -> Self {
        let host = Self::default();
        host.set_url(tab.id, &tab.url);
        host.activate(tab.id);
        host
    }

    fn set_url(&self, tab_id: TabId, url: &str) {
        self.tabs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tab_id, url.to_string());
    }

    fn activate(&self, tab_id: TabId) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(tab_id);
    }

    fn tab(&self, tab_id: TabId) -> Option<Tab> {
        let tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        tabs.get(&tab_id).map(|url| Tab::new(tab_id, url.clone()))
    }

    fn close(&self, tab_id: TabId) {
        self.tabs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&tab_id);
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if *active == Some(tab_id) {
            *active = None;
        }
    }
}

#[async_trait]
impl Host for ConsoleHost {
    async fn active_tab(&self) -> Result<Option<Tab>> {
        let active = *self.active.lock().unwrap_or_else(|e| e.into_inner());
        Ok(active.and_then(|id| self.tab(id)))
    }

    async fn show_indicator(&self, tab_id: TabId, mode: IndicatorMode) -> Result<()> {
        match mode {
            IndicatorMode::PromptForCredential => println!("tab {}: indicator shown (set API key)", tab_id),
            IndicatorMode::OpenLink => println!("tab {}: indicator shown", tab_id),
        }
        Ok(())
    }

    async fn hide_indicator(&self, tab_id: TabId) -> Result<()> {
        println!("tab {}: indicator hidden", tab_id);
        Ok(())
    }

    async fn open_tab(&self, url: &str) -> Result<()> {
        println!("open {}", url);
        Ok(())
    }

    async fn open_settings(&self) -> Result<()> {
        println!("open settings: run `jimaku-button set-key <KEY>`");
        Ok(())
    }
}

struct Services {
    client: JimakuClient,
    credentials: Credentials,
    cache: CacheManager,
}

impl Services {
    fn open(config: &Config) -> Result<Self> {
        let db_path = config.database_path();
        info!(db_path = %db_path.display(), "Opening database");
        let store = KeyValueStore::new(Database::open(&db_path).context("Failed to open database")?);

        let client =
            JimakuClient::from_config(&config.jimaku).context("Failed to create Jimaku client")?;
        let credentials = Credentials::load(store.clone()).context("Failed to load credentials")?;
        let cache = CacheManager::new(store, config.cooldown());

        Ok(Self {
            client,
            credentials,
            cache,
        })
    }

    fn into_handler<H: Host>(self, host: H) -> Result<TabActionHandler<H>> {
        self.cache
            .restore_cooldowns()
            .context("Failed to restore cooldowns")?;
        let lookup = LookupManager::new(self.client, self.cache, self.credentials);
        Ok(TabActionHandler::new(host, lookup))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        config
            .logging
            .default_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    };

    shared::logging::init(shared::LogConfig {
        log_dir: config.log_dir().to_string_lossy().to_string(),
        component: "jimaku-button".to_string(),
        default_level: log_level,
        console: config.logging.console,
        file: config.logging.file,
        json_format: config.logging.json_format,
    })?;

    match args.command {
        Command::Classify { url } => match classify(&url) {
            Some(reference) => println!("{}", reference),
            None => println!("no match"),
        },
        Command::Resolve { url } => {
            let tab = Tab::new(1, url);
            let handler = Services::open(&config)?.into_handler(ConsoleHost::with_active(&tab))?;
            match handler.startup().await? {
                Some(TabState::Resolved(link)) => println!("{}", link),
                Some(TabState::Unauthenticated) => println!("no API key set"),
                Some(TabState::NoMatch) | None => println!("no subtitles found"),
            }
        }
        Command::SetKey { key } => {
            let services = Services::open(&config)?;
            let settings = CredentialSettings::new(&services.client, &services.credentials);
            match settings.save(&key).await? {
                SaveOutcome::Saved => println!("API key saved"),
                SaveOutcome::Rejected => bail!("Improper API key"),
            }
        }
        Command::ClearKey => {
            let services = Services::open(&config)?;
            CredentialSettings::new(&services.client, &services.credentials).clear()?;
            println!("API key removed");
        }
        Command::Cache { action } => {
            let services = Services::open(&config)?;
            match action {
                CacheAction::Stats => {
                    let stats = services.cache.stats()?;
                    println!("found: {}", stats.found);
                    println!("cooling down: {}", stats.cooling_down);
                    if stats.unreadable > 0 {
                        println!("unreadable: {}", stats.unreadable);
                    }
                }
                CacheAction::Clear => {
                    let removed = services.cache.clear()?;
                    println!("removed {} entries", removed);
                }
            }
        }
        Command::Watch => watch(&config).await?,
    }

    Ok(())
}

async fn watch(config: &Config) -> Result<()> {
    let handler = Services::open(config)?.into_handler(ConsoleHost::default())?;
    let _credential_watch = handler.lookup().credentials().watch();

    info!("Reading tab events from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(event) = parts.next() else {
            continue;
        };
        let tab_id = match parts.next().map(str::parse::<TabId>) {
            Some(Ok(id)) => id,
            _ => {
                warn!(line = %line, "Expected a tab id");
                continue;
            }
        };
        let url = parts.next();

        let result = match (event, url) {
            ("open", Some(url)) => {
                handler.host().set_url(tab_id, url);
                handler.host().activate(tab_id);
                handler.on_tab_activated(Tab::new(tab_id, url)).await.map(|_| ())
            }
            ("navigate", Some(url)) => {
                handler.host().set_url(tab_id, url);
                handler.on_tab_updated(tab_id, Some(url)).await.map(|_| ())
            }
            ("activate", None) => match handler.host().tab(tab_id) {
                Some(tab) => {
                    handler.host().activate(tab_id);
                    handler.on_tab_activated(tab).await.map(|_| ())
                }
                None => {
                    warn!(tab_id, "Unknown tab");
                    Ok(())
                }
            },
            ("click", None) => handler.on_indicator_clicked(tab_id).await.map(|_| ()),
            ("close", None) => {
                handler.host().close(tab_id);
                handler.on_tab_removed(tab_id);
                Ok(())
            }
            _ => {
                warn!(line = %line, "Unrecognised event");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "Event failed");
        }
    }

    Ok(())
}
