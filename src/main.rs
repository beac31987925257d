// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Raksha - Personal Safety Emergency Response Engine
//!
//! Watches independent trigger sources (SOS hold, voice command, shake,
//! keyboard shortcut) and funnels every trigger through one confirmation
//! countdown before notifying contacts and handing off to the dialer.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use raksha::{Config, Engine, Relation, VERSION};

/// Raksha - Personal Safety Emergency Response Engine
#[derive(Parser, Debug)]
#[command(name = "raksha")]
#[command(author = "Raksha Project")]
#[command(version = VERSION)]
#[command(about = "Emergency trigger detection, confirmation, and dispatch")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated input devices
    #[arg(long)]
    demo: bool,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the emergency response engine (default)
    Run,
    /// Manage emergency contacts
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },
    /// Show the recorded emergency log
    Events,
    /// Download offline assets into the versioned cache
    Precache,
}

#[derive(Subcommand, Debug)]
enum ContactsAction {
    /// Add an emergency contact
    Add {
        /// Contact name
        name: String,
        /// Phone number
        phone: String,
        /// Relationship (family, friend, colleague, neighbor, other)
        #[arg(default_value = "other")]
        relation: String,
    },
    /// List stored contacts
    List,
    /// Remove a contact by list position (1-based)
    Remove {
        /// Position shown by `contacts list`
        index: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    if args.demo {
        config.demo_mode = true;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.path = data_dir.join("raksha.db");
        config.cache.cache_dir = data_dir.join("cache");
        config.data_dir = data_dir;
    }

    let rt = tokio::runtime::Runtime::new()?;
    match args.command.unwrap_or(Command::Run) {
        Command::Run => rt.block_on(run(config)),
        Command::Contacts { action } => contacts(config, action),
        Command::Events => events(config),
        Command::Precache => rt.block_on(precache(config)),
    }
}

async fn run(config: Config) -> Result<()> {
    info!("🛡️  Raksha v{} - Personal Safety Emergency Response Engine", VERSION);
    info!("Demo mode: {}", config.demo_mode);

    let engine = Engine::new(config)?;
    engine.start().await?;

    info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    engine.shutdown().await;
    Ok(())
}

fn contacts(config: Config, action: ContactsAction) -> Result<()> {
    let engine = Engine::new(config)?;
    let store = engine.contacts();

    match action {
        ContactsAction::Add {
            name,
            phone,
            relation,
        } => {
            let relation: Relation = relation.parse().map_err(anyhow::Error::msg)?;
            let contact = store.add(&name, &phone, relation)?;
            println!("Added {} ({}) as {:?}", contact.name, contact.phone, contact.relation);
        }
        ContactsAction::List => {
            let contacts = store.list();
            if contacts.is_empty() {
                println!("No emergency contacts stored.");
            }
            for (i, c) in contacts.iter().enumerate() {
                println!("{}. {} - {} ({:?})", i + 1, c.name, c.phone, c.relation);
            }
        }
        ContactsAction::Remove { index } => {
            let index = index
                .checked_sub(1)
                .ok_or_else(|| anyhow::anyhow!("positions start at 1"))?;
            let removed = store.remove(index)?;
            println!("Removed {}", removed.name);
        }
    }
    Ok(())
}

fn events(config: Config) -> Result<()> {
    let engine = Engine::new(config)?;
    let events = engine.events().recent();

    if events.is_empty() {
        println!("No emergencies recorded.");
        return Ok(());
    }
    for event in events {
        let location = event
            .location
            .map(|l| format!("{:.4},{:.4}", l.latitude, l.longitude))
            .unwrap_or_else(|| "no location".to_string());
        println!(
            "{}  {} ({})  via {}  [{}]  contacts: {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            raksha::notify::service_name(&event.number),
            event.number,
            event.source,
            location,
            event.contacts_notified,
        );
    }
    Ok(())
}

async fn precache(config: Config) -> Result<()> {
    let cache = raksha::offline::AssetCache::new(config.cache);
    let report = cache.precache().await?;
    cache.activate()?;
    println!(
        "Cached {} core and {} optional assets ({} optional skipped)",
        report.core_cached, report.optional_cached, report.optional_failed
    );
    Ok(())
}
