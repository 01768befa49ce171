//! Rules filter demo - a scripted session over a shared in-process bus
//!
//! Mounts two filter controls against an in-memory rule registry and plays
//! through the interactions the component exists for: seeding from query
//! state, user changes broadcast to peers, registry edits pruning stale
//! selections, and teardown.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use colored::Colorize;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rules_filter::{
    Bus, RegistryError, RegistryFetcher, RuleRecord, RuleRef, RulesFilter, Topic,
};

/// Rules filter demo - scripted selection-sync session
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Delay between scripted steps in milliseconds
    #[arg(long, default_value = "150")]
    step_delay_ms: u64,
}

/// In-memory registry standing in for the backend
struct DemoRegistry {
    records: RwLock<Vec<RuleRecord>>,
}

impl DemoRegistry {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            records: RwLock::new(vec![
                rule("r1", "sqlmap", true),
                rule("r2", "xss", false),
                rule("r3", "lfi", true),
                rule("r4", "shellshock", true),
            ]),
        })
    }

    fn disable(&self, id: &str) {
        for record in self.records.write().iter_mut() {
            if record.id == id {
                record.enabled = false;
            }
        }
    }
}

#[async_trait]
impl RegistryFetcher for DemoRegistry {
    async fn fetch_rules(&self) -> Result<Vec<RuleRecord>, RegistryError> {
        Ok(self.records.read().clone())
    }
}

fn rule(id: &str, name: &str, enabled: bool) -> RuleRecord {
    RuleRecord {
        id: id.to_string(),
        name: name.to_string(),
        enabled,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting rules filter demo...");
    let step = Duration::from_millis(args.step_delay_ms);

    let bus = Bus::new();
    let registry = DemoRegistry::new();

    // Two sibling controls: one seeded from a shared link, one fresh
    let seeded = RulesFilter::mount(
        bus.clone(),
        registry.clone(),
        "?matched_rules=r1&matched_rules=r3",
    )
    .await;
    let fresh = RulesFilter::mount(bus.clone(), registry.clone(), "").await;

    println!("\n{}", "=== Mounted (seed: r1, r3) ===".bold().cyan());
    print_view("seeded", &seeded);
    print_view("fresh", &fresh);
    tokio::time::sleep(step).await;

    // User deselects r3 on the seeded control; the peer converges via the bus
    seeded.set_selection(vec![RuleRef::new("r1", "sqlmap")]);
    println!("\n{}", "=== User deselected r3 on 'seeded' ===".bold().cyan());
    print_view("seeded", &seeded);
    print_view("fresh", &fresh);
    tokio::time::sleep(step).await;

    // A peer broadcast carrying an id unknown to the registry
    bus.publish(
        Topic::ConnectionsFilters,
        json!({"matched_rules": ["r4", "r99"]}),
    );
    println!(
        "\n{}",
        "=== Peer broadcast [r4, r99] (r99 unknown) ===".bold().cyan()
    );
    print_view("seeded", &seeded);
    print_view("fresh", &fresh);
    tokio::time::sleep(step).await;

    // The backend disables r4 and announces the edit; both controls reload
    // and prune the now-missing rule from their selections
    registry.disable("r4");
    bus.publish(Topic::Notifications, json!({"event": "rules.edit"}));
    tokio::time::sleep(step.max(Duration::from_millis(100))).await;
    println!("\n{}", "=== Registry edit: r4 disabled ===".bold().cyan());
    print_view("seeded", &seeded);
    print_view("fresh", &fresh);

    seeded.teardown();
    fresh.teardown();
    info!("Demo complete");
    Ok(())
}

fn print_view(label: &str, filter: &RulesFilter) {
    let view = filter.view();
    let tags = view
        .tags
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let suggestions = view
        .suggestions
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "  {:>7}: [{}] {}",
        label.bold(),
        tags.green(),
        format!("(suggestions: {suggestions})").dimmed()
    );
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
