//! # TipKit Admin CLI
//!
//! Command-line tool for inspecting and resetting a tip datastore.
//!
//! Usage:
//!   tipkit-admin list [--format json]
//!   tipkit-admin show <id>
//!   tipkit-admin invalidate <id> [--reason tip-closed]
//!   tipkit-admin reset <id>
//!   tipkit-admin reset-all
//!   tipkit-admin clean --yes
//!   tipkit-admin stats

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tipkit::config::{DEFAULT_NAMESPACE, STORE_PATH_ENV};
use tipkit::{InvalidationReason, StoreConfig, TipKit, TipKitConfig, TipRecord, TipStatus};

#[derive(Parser)]
#[command(name = "tipkit-admin")]
#[command(about = "Inspect and reset persisted tip state", long_about = None)]
struct Cli {
    /// Path to the tip database
    #[arg(short, long, env = STORE_PATH_ENV, default_value = "./var/data/tipkit.db")]
    db: PathBuf,

    /// Namespace inside the database
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every stored tip
    List {
        /// Output format: pretty, json
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },

    /// Show one tip record
    Show {
        /// Tip ID
        id: String,
    },

    /// Retire a tip until it is reset
    Invalidate {
        /// Tip ID
        id: String,

        /// actionPerformed, displayCountExceeded, displayDurationExceeded, tipClosed
        #[arg(short, long, default_value = "tipClosed")]
        reason: InvalidationReason,
    },

    /// Reset one tip to a fresh state
    Reset {
        /// Tip ID
        id: String,
    },

    /// Reset every tip, keeping configured caps
    ResetAll,

    /// Delete every tip record
    Clean {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show aggregate statistics
    Stats,
}

fn main() -> Result<(), String> {
    let cli = Cli::parse();

    let config = TipKitConfig {
        store: StoreConfig::Sqlite { path: cli.db },
        namespace: cli.namespace,
    };
    let kit = TipKit::from_config(&config).map_err(|e| e.to_string())?;

    match cli.command {
        Commands::List { format } => {
            let mut records = load_all(&kit)?;
            records.sort_by(|a, b| a.id.cmp(&b.id));

            match format.as_str() {
                "json" => {
                    let json = serde_json::to_string_pretty(&records)
                        .map_err(|e| format!("Failed to serialize tips: {}", e))?;
                    println!("{}", json);
                }
                _ => {
                    println!("{} tips:\n", records.len());
                    for record in &records {
                        print_tip_summary(record);
                    }
                }
            }
        }

        Commands::Show { id } => match kit.get_tip(&id).map_err(|e| e.to_string())? {
            Some(record) => print_tip_detail(&record),
            None => println!("Tip '{}' not found", id),
        },

        Commands::Invalidate { id, reason } => {
            match kit.invalidate_tip(&id, reason).map_err(|e| e.to_string())? {
                Some(record) => print_tip_summary(&record),
                None => println!("Tip '{}' not found", id),
            }
        }

        Commands::Reset { id } => match kit.reset_tip(&id).map_err(|e| e.to_string())? {
            Some(record) => print_tip_summary(&record),
            None => println!("Tip '{}' not found", id),
        },

        Commands::ResetAll => {
            let reset = kit.reset_datastore().map_err(|e| e.to_string())?;
            println!("Reset {} tips", reset);
        }

        Commands::Clean { yes } => {
            if !yes {
                return Err("Refusing to delete all tips without --yes".to_string());
            }
            kit.clean_datastore().map_err(|e| e.to_string())?;
            println!("Deleted all tips in namespace '{}'", config.namespace);
        }

        Commands::Stats => {
            let stats = kit.stats().map_err(|e| e.to_string())?;

            println!("Tip Statistics\n");
            println!("Total Tips:        {}", stats.total_tips);
            println!("Available:         {}", stats.available);
            println!("Pending:           {}", stats.pending);
            println!("Invalidated:       {}", stats.invalidated);
            println!("Displayable:       {}", stats.displayable);
            println!("Unreadable:        {}", stats.unreadable);
            println!("Total Impressions: {}", stats.total_impressions);
        }
    }

    Ok(())
}

fn load_all(kit: &TipKit) -> Result<Vec<TipRecord>, String> {
    let mut records = Vec::new();
    for id in kit.get_all_tip_ids().map_err(|e| e.to_string())? {
        match kit.get_tip(&id) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => eprintln!("Skipping '{}': {}", id, e),
        }
    }
    Ok(records)
}

fn print_tip_summary(record: &TipRecord) {
    let marker = match record.status {
        TipStatus::Available if record.should_display => "+",
        TipStatus::Available => "-",
        TipStatus::Pending => "~",
        TipStatus::Invalidated => "x",
    };

    println!(
        "{} {:<32} | {:<11} | {}/{} shown{}",
        marker,
        record.id,
        record.status,
        record.display_count(),
        record.max_display_count(),
        record
            .invalidation_reason
            .map(|r| format!(" | {}", r))
            .unwrap_or_default()
    );
}

fn print_tip_detail(record: &TipRecord) {
    println!("Tip:             {}", record.id);
    println!("Status:          {}", record.status);
    println!("Should Display:  {}", record.should_display);
    if let Some(reason) = record.invalidation_reason {
        println!("Invalidated By:  {}", reason);
    }
    println!(
        "Impressions:     {} of {}",
        record.display_count(),
        record.max_display_count()
    );
    if let Some(rule) = record.rule_name() {
        println!("Rule:            {}", rule);
    }
    println!("Created:         {}", record.created_at.to_rfc3339());
    println!("Updated:         {}", record.updated_at.to_rfc3339());
}
