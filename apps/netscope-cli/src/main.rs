use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use netscope_filter::RelevancyConfig;
use tracing_subscriber::EnvFilter;

mod sim;

#[derive(Parser)]
#[command(name = "netscope-cli", about = "Inspect relevancy configs and simulate interest management")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Load and validate a relevancy config file
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the resolved filter profile table
    Profiles {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a deterministic random-walk simulation
    Simulate {
        /// Config file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "500")]
        objects: u32,
        #[arg(long, default_value = "4")]
        connections: u32,
        #[arg(short, long, default_value = "60")]
        ticks: u64,
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Re-read and hot-reload the config file every N ticks
        #[arg(long)]
        reload_every: Option<u64>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load(path: &Path) -> anyhow::Result<RelevancyConfig> {
    RelevancyConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("netscope-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", netscope_common::crate_info());
            println!("locations: {}", netscope_locations::crate_info());
            println!("grid: {}", netscope_grid::crate_info());
            println!("filter: {}", netscope_filter::crate_info());
            println!("replication: {}", netscope_replication::crate_info());
        }
        Commands::Check { config } => {
            let loaded = load(&config)?;
            let bounds = loaded.world_bounds;
            println!("{}: OK", config.display());
            println!("world bounds: {:?} .. {:?}", bounds.min, bounds.max);
            println!("max_net_cull_distance: {}", loaded.max_net_cull_distance);
            println!("max_cells_per_query: {}", loaded.max_cells_per_query);
            println!("profiles: {}", loaded.profile_table().len());
        }
        Commands::Profiles { config } => {
            let loaded = load(&config)?;
            println!(
                "{:<16} {:>10} {:>10} {:>8} {:>8}",
                "name", "cell_x", "cell_y", "cull_f", "view_f"
            );
            for (_, name, profile) in loaded.profile_table().iter() {
                println!(
                    "{:<16} {:>10} {:>10} {:>8} {:>8}",
                    name,
                    profile.cell_size_x,
                    profile.cell_size_y,
                    profile.frame_count_before_culling,
                    profile.view_pos_relevancy_frame_count
                );
            }
        }
        Commands::Simulate {
            config,
            objects,
            connections,
            ticks,
            seed,
            reload_every,
            json,
        } => {
            let loaded = match &config {
                Some(path) => load(path)?,
                None => RelevancyConfig::default(),
            };
            if reload_every.is_some() && config.is_none() {
                tracing::warn!("--reload-every has no effect without --config");
            }
            let options = sim::SimOptions {
                objects,
                connections,
                ticks,
                seed,
                reload_every,
                config_path: config,
            };
            let summary = sim::run(loaded, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Simulated {} ticks: objects={}, seed={}, reloads={}",
                    summary.ticks, summary.objects, seed, summary.reloads
                );
                for c in &summary.connections {
                    println!("  conn#{}: {} relevant", c.connection, c.relevant_objects);
                }
                println!(
                    "changes={}, capped_queries={}, oversized_cull_distances={}",
                    summary.relevancy_changes,
                    summary.capped_queries,
                    summary.oversized_cull_distances
                );
                println!(
                    "tick time: avg={:?} max={:?}, pairs/tick={:.1}",
                    summary.average_tick, summary.max_tick, summary.average_pairs_evaluated
                );
            }
        }
    }

    Ok(())
}
