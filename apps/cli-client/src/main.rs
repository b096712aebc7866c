use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_sdk::{BeekeeperClient, BeekeeperConfig};
use common::{GroupBy, NodeRecord};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "beekeeper")]
#[command(about = "Query node manifests, liveness and factory data for a sensor network")]
struct Cli {
    /// Service root; overrides BEEKEEPER_URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Request timeout in seconds; overrides BEEKEEPER_TIMEOUT_SECS.
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the manifest index.
    Manifest {
        #[arg(long, default_value_t = GroupBy::Id)]
        by: GroupBy,
    },
    /// Print one node's manifest with its factory record.
    Node {
        identifier: String,
        #[arg(long, default_value_t = GroupBy::Id)]
        by: GroupBy,
    },
    /// Print the joined node state.
    State {
        #[arg(long)]
        with_factory: bool,
        /// Keep nodes the monitoring service does not list.
        #[arg(long)]
        no_filter: bool,
        /// Print one summary line per node instead of JSON.
        #[arg(long)]
        summary: bool,
    },
    Monitor,
    Factory {
        identifier: String,
    },
    Ontology {
        name: Option<String>,
    },
    FormatBytes {
        bytes: u64,
        #[arg(long)]
        si: bool,
    },
    TimeAgo {
        elapsed_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::FormatBytes { bytes, si } => {
            let text = if si {
                view_format::bytes_to_size_si(bytes)
            } else {
                view_format::bytes_to_size_iec(bytes)
            };
            println!("{text}");
            return Ok(());
        }
        Commands::TimeAgo { elapsed_ms } => {
            println!("{}", view_format::ms_to_time_ago(elapsed_ms));
            return Ok(());
        }
        _ => {}
    }

    let mut config = BeekeeperConfig::from_env().context("failed to read configuration")?;
    if let Some(url) = &cli.server_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(secs) = cli.timeout_secs {
        config.request_timeout = std::time::Duration::from_secs(secs.max(1));
    }
    if let Commands::State { no_filter: true, .. } = cli.command {
        config.filter_nodes = false;
    }

    tracing::debug!(
        base_url = %config.base_url,
        filter_nodes = config.filter_nodes,
        "using service"
    );
    let client = BeekeeperClient::new(config).context("failed to build client")?;

    match cli.command {
        Commands::Manifest { by } => {
            let index = client
                .fetch_manifest_index(by)
                .await
                .context("failed to fetch manifests")?;
            print_json(&index)?;
        }
        Commands::Node { identifier, by } => {
            let node = client
                .fetch_node(&identifier, by)
                .await
                .with_context(|| format!("failed to look up node {identifier}"))?;
            match node {
                Some(node) => print_json(&node)?,
                None => anyhow::bail!("no manifest for node {identifier}"),
            }
        }
        Commands::State {
            with_factory,
            summary,
            ..
        } => {
            let nodes = if with_factory {
                client.fetch_joined_state_with_factory().await
            } else {
                client.fetch_joined_state().await
            }
            .context("failed to fetch joined node state")?;

            if summary {
                for node in &nodes {
                    println!("{}", summary_line(node));
                }
            } else {
                print_json(&nodes)?;
            }
        }
        Commands::Monitor => {
            let monitor = client
                .fetch_monitor_index()
                .await
                .context("failed to fetch monitoring data")?;
            print_json(&monitor)?;
        }
        Commands::Factory { identifier } => {
            match client
                .fetch_factory(&identifier)
                .await
                .with_context(|| format!("failed to fetch factory record for {identifier}"))?
            {
                Some(record) => print_json(&record)?,
                None => anyhow::bail!("no factory record for {identifier}"),
            }
        }
        Commands::Ontology { name: Some(name) } => {
            match client
                .fetch_ontology(&name)
                .await
                .context("failed to fetch ontology")?
            {
                Some(entry) => print_json(&entry)?,
                None => anyhow::bail!("unknown ontology {name}"),
            }
        }
        Commands::Ontology { name: None } => {
            let entries = client
                .fetch_ontology_list()
                .await
                .context("failed to fetch ontology")?;
            print_json(&entries)?;
        }
        Commands::FormatBytes { .. } | Commands::TimeAgo { .. } => {}
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summary_line(node: &NodeRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        node.id,
        view_format::display_text(node.vsn.as_deref()),
        node.status,
        view_format::display_text(node.node_type.as_deref()),
        view_format::display_text(node.project.as_deref()),
    )
}
