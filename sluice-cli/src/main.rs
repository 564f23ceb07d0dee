use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sluice_core::config::StreamConfig;
use sluice_core::log_filter::parse_query;
use sluice_core::materializations::AggregationOptions;
use sluice_schemas::{LogFilter, LogLevel, XAxis};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod materializations;
mod selection;
mod watch;
mod websocket_client;

use materializations::run_materializations;
use watch::run_watch;
use websocket_client::WebSocketConfig;

/// Sluice CLI for following orchestrator runs and inspecting materializations
#[derive(Debug, Parser)]
#[command(name = "sluice", version, about, long_about = None)]
struct Args {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, env = "SLUICE_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum XAxisArg {
    /// Materialization timestamp
    Time,
    /// Position of the partition in the partition key space
    Partition,
}

impl From<XAxisArg> for XAxis {
    fn from(value: XAxisArg) -> Self {
        match value {
            XAxisArg::Time => XAxis::Time,
            XAxisArg::Partition => XAxis::Partition,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Follow the event log of a run until it finishes
    Watch {
        /// URL of the orchestrator
        #[arg(long, env = "SLUICE_URL")]
        url: String,

        /// Id of the run to follow
        #[arg(long)]
        run_id: String,

        /// API key for the orchestrator
        #[arg(long, env = "SLUICE_API_KEY")]
        api_key: Option<String>,

        /// Search query, e.g. `step:load type:materialization timeout`
        #[arg(long)]
        filter: Option<String>,

        /// Comma separated log levels to show, all levels when omitted
        #[arg(long, value_delimiter = ',')]
        levels: Vec<LogLevel>,

        /// Only show events emitted from now on
        #[arg(long)]
        tail: bool,

        /// Consecutive failed connection attempts before giving up
        #[arg(long, default_value_t = 5)]
        reconnect_attempts: u32,

        /// Delay between reconnection attempts in milliseconds
        #[arg(long, default_value_t = 1000)]
        reconnect_delay_ms: u64,

        /// Number of stream updates buffered for the consumer
        #[arg(long, default_value_t = 64)]
        buffer_capacity: usize,
    },

    /// Aggregate historical materializations from a json file
    Materializations {
        /// Path to a json file holding materialization records
        #[arg(short, long)]
        file: PathBuf,

        /// What the x value of the numeric series represents
        #[arg(long, value_enum, default_value_t = XAxisArg::Time)]
        x_axis: XAxisArg,

        /// Treat every record as its own bucket
        #[arg(long)]
        no_partition_grouping: bool,

        /// Comma separated partition key space, ordered
        #[arg(long, value_delimiter = ',')]
        partitions: Option<Vec<String>>,
    },
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let log_level = Level::from_str(log_level.to_lowercase().as_str()).unwrap_or(Level::WARN);
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init(),
    }
}

fn build_filter(levels: Vec<LogLevel>, query: Option<&str>, tail: bool) -> LogFilter {
    let mut filter = if levels.is_empty() {
        LogFilter::default()
    } else {
        LogFilter::with_levels(levels)
    };
    filter = filter.with_tokens(query.map(parse_query).unwrap_or_default());
    if tail {
        filter.clear(Utc::now().timestamp_millis());
    }
    filter
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    match args.command {
        Commands::Watch {
            url,
            run_id,
            api_key,
            filter,
            levels,
            tail,
            reconnect_attempts,
            reconnect_delay_ms,
            buffer_capacity,
        } => {
            let websocket = WebSocketConfig::try_new(
                &url,
                api_key,
                reconnect_attempts,
                Duration::from_millis(reconnect_delay_ms),
            )
            .context("Invalid connection settings")?;
            let stream = StreamConfig::try_new(buffer_capacity, StreamConfig::default().transport_capacity)
                .context("Invalid stream settings")?;
            let filter = build_filter(levels, filter.as_deref(), tail);
            debug!(?filter, "Watching run {}", run_id);

            run_watch(run_id, websocket, stream, filter).await?;
        }
        Commands::Materializations {
            file,
            x_axis,
            no_partition_grouping,
            partitions,
        } => {
            let options = AggregationOptions {
                group_by_partition: !no_partition_grouping,
                x_axis: x_axis.into(),
                partition_order: partitions,
            };
            run_materializations(&file, options)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_schemas::{FilterToken, TokenKind};

    #[test]
    fn parses_watch_args() {
        let args = Args::try_parse_from([
            "sluice",
            "watch",
            "--url",
            "ws://localhost:3000",
            "--run-id",
            "abc",
            "--levels",
            "error,warn",
            "--filter",
            "step:load",
        ])
        .unwrap();

        let Commands::Watch {
            levels, filter, ..
        } = args.command
        else {
            panic!("expected watch command");
        };
        assert_eq!(levels, vec![LogLevel::Error, LogLevel::Warning]);

        let filter = build_filter(levels, filter.as_deref(), false);
        assert!(!filter.is_level_enabled(LogLevel::Info));
        assert_eq!(filter.tokens, vec![FilterToken::new(TokenKind::Step, "load")]);
        assert_eq!(filter.since, 0);
    }

    #[test]
    fn parses_materializations_args() {
        let args = Args::try_parse_from([
            "sluice",
            "materializations",
            "-f",
            "records.json",
            "--x-axis",
            "partition",
            "--no-partition-grouping",
        ])
        .unwrap();

        let Commands::Materializations {
            x_axis,
            no_partition_grouping,
            partitions,
            ..
        } = args.command
        else {
            panic!("expected materializations command");
        };
        assert_eq!(XAxis::from(x_axis), XAxis::Partition);
        assert!(no_partition_grouping);
        assert_eq!(partitions, None);
    }

    #[test]
    fn tail_moves_cursor() {
        let filter = build_filter(vec![], None, true);

        assert!(filter.since > 0);
        assert!(filter.is_level_enabled(LogLevel::Debug));
    }
}
