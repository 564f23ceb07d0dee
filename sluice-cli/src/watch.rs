use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::DateTime;
use indicatif::{ProgressBar, ProgressStyle};
use sluice_core::config::StreamConfig;
use sluice_core::log_filter::{filter_logs, resolve_selection};
use sluice_core::run_log::{LogChange, RunLog};
use sluice_core::run_status::InMemoryRunStore;
use sluice_core::stream::EventStreamClient;
use sluice_core::watcher::RunWatcher;
use sluice_schemas::{LogFilter, RunEvent, RunStatus, StepState, StepStatus};
use tokio::select;
use tokio::signal::ctrl_c;
use tracing::{debug, info};

use crate::selection::StepKeyResolver;
use crate::websocket_client::{WebSocketConfig, WebSocketTransport};

/// Follow a run until it reaches a terminal status
pub async fn run_watch(
    run_id: String,
    websocket: WebSocketConfig,
    stream: StreamConfig,
    filter: LogFilter,
) -> anyhow::Result<()> {
    let transport = Arc::new(WebSocketTransport::new(websocket));
    let client = EventStreamClient::new(transport, stream);
    let store = Arc::new(InMemoryRunStore::new());
    let mut watcher = RunWatcher::new(client, store);

    let progress = spinner(&run_id);
    let mut printer = LogPrinter::new(filter);

    watcher.watch(&run_id);

    let interrupted = ctrl_c();
    tokio::pin!(interrupted);

    let outcome = loop {
        let update = select! {
            _ = &mut interrupted => {
                info!("Received Ctrl+C, stopping watch");
                break Ok(());
            }
            update = watcher.next() => update,
        };

        let Some(update) = update? else {
            break Err(anyhow!("Event stream for run {} closed", run_id));
        };
        let log = watcher
            .log()
            .context("Watched run disappeared while applying an update")?;

        match &update.change {
            LogChange::Reset { epoch, .. } => {
                if *epoch > 1 {
                    progress.println(format!("Reconnected, replaying run log (epoch {epoch})"));
                }
            }
            LogChange::Appended { .. } => {}
            LogChange::Stale { epoch } => {
                debug!(epoch, "Skipping stale batch");
                continue;
            }
            LogChange::Failed(failure) => {
                break Err(anyhow!(
                    "Subscription for run {} failed: {}",
                    failure.run_id,
                    failure.message
                ));
            }
            LogChange::Ended(reason) => {
                break Err(anyhow!("Lost connection to the run event stream: {}", reason));
            }
        }

        for line in printer.render(log, &update.change) {
            progress.println(line);
        }

        if let Some(record) = update.status {
            progress.set_message(format!("run {} {}", run_id, record.status));
            if record.status.is_terminal() {
                break finish(&run_id, record.status);
            }
        }
    };

    progress.finish_and_clear();
    watcher.unwatch();
    outcome
}

fn finish(run_id: &str, status: RunStatus) -> anyhow::Result<()> {
    match status {
        RunStatus::Success => {
            info!("Run {} succeeded", run_id);
            Ok(())
        }
        RunStatus::Canceled => {
            info!("Run {} was canceled", run_id);
            Ok(())
        }
        RunStatus::Failure => Err(anyhow!("Run {} failed", run_id)),
        RunStatus::Queued | RunStatus::Starting | RunStatus::Started | RunStatus::Canceling => {
            Err(anyhow!("Run {} is still {}", run_id, status))
        }
    }
}

fn spinner(run_id: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {elapsed} {msg}")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("run {run_id} waiting for events"));
    pb
}

/// Renders new log lines and step transitions of a watched run.
///
/// A reset replays the run log from the start, so events that were already
/// printed before a reconnect are skipped.
struct LogPrinter {
    filter: LogFilter,
    steps: BTreeMap<String, StepState>,
    printed: usize,
}

impl LogPrinter {
    fn new(filter: LogFilter) -> Self {
        Self {
            filter,
            steps: BTreeMap::new(),
            printed: 0,
        }
    }

    fn render(&mut self, log: &RunLog, change: &LogChange) -> Vec<String> {
        let steps = log.steps();
        let resolver = StepKeyResolver::new(steps.keys().cloned());
        let selection = resolve_selection(&self.filter, &resolver);

        let mut added = log.added_by(change);
        if let LogChange::Reset { .. } = change {
            added = &added[self.printed.min(added.len())..];
        }
        self.printed = log.events().len().max(self.printed);

        let filtered = filter_logs(added, &self.filter, &selection);
        let events = if filtered.has_text_filter {
            filtered.search_matches
        } else {
            filtered.display
        };

        let mut lines: Vec<String> = events.into_iter().map(format_event).collect();
        lines.extend(
            steps
                .values()
                .filter(|step| self.steps.get(&step.key).map(|prev| prev.state) != Some(step.state))
                .map(format_transition),
        );

        self.steps = steps;
        lines
    }
}

fn format_event(event: &RunEvent) -> String {
    let time = DateTime::from_timestamp_millis(event.timestamp)
        .map(|time| time.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| event.timestamp.to_string());

    format!(
        "{} {:<8} {:<24} {:<26} {}",
        time,
        event.level,
        event.step_key.as_deref().unwrap_or("-"),
        event.kind.type_name(),
        event.message
    )
}

fn format_transition(step: &StepState) -> String {
    let elapsed = step
        .elapsed
        .map(|millis| format!(" in {:.2}s", millis as f64 / 1000.0))
        .unwrap_or_default();

    match step.state {
        StepStatus::Waiting => format!("step {} waiting", step.key),
        StepStatus::Running => format!("step {} running", step.key),
        StepStatus::Succeeded => format!("step {} succeeded{}", step.key, elapsed),
        StepStatus::Skipped => format!("step {} skipped", step.key),
        StepStatus::Failed => format!("step {} failed{}", step.key, elapsed),
    }
}
