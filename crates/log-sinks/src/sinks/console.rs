use std::{io::Write, sync::Arc, time::Duration};

use activity_log_dispatch::{MonitorClient, Sink, SinkDescriptor};
use activity_log_model::MulticastEntry;

use super::text_file::render_line;

/// Writes a plain-text rendering of every event to stdout, one line per
/// entry, with no ANSI coloring (spec's non-goals exclude a styled console
/// renderer). Since there is only ever one process stdout, this sink has no
/// per-instance configuration to diverge on: `apply_configuration` always
/// accepts another `Console` descriptor.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn activate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn apply_configuration(&mut self, desc: &SinkDescriptor) -> anyhow::Result<bool> {
        Ok(matches!(desc, SinkDescriptor::Console(_)))
    }

    fn handle(&mut self, _worker_monitor: &Arc<MonitorClient>, event: &MulticastEntry) -> anyhow::Result<()> {
        println!("{}", render_line(event));
        Ok(())
    }

    fn on_timer(&mut self, _worker_monitor: &Arc<MonitorClient>, _period: Duration) -> anyhow::Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }

    fn deactivate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use activity_log_model::{EntryBody, EntryCommon, Level, LogEntry, LogLevel, Timestamp};
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn worker_monitor() -> Arc<MonitorClient> {
        activity_log_dispatch::Dispatcher::spawn(
            activity_log_dispatch::DispatcherConfig::default(),
            Arc::new(|_| anyhow::bail!("no sinks configured")),
            None,
        )
        .worker_monitor()
    }

    #[test]
    fn accepts_any_console_descriptor() {
        let mut sink = ConsoleSink::new();
        assert!(sink
            .apply_configuration(&SinkDescriptor::Console(activity_log_dispatch::ConsoleConfig))
            .unwrap());
        assert!(!sink
            .apply_configuration(&SinkDescriptor::TextFile(activity_log_dispatch::TextFileConfig {
                path: "x".to_string()
            }))
            .unwrap());
    }

    #[test]
    fn handling_an_event_does_not_fail() {
        let monitor = worker_monitor();
        let mut sink = ConsoleSink::new();
        assert!(sink.activate(&monitor).unwrap());
        let mut common = EntryCommon::new(Timestamp::new(Utc::now(), 0), Level::unfiltered(LogLevel::Info));
        common.text = Some("visible on stdout".to_string());
        let event = MulticastEntry {
            monitor_id: Uuid::new_v4(),
            group_depth_at_entry: 0,
            previous_timestamp: None,
            previous_entry_kind: None,
            entry: LogEntry::new(common, EntryBody::Line),
        };
        sink.handle(&monitor, &event).unwrap();
        sink.deactivate(&monitor).unwrap();
    }
}
