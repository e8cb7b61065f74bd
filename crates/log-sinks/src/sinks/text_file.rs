use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use activity_log_dispatch::{MonitorClient, Sink, SinkDescriptor};
use activity_log_model::{EntryBody, MulticastEntry};
use anyhow::Context;

/// Appends a plain-text rendering of every event to a file, one line per
/// entry. Reconfiguration identity is the file path (spec.md §8 scenario 4):
/// the same path keeps the sink and its open handle, a different path is a
/// distinct descriptor the reconciliation loop treats as a new sink.
pub struct TextFileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl TextFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    fn open(&mut self) -> anyhow::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening text file sink at {}", self.path.display()))?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

impl Sink for TextFileSink {
    fn activate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<bool> {
        self.open()?;
        Ok(true)
    }

    fn apply_configuration(&mut self, desc: &SinkDescriptor) -> anyhow::Result<bool> {
        match desc {
            SinkDescriptor::TextFile(cfg) => Ok(Path::new(&cfg.path) == self.path),
            _ => Ok(false),
        }
    }

    fn handle(&mut self, _worker_monitor: &Arc<MonitorClient>, event: &MulticastEntry) -> anyhow::Result<()> {
        let writer = self.writer.as_mut().context("text file sink handled an event before activation")?;
        writeln!(writer, "{}", render_line(event))?;
        Ok(())
    }

    fn on_timer(&mut self, _worker_monitor: &Arc<MonitorClient>, _period: Duration) -> anyhow::Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }

    fn deactivate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

pub(crate) fn render_line(event: &MulticastEntry) -> String {
    let indent = "  ".repeat(event.group_depth_at_entry as usize);
    let common = &event.entry.common;
    let mut line = format!(
        "{} [{:?}] {}{}",
        common.timestamp.instant.to_rfc3339(),
        common.level.level,
        indent,
        match &event.entry.body {
            EntryBody::Line => common.text.as_deref().unwrap_or(""),
            EntryBody::OpenGroup => common.text.as_deref().unwrap_or("(group)"),
            EntryBody::CloseGroup { .. } => "(end group)",
        }
    );
    if let EntryBody::CloseGroup { conclusions } = &event.entry.body {
        if !conclusions.is_empty() {
            line.push_str(" -- ");
            line.push_str(&conclusions.join("; "));
        }
    }
    if let Some(tags) = &common.tags {
        if !tags.is_empty() {
            line.push_str(" #");
            line.push_str(&tags.canonical());
        }
    }
    if let Some(exception) = &common.exception {
        line.push_str(&format!(" !! {}: {}", exception.type_name, exception.message));
    }
    line
}
