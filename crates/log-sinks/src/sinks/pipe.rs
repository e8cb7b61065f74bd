use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};

use activity_log_codec::{write_eof_sentinel, write_frame, write_stream_version, Frame, CURRENT_STREAM_VERSION};
use activity_log_dispatch::{MonitorClient, Sink, SinkDescriptor};
use activity_log_model::MulticastEntry;
use anyhow::Context;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use crate::backoff::Backoff;

/// A pipe consumer may not have started listening yet by the time this sink
/// activates; retry the connect a handful of times before giving up and
/// letting the dispatcher quarantine the sink.
#[cfg(unix)]
const CONNECT_ATTEMPTS: u32 = 5;

/// Streams unicast-framed entries to a Unix-domain-socket listener (spec.md
/// §4.9/§6's pipe protocol): version header on connect, one frame per event,
/// a zero byte on clean disconnect. A connection failure is fatal only to
/// this sink — it is quarantined like any other faulting sink, not the
/// whole dispatcher.
///
/// Multicast entries are downgraded to their unicast form (`LogEntry`) on
/// the wire: a pipe has exactly one producer-facing counterpart on the
/// other end and has no use for the multicast back-pointer bookkeeping.
pub struct PipeSink {
    path: PathBuf,
    #[cfg(unix)]
    stream: Option<UnixStream>,
}

impl PipeSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            #[cfg(unix)]
            stream: None,
        }
    }
}

#[cfg(unix)]
impl Sink for PipeSink {
    fn activate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<bool> {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(250));
        let mut rng = rand::thread_rng();
        let mut stream = loop {
            match UnixStream::connect(&self.path) {
                Ok(stream) => break stream,
                Err(e) if backoff.failures() + 1 < CONNECT_ATTEMPTS => {
                    tracing::warn!(path = %self.path.display(), error = %e, "pipe sink connect failed, retrying");
                    std::thread::sleep(backoff.fail(&mut rng));
                },
                Err(e) => {
                    return Err(e).with_context(|| format!("connecting to pipe sink at {}", self.path.display()))
                },
            }
        };
        write_stream_version(&mut stream, CURRENT_STREAM_VERSION)?;
        self.stream = Some(stream);
        Ok(true)
    }

    fn apply_configuration(&mut self, desc: &SinkDescriptor) -> anyhow::Result<bool> {
        match desc {
            SinkDescriptor::Pipe(cfg) => Ok(std::path::Path::new(&cfg.path) == self.path),
            _ => Ok(false),
        }
    }

    fn handle(&mut self, _worker_monitor: &Arc<MonitorClient>, event: &MulticastEntry) -> anyhow::Result<()> {
        let stream = self.stream.as_mut().context("pipe sink handled an event before activation")?;
        write_frame(stream, &Frame::Unicast(event.entry.clone()))?;
        Ok(())
    }

    fn on_timer(&mut self, _worker_monitor: &Arc<MonitorClient>, _period: Duration) -> anyhow::Result<()> {
        if let Some(stream) = &mut self.stream {
            stream.flush()?;
        }
        Ok(())
    }

    fn deactivate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            write_eof_sentinel(&mut stream)?;
            stream.flush()?;
        }
        Ok(())
    }
}
