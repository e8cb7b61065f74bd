//! Concrete [`Sink`] implementations and the default registry mapping a
//! [`SinkDescriptor`] to one of them (spec.md §9's closed, explicit factory
//! replacing the source's reflection-based lookup).

#[cfg(unix)]
mod backoff;
mod sinks;

pub use sinks::binary_file::BinaryFileSink;
pub use sinks::console::ConsoleSink;
#[cfg(unix)]
pub use sinks::pipe::PipeSink;
pub use sinks::text_file::TextFileSink;

use std::sync::Arc;

use activity_log_dispatch::{Sink, SinkDescriptor, SinkFactory};

/// Builds the stock [`SinkFactory`]: every [`SinkDescriptor`] variant named
/// in spec.md §6 maps to exactly one concrete sink type. `PipeSink` is only
/// registered on Unix targets, where `std::os::unix::net::UnixStream` is
/// available; a `Pipe` descriptor on any other target is rejected.
pub fn default_registry() -> SinkFactory {
    Arc::new(|desc: &SinkDescriptor| -> anyhow::Result<Box<dyn Sink>> {
        match desc {
            SinkDescriptor::TextFile(cfg) => Ok(Box::new(TextFileSink::new(cfg.path.clone()))),
            SinkDescriptor::BinaryFile(cfg) => {
                Ok(Box::new(BinaryFileSink::new(cfg.path.clone(), cfg.use_gzip_compression)))
            },
            SinkDescriptor::Console(_) => Ok(Box::new(ConsoleSink::new())),
            #[cfg(unix)]
            SinkDescriptor::Pipe(cfg) => Ok(Box::new(PipeSink::new(cfg.path.clone()))),
            #[cfg(not(unix))]
            SinkDescriptor::Pipe(_) => anyhow::bail!("pipe sinks are only supported on unix targets"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_a_sink_for_every_descriptor_variant() {
        let factory = default_registry();
        assert!(factory(&SinkDescriptor::TextFile(activity_log_dispatch::TextFileConfig {
            path: "x.log".to_string(),
        }))
        .is_ok());
        assert!(factory(&SinkDescriptor::BinaryFile(activity_log_dispatch::BinaryFileConfig {
            path: "x.bin".to_string(),
            use_gzip_compression: true,
        }))
        .is_ok());
        assert!(factory(&SinkDescriptor::Console(activity_log_dispatch::ConsoleConfig)).is_ok());
    }
}
