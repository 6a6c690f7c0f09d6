use crate::kafka::ProcessorHost;
use crate::processor::EventProcessorFactory;
use futures::channel::oneshot;
use slog_scope::{error, info};

/// Owns the process-lifetime registration of an event processor factory
/// against the partitioned-stream host.
pub struct Agent<H: ProcessorHost> {
    host: H,
}

impl<H: ProcessorHost> Agent<H> {
    pub fn new(host: H) -> Agent<H> {
        Agent { host }
    }

    /// Registers the factory and drives the host until `control` fires. If
    /// shutdown was already requested when called, no registration happens
    /// at all. Host failures are logged; the hosting process stays up.
    pub async fn run(
        mut self,
        factory: Box<dyn EventProcessorFactory>,
        mut control: oneshot::Receiver<()>,
    ) {
        let already_cancelled = match control.try_recv() {
            Ok(None) => false,
            Ok(Some(())) | Err(_) => true,
        };

        if already_cancelled {
            info!("Shutdown requested before startup, skipping host registration");
            return;
        }

        if self.host.run(factory, control).await.is_err() {
            error!("Event processor host terminated with an error");
        }
    }
}
