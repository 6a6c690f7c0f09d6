use crate::alarm::AlarmNotification;
use crate::config::NotificationConfig;
use crate::decoder;
use crate::notification::{Dispatcher, ImplementationRegistry, Registry};
use async_trait::async_trait;
use slog_scope::{error, info, warn};
use std::{fmt, io};

/// One message as delivered by the partitioned stream.
#[derive(Debug, Clone)]
pub struct EventData {
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseReason {
    Shutdown,
    LeaseLost,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CloseReason::Shutdown => write!(f, "Shutdown"),
            CloseReason::LeaseLost => write!(f, "LeaseLost"),
        }
    }
}

/// Handle to the partition a processor owns. `checkpoint` durably marks
/// everything handed to the processor so far as done; it is idempotent and a
/// no-op before the first batch.
pub trait PartitionContext: Send + Sync {
    fn partition_id(&self) -> i32;
    fn checkpoint(&self) -> Result<(), io::Error>;
}

/// The per-partition callback surface driven by the stream host. One
/// instance per owned partition; calls arrive strictly sequentially.
#[async_trait]
pub trait EventProcessor: Send {
    async fn open(&mut self, context: &dyn PartitionContext);

    async fn process_batch(&mut self, context: &dyn PartitionContext, messages: &[EventData]);

    async fn error(
        &mut self,
        context: &dyn PartitionContext,
        error: &(dyn std::error::Error + Send + Sync),
    );

    async fn close(&mut self, context: &dyn PartitionContext, reason: CloseReason);
}

pub trait EventProcessorFactory: Send + Sync {
    fn create(&self) -> Box<dyn EventProcessor>;
}

/// Turns each batch of raw stream messages into notification dispatches.
///
/// Per message: decode the payload as UTF-8, split it into JSON documents,
/// map each document to an alarm and dispatch its actions, in order and one
/// at a time. The checkpoint advances exactly once per batch, after every
/// document has been dispatched, so a crash mid-batch redelivers the whole
/// batch (at-least-once).
pub struct AlarmEventProcessor<R: ImplementationRegistry> {
    dispatcher: Dispatcher<R>,
}

impl<R: ImplementationRegistry> AlarmEventProcessor<R> {
    pub fn new(dispatcher: Dispatcher<R>) -> AlarmEventProcessor<R> {
        AlarmEventProcessor { dispatcher }
    }
}

#[async_trait]
impl<R: ImplementationRegistry> EventProcessor for AlarmEventProcessor<R> {
    async fn open(&mut self, context: &dyn PartitionContext) {
        info!(
            "Notification event processor initialized";
            "partition" => context.partition_id()
        );
    }

    async fn process_batch(&mut self, context: &dyn PartitionContext, messages: &[EventData]) {
        for message in messages {
            let payload = match &message.payload {
                Some(payload) => payload,
                None => continue,
            };

            let text = match std::str::from_utf8(payload) {
                Ok(text) => text,
                Err(error) => {
                    warn!(
                        "Skipping a message that is not valid UTF-8";
                        "partition" => context.partition_id(),
                        "offset" => message.offset,
                        "error" => %error
                    );

                    continue;
                }
            };

            for value in decoder::decode(text) {
                match AlarmNotification::from_value(value) {
                    Ok(alarm) => {
                        info!("Handling an alarm notification"; &alarm);
                        self.dispatcher.dispatch(&alarm).await;
                    }
                    Err(error) => {
                        warn!(
                            "Skipping a document that does not map to an alarm";
                            "partition" => context.partition_id(),
                            "offset" => message.offset,
                            "error" => %error
                        );
                    }
                }
            }
        }

        if let Err(error) = context.checkpoint() {
            error!(
                "Couldn't checkpoint the partition";
                "partition" => context.partition_id(),
                "error" => %error
            );
        }
    }

    async fn error(
        &mut self,
        context: &dyn PartitionContext,
        error: &(dyn std::error::Error + Send + Sync),
    ) {
        error!(
            "Error on partition";
            "partition" => context.partition_id(),
            "error" => %error
        );
    }

    async fn close(&mut self, context: &dyn PartitionContext, reason: CloseReason) {
        info!(
            "Notification event processor shutting down";
            "partition" => context.partition_id(),
            "reason" => %reason
        );

        if let Err(error) = context.checkpoint() {
            error!(
                "Couldn't checkpoint the partition on close";
                "partition" => context.partition_id(),
                "error" => %error
            );
        }
    }
}

/// Builds one alarm processor per owned partition, all sharing the webhook
/// configuration.
pub struct AlarmEventProcessorFactory {
    config: NotificationConfig,
}

impl AlarmEventProcessorFactory {
    pub fn new(config: &NotificationConfig) -> AlarmEventProcessorFactory {
        AlarmEventProcessorFactory {
            config: config.clone(),
        }
    }
}

impl EventProcessorFactory for AlarmEventProcessorFactory {
    fn create(&self) -> Box<dyn EventProcessor> {
        Box::new(AlarmEventProcessor::new(Dispatcher::new(Registry::new(
            &self.config,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::test_logger;
    use crate::notification::mock::{Call, CallLog, MockRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestContext {
        checkpoints: AtomicUsize,
        // How many implementation calls had happened when the checkpoint
        // fired, to prove the checkpoint comes last.
        calls_at_checkpoint: AtomicUsize,
        log: CallLog,
    }

    impl TestContext {
        fn new(log: CallLog) -> TestContext {
            TestContext {
                checkpoints: AtomicUsize::new(0),
                calls_at_checkpoint: AtomicUsize::new(0),
                log,
            }
        }
    }

    impl PartitionContext for TestContext {
        fn partition_id(&self) -> i32 {
            0
        }

        fn checkpoint(&self) -> Result<(), io::Error> {
            self.checkpoints.fetch_add(1, Ordering::SeqCst);
            self.calls_at_checkpoint
                .store(self.log.lock().unwrap().len(), Ordering::SeqCst);

            Ok(())
        }
    }

    fn setup() -> (AlarmEventProcessor<MockRegistry>, TestContext) {
        let registry = MockRegistry::new();
        let context = TestContext::new(registry.calls.clone());

        (AlarmEventProcessor::new(Dispatcher::new(registry)), context)
    }

    fn event(offset: i64, documents: &[&str]) -> EventData {
        EventData {
            offset,
            payload: Some(documents.concat().into_bytes()),
        }
    }

    fn email_document(template: &str) -> String {
        format!(
            "{{\"Rule_id\":\"12345\",\"Rule_description\":\"Sample test description\",\
             \"Actions\":[{{\"Type\":\"Email\",\"Parameters\":{{\"Template\":\"{}\",\
             \"Email\":[\"a@x.com\"]}}}}]}}",
            template
        )
    }

    #[tokio::test]
    async fn a_batch_dispatches_every_document_then_checkpoints_once() {
        test_logger();

        let (mut processor, context) = setup();

        let first = email_document("one");
        let second = email_document("two");
        let third = email_document("three");

        let batch = vec![
            event(1, &[first.as_str(), second.as_str()]),
            event(2, &[third.as_str()]),
        ];

        processor.process_batch(&context, &batch).await;

        let calls = context.log.lock().unwrap();
        let executes = calls.iter().filter(|c| **c == Call::Execute).count();

        assert_eq!(3, executes);
        assert_eq!(1, context.checkpoints.load(Ordering::SeqCst));
        assert_eq!(
            calls.len(),
            context.calls_at_checkpoint.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn an_empty_batch_still_checkpoints_once() {
        test_logger();

        let (mut processor, context) = setup();

        processor.process_batch(&context, &[]).await;

        assert_eq!(1, context.checkpoints.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn a_truncated_document_does_not_abort_the_batch() {
        test_logger();

        let (mut processor, context) = setup();

        let valid = email_document("one");
        let second = email_document("two");
        let batch = vec![
            event(1, &[valid.as_str(), "{\"Rule_id\":\"trunc"]),
            event(2, &[second.as_str()]),
        ];

        processor.process_batch(&context, &batch).await;

        let calls = context.log.lock().unwrap();
        let executes = calls.iter().filter(|c| **c == Call::Execute).count();

        assert_eq!(2, executes);
        assert_eq!(1, context.checkpoints.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_payloads_are_skipped() {
        test_logger();

        let (mut processor, context) = setup();

        let batch = vec![
            EventData {
                offset: 1,
                payload: None,
            },
            EventData {
                offset: 2,
                payload: Some(Vec::new()),
            },
        ];

        processor.process_batch(&context, &batch).await;

        assert!(context.log.lock().unwrap().is_empty());
        assert_eq!(1, context.checkpoints.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_issues_a_final_checkpoint() {
        test_logger();

        let (mut processor, context) = setup();

        processor.close(&context, CloseReason::Shutdown).await;

        assert_eq!(1, context.checkpoints.load(Ordering::SeqCst));
    }
}
