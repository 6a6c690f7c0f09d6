use crate::kafka::Config;
use crate::processor::{
    CloseReason, EventData, EventProcessor, EventProcessorFactory, PartitionContext,
};
use async_trait::async_trait;
use futures::channel::oneshot;
use futures::{pin_mut, select, FutureExt};
use rdkafka::{
    config::ClientConfig,
    consumer::{stream_consumer::StreamConsumer, CommitMode, Consumer},
    error::KafkaError,
    Message,
};
use slog_scope::{error, info, warn};
use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::timeout;

/// A partitioned-stream host that event processor factories register
/// against. Production uses the Kafka-backed `EventProcessorHost`; tests
/// substitute their own.
#[async_trait]
pub trait ProcessorHost: Send {
    async fn run(
        &mut self,
        factory: Box<dyn EventProcessorFactory>,
        control: oneshot::Receiver<()>,
    ) -> Result<(), ()>;
}

/// Drives event processors from a Kafka consumer group.
///
/// Group rebalancing is the lease layer: the broker guarantees a partition
/// is owned by at most one group member, and this host keeps one processor
/// per partition it currently receives messages for. Messages are gathered
/// into bounded batches, handed to the owning processor in partition order,
/// and offsets advance only through the partition context's checkpoint.
pub struct EventProcessorHost {
    input_topic: String,
    group_id: String,
    brokers: String,
    batch_size: usize,
    batch_timeout: Duration,
}

struct PartitionState {
    processor: Box<dyn EventProcessor>,
    context: KafkaPartitionContext,
}

impl EventProcessorHost {
    pub fn new(config: &Config) -> EventProcessorHost {
        EventProcessorHost {
            input_topic: config.input_topic.clone(),
            group_id: config.group_id.clone(),
            brokers: config.brokers.clone(),
            batch_size: config.batch_size,
            batch_timeout: Duration::from_millis(config.batch_timeout_ms),
        }
    }

    /// Collects the next batch of messages, or whatever has arrived when
    /// the batch timeout elapses. Receive errors end the batch so they can
    /// be routed to the processors without delay.
    async fn next_batch(
        &self,
        consumer: &StreamConsumer,
    ) -> (Vec<(i32, EventData)>, Option<KafkaError>) {
        let mut events = Vec::new();

        loop {
            match timeout(self.batch_timeout, consumer.recv()).await {
                Ok(Ok(message)) => {
                    events.push((
                        message.partition(),
                        EventData {
                            offset: message.offset(),
                            payload: message.payload().map(|payload| payload.to_vec()),
                        },
                    ));

                    if events.len() >= self.batch_size {
                        return (events, None);
                    }
                }
                Ok(Err(kafka_error)) => {
                    warn!("Error while receiving from Kafka: {:?}", kafka_error);
                    return (events, Some(kafka_error));
                }
                Err(_elapsed) => {
                    if !events.is_empty() {
                        return (events, None);
                    }
                }
            }
        }
    }

    async fn process(
        &self,
        consumer: &Arc<StreamConsumer>,
        factory: &dyn EventProcessorFactory,
        partitions: &mut HashMap<i32, PartitionState>,
        batch: Vec<(i32, EventData)>,
    ) {
        // Group by partition, keeping both partition order of first arrival
        // and message order within each partition.
        let mut grouped: Vec<(i32, Vec<EventData>)> = Vec::new();

        for (partition, event) in batch {
            match grouped.iter_mut().find(|(p, _)| *p == partition) {
                Some((_, events)) => events.push(event),
                None => grouped.push((partition, vec![event])),
            }
        }

        for (partition, events) in grouped {
            if !partitions.contains_key(&partition) {
                let context = KafkaPartitionContext::new(
                    Arc::clone(consumer),
                    self.input_topic.clone(),
                    partition,
                );

                let mut processor = factory.create();
                processor.open(&context).await;

                partitions.insert(partition, PartitionState { processor, context });
            }

            if let Some(state) = partitions.get_mut(&partition) {
                if let Some(last) = events.last() {
                    state.context.set_last_offset(last.offset);
                }

                state.processor.process_batch(&state.context, &events).await;
            }
        }
    }
}

#[async_trait]
impl ProcessorHost for EventProcessorHost {
    /// Consume until an event is sent through `control`. The control channel
    /// is polled between batches, so shutdown loses at most the batch in
    /// flight.
    async fn run(
        &mut self,
        factory: Box<dyn EventProcessorFactory>,
        mut control: oneshot::Receiver<()>,
    ) -> Result<(), ()> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &self.group_id)
            .set("bootstrap.servers", &self.brokers)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                error!("Consumer creation failed: {:?}", e);
            })?;

        let consumer = Arc::new(consumer);

        consumer.subscribe(&[&self.input_topic]).map_err(|e| {
            error!("Can't subscribe to specified topics: {:?}", e);
        })?;

        info!("Starting alarm event processing");

        let mut partitions: HashMap<i32, PartitionState> = HashMap::new();

        loop {
            let (batch, receive_error) = {
                let next_batch = self.next_batch(&consumer).fuse();
                pin_mut!(next_batch);

                select! {
                    outcome = next_batch => outcome,
                    _ = control => break,
                }
            };

            self.process(&consumer, factory.as_ref(), &mut partitions, batch)
                .await;

            if let Some(kafka_error) = receive_error {
                for state in partitions.values_mut() {
                    state.processor.error(&state.context, &kafka_error).await;
                }
            }
        }

        for state in partitions.values_mut() {
            state
                .processor
                .close(&state.context, CloseReason::Shutdown)
                .await;
        }

        match consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Error committing consumer state: {:?}", e);
                Err(())
            }
        }
    }
}

/// Checkpoint handle for one owned partition. The host records the offset
/// of the last message handed over; `checkpoint` stores it so the next
/// commit acknowledges everything up to and including that message.
pub struct KafkaPartitionContext {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    last_offset: AtomicI64,
}

impl KafkaPartitionContext {
    fn new(consumer: Arc<StreamConsumer>, topic: String, partition: i32) -> KafkaPartitionContext {
        KafkaPartitionContext {
            consumer,
            topic,
            partition,
            last_offset: AtomicI64::new(-1),
        }
    }

    fn set_last_offset(&self, offset: i64) {
        self.last_offset.store(offset, Ordering::SeqCst);
    }
}

impl PartitionContext for KafkaPartitionContext {
    fn partition_id(&self) -> i32 {
        self.partition
    }

    fn checkpoint(&self) -> Result<(), io::Error> {
        let offset = self.last_offset.load(Ordering::SeqCst);

        // Nothing handed to the processor yet, e.g. a checkpoint on close
        // right after open.
        if offset < 0 {
            return Ok(());
        }

        self.consumer
            .store_offset(&self.topic, self.partition, offset)
            .map_err(|kafka_error| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("couldn't store offset: {}", kafka_error),
                )
            })
    }
}
