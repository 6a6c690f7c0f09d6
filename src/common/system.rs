use crate::agent::Agent;
use crate::config::Config;
use crate::kafka::EventProcessorHost;
use crate::logger::Logger;
use crate::processor::AlarmEventProcessorFactory;
use chan_signal::{notify, Signal};
use futures::channel::oneshot;
use slog_scope::{debug, info};
use std::{thread, thread::JoinHandle};
use tokio::runtime::Runtime;

pub struct System;

impl System {
    pub fn start(name: &'static str, config: &Config) {
        let logger = Logger::build(name);
        let _log_guard = slog_scope::set_global_logger(logger);

        let exit_signal = notify(&[Signal::INT, Signal::TERM]);
        let (consumer_tx, consumer_rx) = oneshot::channel();

        info!("{} starting up!", name);

        let mut threads: Vec<JoinHandle<_>> = Vec::new();

        threads.push({
            let kafka_config = config.kafka.clone();
            let notification_config = config.notifications.clone();

            thread::spawn(move || {
                debug!("Starting consumer...");

                let runtime = Runtime::new().expect("Runtime creation failed");
                let host = EventProcessorHost::new(&kafka_config);
                let factory = Box::new(AlarmEventProcessorFactory::new(&notification_config));

                runtime.block_on(Agent::new(host).run(factory, consumer_rx));

                debug!("Exiting consumer...");
            })
        });

        chan_select! {
            exit_signal.recv() -> signal => {
                info!("Received signal: {:?}", signal);

                let _ = consumer_tx.send(());

                for thread in threads {
                    thread.thread().unpark();
                    thread.join().unwrap();
                }
            },
        }
    }
}
