mod host;

pub use self::host::{EventProcessorHost, ProcessorHost};

use serde_derive::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub input_topic: String,
    pub group_id: String,
    pub brokers: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    500
}

fn default_batch_timeout_ms() -> u64 {
    1_000
}
