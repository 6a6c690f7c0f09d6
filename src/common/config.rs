use crate::kafka;
use serde_derive::Deserialize;
use std::{fs::File, io::prelude::*};

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub kafka: kafka::Config,
    pub notifications: NotificationConfig,
}

/// Settings for the outbound workflow webhook and the deep link it embeds.
#[derive(Deserialize, Clone, Debug)]
pub struct NotificationConfig {
    pub endpoint_url: String,
    pub solution_name: String,
    pub management_domain: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Config {
    pub fn parse(path: &str) -> Config {
        let mut config_toml = String::new();

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                panic!("Error while reading config file: [{}]", err);
            }
        };

        file.read_to_string(&mut config_toml)
            .unwrap_or_else(|err| panic!("Error while reading config: [{}]", err));

        toml::from_str(&config_toml).unwrap()
    }
}
