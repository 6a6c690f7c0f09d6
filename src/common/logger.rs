use crate::alarm::AlarmNotification;
use slog::{o, Drain, Key, Record, Serializer, KV};
use slog_async::Async;
use slog_json::Json;
use slog_term::{CompactFormat, TermDecorator};
use std::{env, io};

pub struct Logger;

impl Logger {
    pub fn build(application_name: &'static str) -> slog::Logger {
        let drain = match env::var("LOG_FORMAT") {
            Ok(ref val) if val == "json" => {
                let drain = Json::new(io::stdout()).add_default_keys().build().fuse();
                Async::new(drain).build().fuse()
            }
            _ => {
                let decorator = TermDecorator::new().stdout().build();
                let drain = CompactFormat::new(decorator).build().fuse();
                Async::new(drain).build().fuse()
            }
        };

        let environment = env::var("RUST_ENV").unwrap_or_else(|_| String::from("development"));

        slog::Logger::root(
            drain,
            o!("application_name" => application_name, "environment" => environment),
        )
    }
}

impl KV for AlarmNotification {
    fn serialize(&self, _record: &Record, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_str(Key::from("rule_id"), &self.rule_id)?;
        serializer.emit_str(Key::from("rule_severity"), &self.rule_severity)?;
        serializer.emit_str(Key::from("device_id"), &self.device_id)?;
        serializer.emit_usize(Key::from("actions"), self.actions.len())?;

        Ok(())
    }
}

/// Installs a discarding global logger so code under test can log through
/// `slog_scope` without a configured drain. Safe to call repeatedly.
#[cfg(test)]
pub fn test_logger() {
    let logger = slog::Logger::root(slog::Discard, o!());
    slog_scope::set_global_logger(logger).cancel_reset();
}
