mod webhook;

pub use self::webhook::WorkflowWebhook;

use crate::alarm::{Action, AlarmNotification};
use crate::config::NotificationConfig;
use async_trait::async_trait;
use http::StatusCode;
use slog_scope::{debug, error, warn};
use std::{fmt, time::Duration};

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationError {
    /// `execute` was called without a receiver list.
    MissingReceiver,
    Timeout,
    Connection,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NotificationError::MissingReceiver => write!(f, "no receiver configured"),
            NotificationError::Timeout => write!(f, "request timed out"),
            NotificationError::Connection => write!(f, "connection error"),
        }
    }
}

impl std::error::Error for NotificationError {}

/// A pluggable delivery mechanism. Implementations are configured with the
/// two setters and then executed once; the registry hands out a fresh
/// instance per action, never a shared one.
#[async_trait]
pub trait NotificationImplementation: Send {
    fn set_receiver(&mut self, receivers: Vec<String>);
    fn set_message(&mut self, message: &str, rule_id: &str, rule_description: &str);
    async fn execute(&self) -> Result<StatusCode, NotificationError>;
}

/// Resolves an action to the implementation that delivers it.
pub trait ImplementationRegistry: Send + Sync {
    fn resolve(&self, action: &Action) -> Option<Box<dyn NotificationImplementation>>;
}

/// The closed production mapping: email actions go out through the workflow
/// webhook, everything else is unhandled.
pub struct Registry {
    endpoint_url: String,
    solution_name: String,
    management_domain: String,
    request_timeout: Duration,
}

impl Registry {
    pub fn new(config: &NotificationConfig) -> Registry {
        Registry {
            endpoint_url: config.endpoint_url.clone(),
            solution_name: config.solution_name.clone(),
            management_domain: config.management_domain.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

impl ImplementationRegistry for Registry {
    fn resolve(&self, action: &Action) -> Option<Box<dyn NotificationImplementation>> {
        match action {
            Action::Email(_) => Some(Box::new(WorkflowWebhook::new(
                &self.endpoint_url,
                &self.solution_name,
                &self.management_domain,
                self.request_timeout,
            ))),
            Action::Unknown { .. } => None,
        }
    }
}

/// Runs an alarm's action list, one action at a time.
pub struct Dispatcher<R: ImplementationRegistry> {
    registry: R,
}

impl<R: ImplementationRegistry> Dispatcher<R> {
    pub fn new(registry: R) -> Dispatcher<R> {
        Dispatcher { registry }
    }

    /// Dispatches every action of the alarm in list order, awaiting each
    /// delivery before starting the next. A failed action is logged and the
    /// remaining actions still run.
    pub async fn dispatch(&self, alarm: &AlarmNotification) {
        for action in &alarm.actions {
            let mut implementation = match self.registry.resolve(action) {
                Some(implementation) => implementation,
                None => {
                    warn!(
                        "No implementation registered for action type";
                        "action_type" => action.kind(),
                        "rule_id" => alarm.rule_id.as_str()
                    );

                    continue;
                }
            };

            if let Action::Email(parameters) = action {
                implementation.set_message(
                    &parameters.template,
                    &alarm.rule_id,
                    &alarm.rule_description,
                );

                if let Some(receivers) = &parameters.email {
                    implementation.set_receiver(receivers.clone());
                }
            }

            match implementation.execute().await {
                Ok(status) if status.is_success() => {
                    debug!(
                        "Notification action executed";
                        "action_type" => action.kind(),
                        "rule_id" => alarm.rule_id.as_str(),
                        "status" => status.as_u16()
                    );
                }
                Ok(status) => {
                    error!(
                        "Error executing the action";
                        "action_type" => action.kind(),
                        "rule_id" => alarm.rule_id.as_str(),
                        "status" => status.as_u16()
                    );
                }
                Err(error) => {
                    error!(
                        "Error executing the action";
                        "action_type" => action.kind(),
                        "rule_id" => alarm.rule_id.as_str(),
                        "error" => %error
                    );
                }
            }
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        SetReceiver(Vec<String>),
        SetMessage {
            message: String,
            rule_id: String,
            rule_description: String,
        },
        Execute,
    }

    pub type CallLog = Arc<Mutex<Vec<Call>>>;

    pub struct MockImplementation {
        calls: CallLog,
        result: Result<StatusCode, NotificationError>,
    }

    #[async_trait]
    impl NotificationImplementation for MockImplementation {
        fn set_receiver(&mut self, receivers: Vec<String>) {
            self.calls.lock().unwrap().push(Call::SetReceiver(receivers));
        }

        fn set_message(&mut self, message: &str, rule_id: &str, rule_description: &str) {
            self.calls.lock().unwrap().push(Call::SetMessage {
                message: message.to_string(),
                rule_id: rule_id.to_string(),
                rule_description: rule_description.to_string(),
            });
        }

        async fn execute(&self) -> Result<StatusCode, NotificationError> {
            self.calls.lock().unwrap().push(Call::Execute);
            self.result.clone()
        }
    }

    /// Resolves email actions to mocks that record their calls in a shared
    /// log; execution results are popped from the front of `results`, with
    /// OK as the fallback.
    pub struct MockRegistry {
        pub calls: CallLog,
        pub results: Mutex<Vec<Result<StatusCode, NotificationError>>>,
    }

    impl MockRegistry {
        pub fn new() -> MockRegistry {
            MockRegistry {
                calls: Arc::new(Mutex::new(Vec::new())),
                results: Mutex::new(Vec::new()),
            }
        }
    }

    impl ImplementationRegistry for MockRegistry {
        fn resolve(&self, action: &Action) -> Option<Box<dyn NotificationImplementation>> {
            match action {
                Action::Email(_) => {
                    let mut results = self.results.lock().unwrap();

                    let result = if results.is_empty() {
                        Ok(StatusCode::OK)
                    } else {
                        results.remove(0)
                    };

                    Some(Box::new(MockImplementation {
                        calls: self.calls.clone(),
                        result,
                    }))
                }
                Action::Unknown { .. } => None,
            }
        }
    }
}
