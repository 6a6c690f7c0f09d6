use serde::de::{self, Deserialize, Deserializer};
use serde_derive::Deserialize;
use serde_json::Value;

/// One fired rule evaluation, as produced by the stream analytics job.
///
/// The wire shape is permissive on purpose: unknown fields are ignored and
/// missing fields fall back to their zero value, so a partially filled
/// document still maps to an alarm.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlarmNotification {
    #[serde(rename = "Rule_id", alias = "rule_id")]
    pub rule_id: String,
    #[serde(rename = "Rule_description", alias = "rule_description")]
    pub rule_description: String,
    #[serde(rename = "Rule_severity", alias = "rule_severity")]
    pub rule_severity: String,
    #[serde(rename = "Device_id", alias = "device_id")]
    pub device_id: String,
    #[serde(rename = "Created_at", alias = "created_at")]
    pub created_at: String,
    #[serde(rename = "Modified_at", alias = "modified_at")]
    pub modified_at: String,
    #[serde(rename = "Actions", alias = "actions", deserialize_with = "null_as_empty")]
    pub actions: Vec<Action>,
}

impl AlarmNotification {
    /// Maps a decoded JSON value into an alarm record.
    pub fn from_value(value: Value) -> Result<AlarmNotification, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// A configured notification action attached to an alarm. The action tag is
/// a closed set; tags this service does not recognize are kept with their
/// raw name so the dispatcher can report the skip.
#[derive(Debug, Clone)]
pub enum Action {
    Email(EmailParameters),
    Unknown { kind: String },
}

impl Action {
    pub fn kind(&self) -> &str {
        match self {
            Action::Email(_) => "Email",
            Action::Unknown { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmailParameters {
    #[serde(rename = "Template", alias = "template")]
    pub template: String,
    #[serde(rename = "Subject", alias = "subject")]
    pub subject: Option<String>,
    #[serde(rename = "Email", alias = "email")]
    pub email: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(default)]
struct ActionWire {
    #[serde(rename = "Type", alias = "type")]
    kind: String,
    #[serde(rename = "Parameters", alias = "parameters")]
    parameters: Value,
}

impl Default for ActionWire {
    fn default() -> ActionWire {
        ActionWire {
            kind: String::new(),
            parameters: Value::Object(Default::default()),
        }
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Action, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = ActionWire::deserialize(deserializer)?;

        match wire.kind.as_str() {
            "Email" => {
                let parameters =
                    EmailParameters::deserialize(wire.parameters).map_err(de::Error::custom)?;

                Ok(Action::Email(parameters))
            }
            other => Ok(Action::Unknown {
                kind: other.to_string(),
            }),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Action>, D::Error>
where
    D: Deserializer<'de>,
{
    let actions = Option::<Vec<Action>>::deserialize(deserializer)?;
    Ok(actions.unwrap_or_default())
}
