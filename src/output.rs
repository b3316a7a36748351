//! Rendering of operation results for scripts and terminals

use crate::types::{
    CallResult, Confirmation, DeclareResult, DeployResult, InvokeResult, MulticallResult,
};

use serde_json::{Map, Value};
use starknet_crypto::FieldElement;

/// How numeric values are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormat {
    /// Identifiers in hex, counts in decimal
    #[default]
    Default,
    Hex,
    Int,
}

/// A single printable value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputValue {
    Felt(FieldElement),
    Number(u128),
    List(Vec<OutputValue>),
    Text(String),
}

impl OutputValue {
    fn format(&self, format: ValueFormat) -> String {
        match self {
            OutputValue::Felt(value) => match format {
                ValueFormat::Int => value.to_string(),
                ValueFormat::Default | ValueFormat::Hex => format!("{:#x}", value),
            },
            OutputValue::Number(value) => match format {
                ValueFormat::Hex => format!("{:#x}", value),
                ValueFormat::Default | ValueFormat::Int => value.to_string(),
            },
            OutputValue::List(items) => {
                let items: Vec<String> = items.iter().map(|item| item.format(format)).collect();
                format!("[{}]", items.join(", "))
            }
            OutputValue::Text(text) => text.clone(),
        }
    }

    fn to_json(&self, format: ValueFormat) -> Value {
        match self {
            OutputValue::List(items) => {
                Value::Array(items.iter().map(|item| item.to_json(format)).collect())
            }
            other => Value::String(other.format(format)),
        }
    }
}

/// Results that can be printed as `key: value` lines or JSON
pub trait CommandOutput {
    fn fields(&self) -> Vec<(&'static str, OutputValue)>;
}

impl CommandOutput for DeclareResult {
    fn fields(&self) -> Vec<(&'static str, OutputValue)> {
        let mut fields = vec![("class_hash", OutputValue::Felt(self.class_hash.felt()))];
        if let Some(hash) = self.transaction_hash {
            fields.push(("transaction_hash", OutputValue::Felt(hash.felt())));
        }
        fields
    }
}

impl CommandOutput for DeployResult {
    fn fields(&self) -> Vec<(&'static str, OutputValue)> {
        vec![
            ("contract_address", OutputValue::Felt(self.contract_address.felt())),
            ("transaction_hash", OutputValue::Felt(self.transaction_hash.felt())),
            ("salt", OutputValue::Felt(self.salt)),
        ]
    }
}

impl CommandOutput for InvokeResult {
    fn fields(&self) -> Vec<(&'static str, OutputValue)> {
        vec![("transaction_hash", OutputValue::Felt(self.transaction_hash.felt()))]
    }
}

impl CommandOutput for MulticallResult {
    fn fields(&self) -> Vec<(&'static str, OutputValue)> {
        vec![
            ("transaction_hash", OutputValue::Felt(self.transaction_hash.felt())),
            (
                "deployed",
                OutputValue::List(
                    self.deployed
                        .iter()
                        .map(|address| OutputValue::Felt(address.felt()))
                        .collect(),
                ),
            ),
        ]
    }
}

impl CommandOutput for CallResult {
    fn fields(&self) -> Vec<(&'static str, OutputValue)> {
        vec![(
            "response",
            OutputValue::List(self.data.iter().copied().map(OutputValue::Felt).collect()),
        )]
    }
}

impl CommandOutput for Confirmation {
    fn fields(&self) -> Vec<(&'static str, OutputValue)> {
        match self {
            Confirmation::Settled(outcome) => {
                vec![("status", OutputValue::Text(outcome.to_string()))]
            }
            Confirmation::TimedOut {
                waited,
                last_observed,
            } => vec![
                ("status", OutputValue::Text("timed_out".into())),
                ("last_observed", OutputValue::Text(last_observed.to_string())),
                ("waited_ms", OutputValue::Number(waited.as_millis())),
            ],
        }
    }
}

/// `command: <name>` followed by one `key: value` line per field
pub fn render_lines(command: &str, result: &impl CommandOutput, format: ValueFormat) -> String {
    let mut out = format!("command: {}\n", command);
    for (key, value) in result.fields() {
        out.push_str(&format!("{}: {}\n", key, value.format(format)));
    }
    out
}

/// Same fields as a JSON object
pub fn render_json(command: &str, result: &impl CommandOutput, format: ValueFormat) -> Value {
    let mut object = Map::new();
    object.insert("command".into(), Value::String(command.to_string()));
    for (key, value) in result.fields() {
        object.insert(key.into(), value.to_json(format));
    }
    Value::Object(object)
}
