use assert_json_diff::assert_json_matches_no_panic;
use assert_json_diff::CompareMode;
use assert_json_diff::Config;
use assert_json_diff::NumericMode;
use fiware_api::ContextEntity;
use serde_json::Value;
use std::fmt::Display;

/// How numbers are compared
///
/// The platform is free to store an integer as a float:
/// `Widened` tolerates this normalization where `Exact` doesn't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericMatch {
    /// The JSON representations must be equal: `15` differs from `15.0`
    Exact,

    /// Numbers are compared as `f64`: `15` equals `15.0`
    Widened,
}

/// The difference between what was expected and what has been observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: String,
    pub observed: String,
}

impl Mismatch {
    pub fn new(expected: impl Into<String>, observed: impl Into<String>) -> Self {
        Mismatch {
            expected: expected.into(),
            observed: observed.into(),
        }
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "expected: {}, observed: {}",
            self.expected, self.observed
        )
    }
}

impl std::error::Error for Mismatch {}

/// Compare two JSON values, possibly tolerating numeric widening
pub fn values_match(expected: &Value, observed: &Value, numeric: NumericMatch) -> bool {
    match (expected, observed, numeric) {
        (Value::Number(expected), Value::Number(observed), NumericMatch::Widened) => {
            expected.as_f64() == observed.as_f64()
        }
        (Value::Array(expected), Value::Array(observed), NumericMatch::Widened) => {
            expected.len() == observed.len()
                && expected
                    .iter()
                    .zip(observed)
                    .all(|(e, o)| values_match(e, o, numeric))
        }
        (Value::Object(expected), Value::Object(observed), NumericMatch::Widened) => {
            expected.len() == observed.len()
                && expected.iter().all(|(key, e)| {
                    observed
                        .get(key)
                        .is_some_and(|o| values_match(e, o, numeric))
                })
        }
        (expected, observed, _) => expected == observed,
    }
}

pub fn assert_attribute_value(
    entity: &ContextEntity,
    attr: &str,
    expected: &Value,
    numeric: NumericMatch,
) -> Result<(), Mismatch> {
    let expectation = || format!("{}.{attr} == {expected}", entity.id);
    match entity.attribute_value(attr) {
        Some(observed) if values_match(expected, observed, numeric) => Ok(()),
        Some(observed) => Err(Mismatch::new(
            expectation(),
            format!("{}.{attr} == {observed}", entity.id),
        )),
        None => Err(Mismatch::new(
            expectation(),
            format!("no attribute {attr} on {entity}"),
        )),
    }
}

pub fn assert_attribute_absent(entity: &ContextEntity, attr: &str) -> Result<(), Mismatch> {
    match entity.attribute_value(attr) {
        None => Ok(()),
        Some(observed) => Err(Mismatch::new(
            format!("no attribute {attr} on {}", entity.id),
            format!("{}.{attr} == {observed}", entity.id),
        )),
    }
}

pub fn assert_attribute_type(
    entity: &ContextEntity,
    attr: &str,
    expected_type: &str,
) -> Result<(), Mismatch> {
    let expectation = || format!("{}.{attr} of type {expected_type}", entity.id);
    match entity.attribute(attr) {
        Some(attribute) if attribute.attr_type == expected_type => Ok(()),
        Some(attribute) => Err(Mismatch::new(
            expectation(),
            format!("{}.{attr} of type {}", entity.id, attribute.attr_type),
        )),
        None => Err(Mismatch::new(
            expectation(),
            format!("no attribute {attr} on {entity}"),
        )),
    }
}

pub fn assert_attribute_metadata_present(
    entity: &ContextEntity,
    attr: &str,
) -> Result<(), Mismatch> {
    let expectation = || format!("metadata on {}.{attr}", entity.id);
    match entity.attribute(attr) {
        Some(attribute) if !attribute.metadata.is_empty() => Ok(()),
        Some(_) => Err(Mismatch::new(
            expectation(),
            format!("no metadata on {}.{attr}", entity.id),
        )),
        None => Err(Mismatch::new(
            expectation(),
            format!("no attribute {attr} on {entity}"),
        )),
    }
}

/// What is expected from the payload of a notification
///
/// Numbers are compared exactly unless the matcher is `widened()`.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationMatch {
    /// Default NGSI envelope: `data[0].<attr>.value` equals the value
    DataAttribute {
        attr: String,
        value: Value,
        numeric: NumericMatch,
    },

    /// Custom text payload, compared as is
    Text(String),

    /// Custom JSON payload, including at least the given fields
    Json {
        expected: Value,
        numeric: NumericMatch,
    },

    /// Custom NGSI payload: a notified entity has the (remapped) attribute set to the value
    Ngsi {
        attr: String,
        value: Value,
        numeric: NumericMatch,
    },
}

impl NotificationMatch {
    pub fn data_attribute(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        NotificationMatch::DataAttribute {
            attr: attr.into(),
            value: value.into(),
            numeric: NumericMatch::Exact,
        }
    }

    pub fn text(payload: impl Into<String>) -> Self {
        NotificationMatch::Text(payload.into())
    }

    pub fn json(expected: impl Into<Value>) -> Self {
        NotificationMatch::Json {
            expected: expected.into(),
            numeric: NumericMatch::Exact,
        }
    }

    pub fn ngsi(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        NotificationMatch::Ngsi {
            attr: attr.into(),
            value: value.into(),
            numeric: NumericMatch::Exact,
        }
    }

    /// Compare numbers as `f64`, `15` being then equal to `15.0`
    pub fn widened(mut self) -> Self {
        match &mut self {
            NotificationMatch::DataAttribute { numeric, .. }
            | NotificationMatch::Json { numeric, .. }
            | NotificationMatch::Ngsi { numeric, .. } => *numeric = NumericMatch::Widened,
            NotificationMatch::Text(_) => {}
        }
        self
    }

    pub fn check(&self, payload: &str) -> Result<(), Mismatch> {
        match self {
            NotificationMatch::Text(expected) if expected == payload => Ok(()),
            NotificationMatch::Text(expected) => Err(Mismatch::new(
                format!("payload {expected:?}"),
                format!("payload {payload:?}"),
            )),
            NotificationMatch::DataAttribute {
                attr,
                value,
                numeric,
            } => {
                let envelope = parse_payload(payload)?;
                let observed = envelope
                    .pointer("/data/0")
                    .and_then(|entity| entity.get(attr))
                    .and_then(|attribute| attribute.get("value"));
                match observed {
                    Some(observed) if values_match(value, observed, *numeric) => Ok(()),
                    _ => Err(Mismatch::new(
                        format!("data[0].{attr}.value == {value}"),
                        payload,
                    )),
                }
            }
            NotificationMatch::Json { expected, numeric } => {
                let observed = parse_payload(payload)?;
                let config = match numeric {
                    NumericMatch::Exact => Config::new(CompareMode::Inclusive),
                    NumericMatch::Widened => Config::new(CompareMode::Inclusive)
                        .numeric_mode(NumericMode::AssumeFloat),
                };
                assert_json_matches_no_panic(&observed, expected, config)
                    .map_err(|diff| Mismatch::new(expected.to_string(), diff))
            }
            NotificationMatch::Ngsi {
                attr,
                value,
                numeric,
            } => {
                let observed = parse_payload(payload)?;
                let entities = match observed.get("data") {
                    Some(Value::Array(entities)) => entities.clone(),
                    _ => vec![observed],
                };
                let found = entities.iter().any(|entity| {
                    entity
                        .get(attr)
                        .and_then(|attribute| attribute.get("value"))
                        .is_some_and(|observed| values_match(value, observed, *numeric))
                });
                if found {
                    Ok(())
                } else {
                    Err(Mismatch::new(
                        format!("an entity with {attr}.value == {value}"),
                        payload,
                    ))
                }
            }
        }
    }
}

fn parse_payload(payload: &str) -> Result<Value, Mismatch> {
    serde_json::from_str(payload)
        .map_err(|err| Mismatch::new("a JSON payload", format!("{payload:?}: {err}")))
}
