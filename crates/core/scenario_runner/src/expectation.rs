use crate::assertions::NotificationMatch;
use crate::assertions::NumericMatch;
use fiware_api::EntityQuery;
use fiware_config::TimingConfig;
use serde_json::Value;
use std::fmt::Display;
use std::time::Duration;

/// A predicate on the state of the platform
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    AttributeValue {
        entity_id: String,
        entity_type: Option<String>,
        attr: String,
        expected: Value,
        numeric: NumericMatch,
    },

    AttributeAbsent {
        entity_id: String,
        entity_type: Option<String>,
        attr: String,
    },

    AttributeType {
        entity_id: String,
        entity_type: Option<String>,
        attr: String,
        expected_type: String,
    },

    AttributeMetadataPresent {
        entity_id: String,
        entity_type: Option<String>,
        attr: String,
    },

    EntityExists {
        entity_id: String,
        entity_type: Option<String>,
        exists: bool,
    },

    EntityCount {
        query: EntityQuery,
        expected: usize,
    },

    DeviceCount {
        expected: usize,
    },

    DeviceExists {
        device_id: String,
        exists: bool,
    },

    /// A notification received on a topic since the stimulus
    ///
    /// When `subscription` is set, NGSI envelopes must be sent by the subscription
    /// created at that index of the scenario setup.
    Notification {
        topic: String,
        matcher: NotificationMatch,
        subscription: Option<usize>,
    },

    TimeSeriesLength {
        entity_id: String,
        attr: String,
        last_n: Option<usize>,
        expected: usize,
    },
}

impl Check {
    pub fn attribute_value(
        entity_id: impl Into<String>,
        attr: impl Into<String>,
        expected: impl Into<Value>,
    ) -> Self {
        Check::AttributeValue {
            entity_id: entity_id.into(),
            entity_type: None,
            attr: attr.into(),
            expected: expected.into(),
            numeric: NumericMatch::Exact,
        }
    }

    pub fn attribute_absent(entity_id: impl Into<String>, attr: impl Into<String>) -> Self {
        Check::AttributeAbsent {
            entity_id: entity_id.into(),
            entity_type: None,
            attr: attr.into(),
        }
    }

    pub fn attribute_type(
        entity_id: impl Into<String>,
        attr: impl Into<String>,
        expected_type: impl Into<String>,
    ) -> Self {
        Check::AttributeType {
            entity_id: entity_id.into(),
            entity_type: None,
            attr: attr.into(),
            expected_type: expected_type.into(),
        }
    }

    pub fn attribute_metadata_present(
        entity_id: impl Into<String>,
        attr: impl Into<String>,
    ) -> Self {
        Check::AttributeMetadataPresent {
            entity_id: entity_id.into(),
            entity_type: None,
            attr: attr.into(),
        }
    }

    pub fn entity_exists(entity_id: impl Into<String>, exists: bool) -> Self {
        Check::EntityExists {
            entity_id: entity_id.into(),
            entity_type: None,
            exists,
        }
    }

    pub fn notification(topic: impl Into<String>, matcher: NotificationMatch) -> Self {
        Check::Notification {
            topic: topic.into(),
            matcher,
            subscription: None,
        }
    }

    /// Restrict the check to a given entity type
    pub fn of_type(mut self, expected_type: impl Into<String>) -> Self {
        match &mut self {
            Check::AttributeValue { entity_type, .. }
            | Check::AttributeAbsent { entity_type, .. }
            | Check::AttributeType { entity_type, .. }
            | Check::AttributeMetadataPresent { entity_type, .. }
            | Check::EntityExists { entity_type, .. } => {
                *entity_type = Some(expected_type.into())
            }
            _ => {}
        }
        self
    }

    /// Compare numbers as `f64`, `15` being then equal to `15.0`
    ///
    /// Numbers are compared exactly by default.
    pub fn widened(mut self) -> Self {
        match &mut self {
            Check::AttributeValue { numeric, .. } => *numeric = NumericMatch::Widened,
            Check::Notification { matcher, .. } => *matcher = matcher.clone().widened(),
            _ => {}
        }
        self
    }

    /// Only accept notifications sent by the subscription created at that index of the setup
    pub fn from_subscription(mut self, index: usize) -> Self {
        if let Check::Notification { subscription, .. } = &mut self {
            *subscription = Some(index)
        }
        self
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Check::Notification { .. })
    }
}

impl Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::AttributeValue {
                entity_id,
                attr,
                expected,
                ..
            } => write!(f, "{entity_id}.{attr} == {expected}"),
            Check::AttributeAbsent {
                entity_id, attr, ..
            } => write!(f, "{entity_id} has no attribute {attr}"),
            Check::AttributeType {
                entity_id,
                attr,
                expected_type,
                ..
            } => write!(f, "{entity_id}.{attr} is of type {expected_type}"),
            Check::AttributeMetadataPresent {
                entity_id, attr, ..
            } => write!(f, "{entity_id}.{attr} has metadata"),
            Check::EntityExists {
                entity_id, exists, ..
            } => {
                if *exists {
                    write!(f, "entity {entity_id} exists")
                } else {
                    write!(f, "entity {entity_id} doesn't exist")
                }
            }
            Check::EntityCount { query, expected } => {
                write!(f, "{expected} entities match {:?}", query.params())
            }
            Check::DeviceCount { expected } => write!(f, "{expected} devices are provisioned"),
            Check::DeviceExists { device_id, exists } => {
                if *exists {
                    write!(f, "device {device_id} exists")
                } else {
                    write!(f, "device {device_id} doesn't exist")
                }
            }
            Check::Notification { topic, matcher, .. } => {
                write!(f, "notification on {topic} matching {matcher:?}")
            }
            Check::TimeSeriesLength {
                entity_id,
                attr,
                expected,
                ..
            } => write!(f, "{expected} values recorded for {entity_id}.{attr}"),
        }
    }
}

/// When a check is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Polled till satisfied or the deadline is reached
    Eventually,

    /// Evaluated once the settle delay has elapsed; used to assert that something didn't happen
    Settled,
}

/// A check to be satisfied after a stimulus
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub check: Check,
    pub mode: Mode,
    pub deadline: Option<Duration>,
}

impl Expectation {
    pub fn eventually(check: Check) -> Self {
        Expectation {
            check,
            mode: Mode::Eventually,
            deadline: None,
        }
    }

    pub fn settled(check: Check) -> Self {
        Expectation {
            check,
            mode: Mode::Settled,
            deadline: None,
        }
    }

    pub fn with_deadline(self, deadline: Duration) -> Self {
        Expectation {
            deadline: Some(deadline),
            ..self
        }
    }

    /// How long after the stimulus the check can be satisfied
    pub fn deadline(&self, timing: &TimingConfig) -> Duration {
        match (self.deadline, self.mode) {
            (Some(deadline), _) => deadline,
            (None, Mode::Settled) => timing.settle,
            (None, Mode::Eventually) if self.check.is_notification() => {
                timing.notification_deadline
            }
            (None, Mode::Eventually) => timing.deadline,
        }
    }
}

impl Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            Mode::Eventually => write!(f, "eventually {}", self.check),
            Mode::Settled => write!(f, "after settling {}", self.check),
        }
    }
}
