use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// An NGSI v2 subscription
///
/// The `id` is assigned by the Context Broker: it is never sent on creation nor update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub subject: Subject,

    pub notification: Notification,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttling: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Expired,
    Failed,
    Oneshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub entities: Vec<EntityPattern>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

/// An entity selector: either an exact `id` or an `idPattern` regex
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "idPattern", default, skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl EntityPattern {
    pub fn id(id: impl Into<String>) -> Self {
        EntityPattern {
            id: Some(id.into()),
            ..EntityPattern::default()
        }
    }

    pub fn id_pattern(pattern: impl Into<String>) -> Self {
        EntityPattern {
            id_pattern: Some(pattern.into()),
            ..EntityPattern::default()
        }
    }

    pub fn with_type(self, entity_type: impl Into<String>) -> Self {
        EntityPattern {
            entity_type: Some(entity_type.into()),
            ..self
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Map<String, Value>>,
}

/// Where and how the Context Broker notifies the changes
///
/// Exactly one of `http`, `mqtt` and `mqtt_custom` is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt_custom: Option<MqttCustomTarget>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs_format: Option<String>,

    #[serde(default, skip_serializing)]
    pub times_sent: Option<u64>,

    #[serde(default, skip_serializing)]
    pub last_notification: Option<String>,

    #[serde(default, skip_serializing)]
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTarget {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttTarget {
    pub url: String,
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,
}

/// An MQTT notification with a custom payload
///
/// At most one of `payload` (text), `json` and `ngsi` (entity remap) is expected.
/// All of them, as well as the topic, can use `${...}` macros substituted by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttCustomTarget {
    pub url: String,
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ngsi: Option<Map<String, Value>>,
}

impl MqttCustomTarget {
    pub fn new(url: impl Into<String>, topic: impl Into<String>) -> Self {
        MqttCustomTarget {
            url: url.into(),
            topic: topic.into(),
            qos: None,
            user: None,
            passwd: None,
            payload: None,
            json: None,
            ngsi: None,
        }
    }
}

impl Notification {
    pub fn http(url: impl Into<String>) -> Self {
        Notification {
            http: Some(HttpTarget { url: url.into() }),
            ..Notification::default()
        }
    }

    pub fn mqtt(url: impl Into<String>, topic: impl Into<String>) -> Self {
        Notification {
            mqtt: Some(MqttTarget {
                url: url.into(),
                topic: topic.into(),
                qos: None,
                user: None,
                passwd: None,
            }),
            ..Notification::default()
        }
    }

    pub fn mqtt_custom(target: MqttCustomTarget) -> Self {
        Notification {
            mqtt_custom: Some(target),
            ..Notification::default()
        }
    }

    /// Authenticate on the MQTT broker notifications are published to
    pub fn with_credentials(mut self, user: impl Into<String>, passwd: impl Into<String>) -> Self {
        let (user, passwd) = (Some(user.into()), Some(passwd.into()));
        if let Some(target) = self.mqtt.as_mut() {
            target.user.clone_from(&user);
            target.passwd.clone_from(&passwd);
        }
        if let Some(target) = self.mqtt_custom.as_mut() {
            target.user = user;
            target.passwd = passwd;
        }
        self
    }

    pub fn with_attrs(self, attrs: Vec<String>) -> Self {
        Notification { attrs, ..self }
    }

    pub fn with_metadata(self, metadata: Vec<String>) -> Self {
        Notification { metadata, ..self }
    }

    /// The MQTT topic notifications are published on, if notified over MQTT
    pub fn mqtt_topic(&self) -> Option<&str> {
        self.mqtt
            .as_ref()
            .map(|target| target.topic.as_str())
            .or(self.mqtt_custom.as_ref().map(|target| target.topic.as_str()))
    }
}

impl Subscription {
    pub fn new(subject: Subject, notification: Notification) -> Self {
        Subscription {
            id: None,
            description: None,
            subject,
            notification,
            throttling: None,
            status: None,
            expires: None,
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Subscription {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn with_throttling(self, throttling: u64) -> Self {
        Subscription {
            throttling: Some(throttling),
            ..self
        }
    }

    pub fn with_status(self, status: SubscriptionStatus) -> Self {
        Subscription {
            status: Some(status),
            ..self
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, None | Some(SubscriptionStatus::Active))
    }
}

impl Subject {
    pub fn new(entities: Vec<EntityPattern>) -> Self {
        Subject {
            entities,
            condition: None,
        }
    }

    /// Notify only on changes of the given attributes
    pub fn on_change_of(self, attrs: Vec<String>) -> Self {
        Subject {
            condition: Some(Condition {
                attrs,
                expression: None,
            }),
            ..self
        }
    }
}

/// A context provider registration
///
/// Only listed and deleted when cleaning a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub details: Map<String, Value>,
}
