use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::fmt::Display;

pub const DEFAULT_PROTOCOL: &str = "IoTA-JSON";
pub const DEFAULT_RESOURCE: &str = "/iot/json";

/// How a device sends its measures to the IoT-Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Mqtt,
    Http,
    Amqp,
}

impl Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transport = match self {
            Transport::Mqtt => "MQTT",
            Transport::Http => "HTTP",
            Transport::Amqp => "AMQP",
        };
        f.write_str(transport)
    }
}

/// An attribute mapping a measure field (`object_id`) onto an entity attribute (`name`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    pub name: String,

    #[serde(rename = "type")]
    pub attr_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl DeviceAttribute {
    pub fn new(name: impl Into<String>, attr_type: impl Into<String>) -> Self {
        DeviceAttribute {
            object_id: None,
            name: name.into(),
            attr_type: attr_type.into(),
            metadata: None,
        }
    }

    pub fn with_object_id(self, object_id: impl Into<String>) -> Self {
        DeviceAttribute {
            object_id: Some(object_id.into()),
            ..self
        }
    }

    /// The field of the measure mapped onto this attribute
    pub fn measure_field(&self) -> &str {
        self.object_id.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAttribute {
    pub name: String,

    #[serde(rename = "type")]
    pub attr_type: String,

    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub name: String,

    #[serde(rename = "type", default = "default_command_type")]
    pub command_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

fn default_command_type() -> String {
    "command".to_string()
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl DeviceCommand {
    pub fn new(name: impl Into<String>) -> Self {
        DeviceCommand {
            name: name.into(),
            command_type: default_command_type(),
            object_id: None,
        }
    }
}

/// A device provisioned on the IoT-Agent
///
/// Several devices may map onto the same entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub entity_name: String,
    pub entity_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// `true`: measure fields not mapped by an attribute are dropped,
    /// `false`: they are projected as is onto the entity.
    #[serde(rename = "explicitAttrs", default)]
    pub explicit_attrs: bool,

    #[serde(default)]
    pub attributes: Vec<DeviceAttribute>,

    #[serde(default)]
    pub commands: Vec<DeviceCommand>,

    #[serde(default)]
    pub static_attributes: Vec<StaticAttribute>,

    #[serde(default)]
    pub lazy: Vec<DeviceAttribute>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<bool>,
}

impl Device {
    pub fn new(
        device_id: impl Into<String>,
        entity_name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Device {
            device_id: device_id.into(),
            entity_name: entity_name.into(),
            entity_type: entity_type.into(),
            transport: None,
            protocol: default_protocol(),
            apikey: None,
            endpoint: None,
            explicit_attrs: false,
            attributes: Vec::new(),
            commands: Vec::new(),
            static_attributes: Vec::new(),
            lazy: Vec::new(),
            timezone: None,
            timestamp: None,
        }
    }

    pub fn with_transport(self, transport: Transport) -> Self {
        Device {
            transport: Some(transport),
            ..self
        }
    }

    pub fn with_apikey(self, apikey: impl Into<String>) -> Self {
        Device {
            apikey: Some(apikey.into()),
            ..self
        }
    }

    pub fn with_explicit_attrs(self, explicit_attrs: bool) -> Self {
        Device {
            explicit_attrs,
            ..self
        }
    }

    pub fn with_attribute(mut self, attribute: DeviceAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_command(mut self, command: DeviceCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// The attribute mapped from the given measure field, if any
    pub fn attribute_for_field(&self, field: &str) -> Option<&DeviceAttribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.measure_field() == field)
    }
}

/// A service group (a.k.a. configuration group) of the IoT-Agent, keyed by `(resource, apikey)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub resource: String,
    pub apikey: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Whether unknown devices sending measures are provisioned on the fly
    #[serde(default = "default_autoprovision")]
    pub autoprovision: bool,

    #[serde(rename = "explicitAttrs", default)]
    pub explicit_attrs: bool,

    #[serde(default)]
    pub attributes: Vec<DeviceAttribute>,

    #[serde(default)]
    pub static_attributes: Vec<StaticAttribute>,

    #[serde(default)]
    pub commands: Vec<DeviceCommand>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbroker: Option<String>,
}

fn default_autoprovision() -> bool {
    true
}

impl ServiceGroup {
    pub fn new(resource: impl Into<String>, apikey: impl Into<String>) -> Self {
        ServiceGroup {
            resource: resource.into(),
            apikey: apikey.into(),
            entity_type: None,
            autoprovision: true,
            explicit_attrs: false,
            attributes: Vec::new(),
            static_attributes: Vec::new(),
            commands: Vec::new(),
            cbroker: None,
        }
    }

    pub fn with_entity_type(self, entity_type: impl Into<String>) -> Self {
        ServiceGroup {
            entity_type: Some(entity_type.into()),
            ..self
        }
    }

    pub fn with_autoprovision(self, autoprovision: bool) -> Self {
        ServiceGroup {
            autoprovision,
            ..self
        }
    }

    pub fn with_explicit_attrs(self, explicit_attrs: bool) -> Self {
        ServiceGroup {
            explicit_attrs,
            ..self
        }
    }

    pub fn with_attribute(mut self, attribute: DeviceAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_cbroker(self, cbroker: impl Into<String>) -> Self {
        ServiceGroup {
            cbroker: Some(cbroker.into()),
            ..self
        }
    }

    /// The key identifying this group
    pub fn key(&self) -> (&str, &str) {
        (&self.resource, &self.apikey)
    }
}
