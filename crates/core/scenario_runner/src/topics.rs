use fiware_api::ContextEntity;
use fiware_config::TenantContext;
use mqtt_channel::ChannelError;
use mqtt_channel::Topic;
use serde_json::Value;

/// Topic prefix of the IoT-Agent JSON
pub const JSON_PROTOCOL: &str = "json";

/// Topic where a device publishes its measures: `/<protocol>/<apikey>/<device_id>/attrs`
pub fn uplink_topic(apikey: &str, device_id: &str) -> Result<Topic, ChannelError> {
    Topic::new(&format!("/{JSON_PROTOCOL}/{apikey}/{device_id}/attrs"))
}

/// Topic where a device publishes the outcome of a command
///
/// `/<protocol>/<apikey>/<device_id>/cmdexe`
pub fn command_result_topic(apikey: &str, device_id: &str) -> Result<Topic, ChannelError> {
    Topic::new(&format!("/{JSON_PROTOCOL}/{apikey}/{device_id}/cmdexe"))
}

/// Topic where the IoT-Agent forwards the commands sent to a device: `/<apikey>/<device_id>/cmd`
pub fn command_topic(apikey: &str, device_id: &str) -> Result<Topic, ChannelError> {
    Topic::new(&format!("/{apikey}/{device_id}/cmd"))
}

/// A string with `${...}` placeholders, as used by custom notifications
///
/// The placeholders are the ones substituted by the Context Broker:
/// `${id}`, `${type}`, `${service}`, `${servicePath}`
/// and the attribute names of the notified entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    template: String,
}

impl TopicTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        TopicTemplate {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Inject the values of an entity into the template
    ///
    /// `"dynamic/${type}/${id}"` is rendered as `"dynamic/Room/Room1"`
    /// for the entity `Room1` of type `Room`.
    /// Unknown placeholders are left unchanged.
    pub fn render(&self, entity: &ContextEntity, tenant: &TenantContext) -> String {
        self.template
            .split_inclusive('}')
            .flat_map(|s| match s.find("${") {
                None => vec![s],
                Some(i) => {
                    let (prefix, placeholder) = s.split_at(i);
                    vec![prefix, placeholder]
                }
            })
            .map(|s| replace_placeholder(s, entity, tenant))
            .collect()
    }
}

/// Inject the values of an entity into a JSON template
///
/// A string made of a single attribute placeholder is replaced by the JSON value of the attribute,
/// so `"${temperature}"` is rendered as the number `21.5` and not as the string `"21.5"`.
pub fn render_json(template: &Value, entity: &ContextEntity, tenant: &TenantContext) -> Value {
    match template {
        Value::String(s) => {
            let attribute = s
                .strip_prefix("${")
                .and_then(|s| s.strip_suffix('}'))
                .filter(|name| !matches!(*name, "id" | "type" | "service" | "servicePath"))
                .and_then(|name| entity.attribute_value(name));
            match attribute {
                Some(value) => value.clone(),
                None => Value::String(TopicTemplate::new(s.as_str()).render(entity, tenant)),
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_json(item, entity, tenant))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), render_json(value, entity, tenant)))
                .collect(),
        ),
        _ => template.clone(),
    }
}

fn replace_placeholder(input: &str, entity: &ContextEntity, tenant: &TenantContext) -> String {
    let Some(name) = input.strip_prefix("${").and_then(|s| s.strip_suffix('}')) else {
        return input.to_string();
    };
    match name {
        "id" => entity.id.clone(),
        "type" => entity.entity_type.clone(),
        "service" => tenant.service().to_string(),
        "servicePath" => tenant.service_path().to_string(),
        attr => entity
            .attribute_value(attr)
            .map(json_as_string)
            .unwrap_or_else(|| input.to_string()),
    }
}

fn json_as_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}
