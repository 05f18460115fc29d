use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;

/// A context entity in NGSI v2 normalized representation
///
/// Attributes are flattened next to the `id` and `type` of the entity:
///
/// ```json
/// {"id": "Room1", "type": "Room", "temperature": {"type": "Number", "value": 23.5, "metadata": {}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntity {
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, ContextAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAttribute {
    #[serde(rename = "type", default = "default_attribute_type")]
    pub attr_type: String,

    #[serde(default)]
    pub value: Value,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, MetadataValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataValue {
    #[serde(rename = "type", default = "default_attribute_type")]
    pub metadata_type: String,

    #[serde(default)]
    pub value: Value,
}

fn default_attribute_type() -> String {
    "Text".to_string()
}

impl ContextEntity {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        ContextEntity {
            id: id.into(),
            entity_type: entity_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        attr_type: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.attributes
            .insert(name.into(), ContextAttribute::new(attr_type, value));
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, ContextAttribute>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&ContextAttribute> {
        self.attributes.get(name)
    }

    pub fn attribute_value(&self, name: &str) -> Option<&Value> {
        self.attribute(name).map(|attr| &attr.value)
    }

    /// An entity with the same identity and only the given attributes
    pub fn with_only(&self, names: &[&str]) -> ContextEntity {
        ContextEntity {
            id: self.id.clone(),
            entity_type: self.entity_type.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|(name, _)| names.contains(&name.as_str()))
                .map(|(name, attr)| (name.clone(), attr.clone()))
                .collect(),
        }
    }

    /// The attributes, without the `id` nor the `type`, as sent to update an entity
    pub fn attributes_json(&self) -> Value {
        serde_json::to_value(&self.attributes).unwrap_or(Value::Null)
    }
}

impl Display for ContextEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.entity_type)
    }
}

impl ContextAttribute {
    pub fn new(attr_type: impl Into<String>, value: impl Into<Value>) -> Self {
        ContextAttribute {
            attr_type: attr_type.into(),
            value: value.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        name: impl Into<String>,
        metadata_type: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.metadata.insert(
            name.into(),
            MetadataValue {
                metadata_type: metadata_type.into(),
                value: value.into(),
            },
        );
        self
    }
}

/// Filter applied when listing entities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityQuery {
    pub id: Option<String>,
    pub id_pattern: Option<String>,
    pub entity_type: Option<String>,
    pub attrs: Vec<String>,
    pub q: Option<String>,
}

impl EntityQuery {
    pub fn all() -> Self {
        EntityQuery::default()
    }

    pub fn with_id_pattern(self, pattern: impl Into<String>) -> Self {
        EntityQuery {
            id_pattern: Some(pattern.into()),
            ..self
        }
    }

    pub fn with_type(self, entity_type: impl Into<String>) -> Self {
        EntityQuery {
            entity_type: Some(entity_type.into()),
            ..self
        }
    }

    /// The query parameters as expected by `GET /v2/entities`
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(id) = &self.id {
            params.push(("id", id.clone()));
        }
        if let Some(pattern) = &self.id_pattern {
            params.push(("idPattern", pattern.clone()));
        }
        if let Some(entity_type) = &self.entity_type {
            params.push(("type", entity_type.clone()));
        }
        if !self.attrs.is_empty() {
            params.push(("attrs", self.attrs.join(",")));
        }
        if let Some(q) = &self.q {
            params.push(("q", q.clone()));
        }
        params
    }
}

/// Action of a batch update (`POST /v2/op/update`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    /// Create the entities or the attributes, updating the existing ones
    Append,

    /// Create the entities or the attributes, failing on the existing ones
    AppendStrict,

    /// Update existing attributes, failing on missing ones
    Update,

    /// Replace all the attributes of existing entities
    Replace,

    /// Delete the given attributes, or the entities when no attribute is given
    Delete,
}

impl Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self {
            ActionType::Append => "append",
            ActionType::AppendStrict => "appendStrict",
            ActionType::Update => "update",
            ActionType::Replace => "replace",
            ActionType::Delete => "delete",
        };
        f.write_str(action)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperation {
    pub action_type: ActionType,
    pub entities: Vec<ContextEntity>,
}
