use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// An entity for which QuantumLeap holds time series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesHeader {
    pub entity_id: String,

    #[serde(default)]
    pub entity_type: Option<String>,

    #[serde(default)]
    pub index: Option<String>,
}

/// The values recorded for one attribute of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSeries {
    pub entity_id: String,

    #[serde(default)]
    pub entity_type: Option<String>,

    pub attr_name: String,

    #[serde(default)]
    pub index: Vec<String>,

    #[serde(default)]
    pub values: Vec<Value>,
}

impl AttributeSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.values.last()
    }
}
