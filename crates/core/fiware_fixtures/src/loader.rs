use crate::FixtureError;
use fiware_api::ContextEntity;
use fiware_api::Device;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;

/// The kinds of template stored under a fixture root, one sub-directory per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    EntityTemplates,
    DeviceTemplates,
}

impl Category {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::EntityTemplates => "entity_templates",
            Category::DeviceTemplates => "device_templates",
        }
    }

    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Category::EntityTemplates => &["id", "type"],
            Category::DeviceTemplates => &["device_id", "entity_name"],
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A template loaded from the fixture directory
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Entity(ContextEntity),
    Device(Device),
}

impl Descriptor {
    fn kind(&self) -> &'static str {
        match self {
            Descriptor::Entity(_) => "entity",
            Descriptor::Device(_) => "device",
        }
    }

    pub fn into_entity(self) -> Result<ContextEntity, FixtureError> {
        match self {
            Descriptor::Entity(entity) => Ok(entity),
            other => Err(FixtureError::UnexpectedTemplate {
                expected: "entity",
                found: other.kind(),
            }),
        }
    }

    pub fn into_device(self) -> Result<Device, FixtureError> {
        match self {
            Descriptor::Device(device) => Ok(device),
            other => Err(FixtureError::UnexpectedTemplate {
                expected: "device",
                found: other.kind(),
            }),
        }
    }
}

/// A row of a device table: the id of a sensor and the name of its templates
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceRow {
    #[serde(rename = "ID")]
    pub id: String,
    pub sensor_type: String,
}

/// Read-only access to a directory of fixtures
///
/// ```text
/// <root>/entity_templates/<name>.json
/// <root>/device_templates/<name>.json
/// <root>/devices.csv
/// ```
#[derive(Debug, Clone)]
pub struct FixtureLoader {
    root: PathBuf,
}

impl FixtureLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FixtureLoader { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template_path(&self, category: Category, name: &str) -> PathBuf {
        self.root
            .join(category.dir_name())
            .join(format!("{name}.json"))
    }

    pub fn load_template(
        &self,
        category: Category,
        name: &str,
    ) -> Result<Descriptor, FixtureError> {
        let not_found = || FixtureError::NotFound {
            category: category.dir_name(),
            name: name.to_string(),
            root: self.root.clone(),
        };
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(not_found());
        }

        let path = self.template_path(category, name);
        debug!("Loading {category} template from {}", path.display());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(source) => return Err(FixtureError::Io { path, source }),
        };

        let malformed = |reason: String| FixtureError::Malformed {
            path: path.clone(),
            reason,
        };
        let mut fields: Map<String, Value> =
            serde_json::from_str(&content).map_err(|err| malformed(err.to_string()))?;
        for field in category.required_fields() {
            if !fields.get(*field).is_some_and(Value::is_string) {
                return Err(malformed(format!("missing field `{field}`")));
            }
        }

        match category {
            Category::EntityTemplates => serde_json::from_value(Value::Object(fields))
                .map(Descriptor::Entity)
                .map_err(|err| malformed(err.to_string())),
            Category::DeviceTemplates => {
                // The entity type of a device template defaults to the template name
                fields
                    .entry("entity_type")
                    .or_insert_with(|| Value::String(name.to_string()));
                serde_json::from_value(Value::Object(fields))
                    .map(Descriptor::Device)
                    .map_err(|err| malformed(err.to_string()))
            }
        }
    }

    pub fn entity_template(&self, name: &str) -> Result<ContextEntity, FixtureError> {
        self.load_template(Category::EntityTemplates, name)?
            .into_entity()
    }

    pub fn device_template(&self, name: &str) -> Result<Device, FixtureError> {
        self.load_template(Category::DeviceTemplates, name)?
            .into_device()
    }

    /// Read a CSV device table with the columns `ID` and `sensor_type`
    ///
    /// A relative path is resolved from the fixture root.
    pub fn device_table(&self, file: impl AsRef<Path>) -> Result<Vec<DeviceRow>, FixtureError> {
        let path = self.root.join(file.as_ref());
        let table_error = |source| FixtureError::Table {
            path: path.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(table_error)?;
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<DeviceRow>, _>>()
            .map_err(table_error)?;
        debug!("{} devices listed in {}", rows.len(), path.display());
        Ok(rows)
    }

    /// A fresh entity and device pair for a row of a device table
    ///
    /// Both come from the templates named after the row sensor type,
    /// with their ids replaced by the row id.
    pub fn instantiate(&self, row: &DeviceRow) -> Result<(ContextEntity, Device), FixtureError> {
        let mut entity = self.entity_template(&row.sensor_type)?;
        entity.id = row.id.clone();

        let mut device = self.device_template(&row.sensor_type)?;
        device.device_id = row.id.clone();
        device.entity_name = entity.id.clone();
        device.entity_type = entity.entity_type.clone();

        Ok((entity, device))
    }
}
