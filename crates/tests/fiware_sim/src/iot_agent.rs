use crate::context_broker::COMMAND_RESULT;
use crate::context_broker::COMMAND_STATUS;
use crate::errors::duplicate;
use crate::errors::not_found;
use crate::state::SimState;
use crate::state::TenantState;
use crate::FiwareSim;
use async_trait::async_trait;
use fiware_api::ContextEntity;
use fiware_api::Device;
use fiware_api::IotAgent;
use fiware_api::PlatformError;
use fiware_api::ServiceGroup;
use fiware_api::Transport;
use fiware_config::TenantContext;
use mqtt_channel::Message;
use serde_json::json;
use serde_json::Value;
use tracing::debug;

/// Entity type of the devices autoprovisioned under a group with none
const DEFAULT_ENTITY_TYPE: &str = "Thing";

/// The provisioning API of the IoT-Agent JSON, plus its http south bound
pub struct SimIotAgent {
    sim: FiwareSim,
    tenant: TenantContext,
}

impl SimIotAgent {
    pub fn new(sim: FiwareSim, tenant: TenantContext) -> Self {
        SimIotAgent { sim, tenant }
    }

    fn with_tenant<T>(&self, action: impl FnOnce(&mut TenantState) -> T) -> T {
        let mut state = self.sim.lock();
        action(state.tenant(&self.tenant))
    }
}

/// The device a measure is meant for, along with the tenant and group it belongs to
struct Target {
    tenant: TenantContext,
    group: ServiceGroup,
    device: Device,
}

impl SimState {
    /// Resolve the device a message sent by a device is meant for
    ///
    /// Return `None` when the message has to be dropped.
    fn target(
        &mut self,
        apikey: &str,
        device_id: &str,
        transport: Transport,
        autoprovision: bool,
    ) -> Option<Target> {
        let Some((tenant, group)) = self.tenants().find_map(|(tenant, state)| {
            state
                .groups
                .iter()
                .find(|group| group.apikey == apikey)
                .map(|group| (tenant.clone(), group.clone()))
        }) else {
            debug!("No service group for the api key {apikey}");
            return None;
        };

        let quirks = self.quirks;
        let state = self.tenant(&tenant);
        let device = match state.device(device_id) {
            Some(device) => {
                if device.apikey.as_deref().is_some_and(|key| key != apikey)
                    && !quirks.cross_group_updates_accepted
                {
                    debug!("Device {device_id} doesn't belong to the group {apikey}");
                    return None;
                }
                if device.transport.is_some_and(|expected| expected != transport)
                    && !quirks.cross_transport_updates_accepted
                {
                    debug!("Device {device_id} doesn't accept messages over {transport}");
                    return None;
                }
                device.clone()
            }
            None if autoprovision && group.autoprovision => {
                let device = autoprovisioned(&group, device_id, transport);
                debug!("Autoprovisioning device {device_id} as {}", device.entity_name);
                state.devices.push(device.clone());
                device
            }
            None => {
                debug!("Unknown device {device_id}");
                return None;
            }
        };

        Some(Target {
            tenant,
            group,
            device,
        })
    }

    /// Apply a measure sent by a device, returning the notifications it triggers
    pub(crate) fn ingest(
        &mut self,
        apikey: &str,
        device_id: &str,
        measure: &Value,
        transport: Transport,
    ) -> Vec<Message> {
        let Some(fields) = measure.as_object() else {
            debug!("Ignoring a measure of {device_id} which is not a JSON object");
            return vec![];
        };
        let Some(Target {
            tenant,
            group,
            device,
        }) = self.target(apikey, device_id, transport, true)
        else {
            return vec![];
        };

        let mut update = ContextEntity::new(&device.entity_name, &device.entity_type);
        for (field, value) in fields {
            let mapping = device.attribute_for_field(field).or_else(|| {
                group
                    .attributes
                    .iter()
                    .filter(|_| !device.explicit_attrs)
                    .find(|attribute| attribute.measure_field() == field.as_str())
            });
            match mapping {
                Some(attribute) => {
                    update = update.with_attribute(
                        &attribute.name,
                        &attribute.attr_type,
                        value.clone(),
                    );
                }
                None if !device.explicit_attrs => {
                    update = update.with_attribute(field, inferred_type(value), value.clone());
                }
                None => debug!("Ignoring the unmapped field {field} of {device_id}"),
            }
        }
        if update.attributes.is_empty() {
            return vec![];
        }
        for attribute in &device.static_attributes {
            update = update.with_attribute(
                &attribute.name,
                &attribute.attr_type,
                attribute.value.clone(),
            );
        }

        let change = self.tenant(&tenant).upsert(&update);
        self.notify(&tenant, &change)
    }

    /// Apply the results of commands reported by a device
    pub(crate) fn command_result(
        &mut self,
        apikey: &str,
        device_id: &str,
        results: &Value,
        transport: Transport,
    ) -> Vec<Message> {
        let Some(results) = results.as_object() else {
            return vec![];
        };
        let Some(Target {
            tenant,
            group,
            device,
        }) = self.target(apikey, device_id, transport, false)
        else {
            return vec![];
        };

        let mut update = ContextEntity::new(&device.entity_name, &device.entity_type);
        for (command, result) in results {
            if !device
                .commands
                .iter()
                .chain(&group.commands)
                .any(|known| known.name == *command)
            {
                debug!("Ignoring the result of the unknown command {command} of {device_id}");
                continue;
            }
            update = update
                .with_attribute(format!("{command}_status"), COMMAND_STATUS, "OK")
                .with_attribute(format!("{command}_info"), COMMAND_RESULT, result.clone());
        }
        if update.attributes.is_empty() {
            return vec![];
        }

        let change = self.tenant(&tenant).upsert(&update);
        self.notify(&tenant, &change)
    }
}

fn autoprovisioned(group: &ServiceGroup, device_id: &str, transport: Transport) -> Device {
    let entity_type = group.entity_type.as_deref().unwrap_or(DEFAULT_ENTITY_TYPE);
    let mut device = Device::new(device_id, format!("{entity_type}:{device_id}"), entity_type)
        .with_transport(transport)
        .with_apikey(&group.apikey)
        .with_explicit_attrs(group.explicit_attrs);
    device.attributes = group.attributes.clone();
    device.commands = group.commands.clone();
    device.static_attributes = group.static_attributes.clone();
    device
}

fn inferred_type(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "Number",
        Value::Bool(_) => "Boolean",
        Value::String(_) => "Text",
        Value::Null => "None",
        Value::Array(_) | Value::Object(_) => "StructuredValue",
    }
}

fn group_url(resource: &str, apikey: &str) -> String {
    format!("/iot/services?resource={resource}&apikey={apikey}")
}

fn device_url(device_id: &str) -> String {
    format!("/iot/devices/{device_id}")
}

#[async_trait]
impl IotAgent for SimIotAgent {
    async fn get_version(&self) -> Result<Value, PlatformError> {
        Ok(json!({"libVersion": "simulated"}))
    }

    async fn get_group_list(&self) -> Result<Vec<ServiceGroup>, PlatformError> {
        Ok(self.with_tenant(|state| state.groups.clone()))
    }

    async fn get_group(&self, resource: &str, apikey: &str) -> Result<ServiceGroup, PlatformError> {
        self.with_tenant(|state| {
            state
                .groups
                .iter()
                .find(|group| group.key() == (resource, apikey))
                .cloned()
        })
        .ok_or_else(|| not_found("GET", group_url(resource, apikey)))
    }

    async fn post_groups(&self, groups: &[ServiceGroup]) -> Result<(), PlatformError> {
        self.with_tenant(|state| {
            if groups
                .iter()
                .any(|group| state.groups.iter().any(|known| known.key() == group.key()))
            {
                return Err(duplicate("POST", "/iot/services", "GROUP"));
            }
            state.groups.extend(groups.iter().cloned());
            Ok(())
        })
    }

    async fn update_group(&self, group: &ServiceGroup) -> Result<(), PlatformError> {
        self.with_tenant(|state| {
            let known = state
                .groups
                .iter_mut()
                .find(|known| known.key() == group.key())
                .ok_or_else(|| not_found("PUT", group_url(&group.resource, &group.apikey)))?;
            *known = group.clone();
            Ok(())
        })
    }

    async fn delete_group(&self, resource: &str, apikey: &str) -> Result<(), PlatformError> {
        self.with_tenant(|state| {
            let position = state
                .groups
                .iter()
                .position(|group| group.key() == (resource, apikey))
                .ok_or_else(|| not_found("DELETE", group_url(resource, apikey)))?;
            state.groups.remove(position);
            Ok(())
        })
    }

    async fn get_device_list(&self) -> Result<Vec<Device>, PlatformError> {
        Ok(self.with_tenant(|state| state.devices.clone()))
    }

    async fn get_device(&self, device_id: &str) -> Result<Device, PlatformError> {
        self.with_tenant(|state| state.device(device_id).cloned())
            .ok_or_else(|| not_found("GET", device_url(device_id)))
    }

    async fn does_device_exist(&self, device_id: &str) -> Result<bool, PlatformError> {
        Ok(self.with_tenant(|state| state.device(device_id).is_some()))
    }

    async fn post_devices(&self, devices: &[Device]) -> Result<(), PlatformError> {
        self.with_tenant(|state| {
            if devices
                .iter()
                .any(|device| state.device(&device.device_id).is_some())
            {
                return Err(duplicate("POST", "/iot/devices", "DEVICE_ID"));
            }
            state.devices.extend(devices.iter().cloned());
            Ok(())
        })
    }

    async fn update_device(&self, device: &Device) -> Result<(), PlatformError> {
        self.with_tenant(|state| {
            let known = state
                .devices
                .iter_mut()
                .find(|known| known.device_id == device.device_id)
                .ok_or_else(|| not_found("PUT", device_url(&device.device_id)))?;
            *known = device.clone();
            Ok(())
        })
    }

    async fn delete_device(&self, device_id: &str) -> Result<(), PlatformError> {
        self.with_tenant(|state| {
            let position = state
                .devices
                .iter()
                .position(|device| device.device_id == device_id)
                .ok_or_else(|| not_found("DELETE", device_url(device_id)))?;
            state.devices.remove(position);
            Ok(())
        })
    }

    async fn post_measure(
        &self,
        apikey: &str,
        device_id: &str,
        payload: &Value,
    ) -> Result<(), PlatformError> {
        let mut state = self.sim.lock();
        let notifications = state.ingest(apikey, device_id, payload, Transport::Http);
        state.publish(notifications);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiware_api::DeviceAttribute;
    use fiware_api::DeviceCommand;
    use fiware_api::DEFAULT_RESOURCE;
    use fiware_config::QuirksConfig;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn tenant() -> TenantContext {
        TenantContext::new("sim", "/").unwrap()
    }

    fn state_with(quirks: QuirksConfig, group: ServiceGroup, devices: Vec<Device>) -> SimState {
        let mut state = SimState::new(quirks);
        state.tenant(&tenant()).groups.push(group);
        state.tenant(&tenant()).devices.extend(devices);
        state
    }

    fn attribute(state: &mut SimState, entity_id: &str, attr: &str) -> Option<Value> {
        state
            .tenant(&tenant())
            .entity(entity_id, None)
            .and_then(|entity| entity.attribute_value(attr).cloned())
    }

    fn device() -> Device {
        Device::new("Device:001", "Entity:001", "Entity")
            .with_transport(Transport::Mqtt)
            .with_apikey("key")
            .with_explicit_attrs(true)
            .with_attribute(DeviceAttribute::new("attribute1", "Number").with_object_id("a1"))
    }

    #[test]
    fn measures_are_mapped_onto_the_entity_of_the_device() {
        let group = ServiceGroup::new(DEFAULT_RESOURCE, "key").with_autoprovision(false);
        let mut state = state_with(QuirksConfig::default(), group, vec![device()]);

        state.ingest(
            "key",
            "Device:001",
            &json!({"a1": 12, "zz": 1}),
            Transport::Mqtt,
        );

        assert_eq!(
            attribute(&mut state, "Entity:001", "attribute1"),
            Some(json!(12))
        );
        assert_eq!(attribute(&mut state, "Entity:001", "zz"), None);
    }

    #[test]
    fn unknown_devices_are_autoprovisioned_with_the_group_type() {
        let group = ServiceGroup::new(DEFAULT_RESOURCE, "key").with_entity_type("Type1");
        let mut state = state_with(QuirksConfig::default(), group, vec![]);

        state.ingest("key", "device1", &json!({"t": true}), Transport::Http);

        let device = state.tenant(&tenant()).device("device1").cloned().unwrap();
        assert_eq!(device.entity_name, "Type1:device1");
        assert_eq!(device.transport, Some(Transport::Http));
        assert_eq!(attribute(&mut state, "Type1:device1", "t"), Some(json!(true)));
    }

    #[test]
    fn measures_with_an_unknown_api_key_are_dropped() {
        let group = ServiceGroup::new(DEFAULT_RESOURCE, "key");
        let mut state = state_with(QuirksConfig::default(), group, vec![]);

        state.ingest("other", "device1", &json!({"t": 1}), Transport::Mqtt);

        assert!(state.tenant(&tenant()).devices.is_empty());
        assert!(state.tenant(&tenant()).entities.is_empty());
    }

    #[test_case(false, None)]
    #[test_case(true, Some(json!(5)))]
    fn measures_over_another_transport(accepted: bool, expected: Option<Value>) {
        let quirks = QuirksConfig {
            cross_transport_updates_accepted: accepted,
            ..QuirksConfig::default()
        };
        let group = ServiceGroup::new(DEFAULT_RESOURCE, "key");
        let mut state = state_with(quirks, group, vec![device()]);

        state.ingest("key", "Device:001", &json!({"a1": 5}), Transport::Http);

        assert_eq!(attribute(&mut state, "Entity:001", "attribute1"), expected);
    }

    #[test]
    fn command_results_are_reflected_on_the_entity() {
        let group = ServiceGroup::new(DEFAULT_RESOURCE, "key");
        let device = device().with_command(DeviceCommand::new("ping"));
        let mut state = state_with(QuirksConfig::default(), group, vec![device]);

        state.command_result(
            "key",
            "Device:001",
            &json!({"ping": "pong", "unknown": 1}),
            Transport::Mqtt,
        );

        assert_eq!(
            attribute(&mut state, "Entity:001", "ping_status"),
            Some(json!("OK"))
        );
        assert_eq!(
            attribute(&mut state, "Entity:001", "ping_info"),
            Some(json!("pong"))
        );
        assert_eq!(attribute(&mut state, "Entity:001", "unknown_status"), None);
    }

    #[tokio::test]
    async fn a_device_cannot_be_provisioned_twice() {
        let iot_agent = SimIotAgent::new(FiwareSim::default(), tenant());
        iot_agent.post_devices(&[device()]).await.unwrap();

        let err = iot_agent.post_devices(&[device()]).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(iot_agent.does_device_exist("Device:001").await.unwrap());

        iot_agent.delete_device("Device:001").await.unwrap();
        assert!(iot_agent.delete_device("Device:001").await.unwrap_err().is_not_found());
    }
}
