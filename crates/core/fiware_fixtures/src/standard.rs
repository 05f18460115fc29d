//! The fixtures shared by the validation scenarios
//!
//! Each call returns a fresh value: a scenario can mutate its fixtures freely.
use fiware_api::ContextEntity;
use fiware_api::Device;
use fiware_api::DeviceAttribute;
use fiware_api::ServiceGroup;
use fiware_api::Transport;
use fiware_api::DEFAULT_RESOURCE;

pub const STANDARD_ENTITY_ID: &str = "Entity:001";
pub const STANDARD_ENTITY_TYPE: &str = "Entity";
pub const STANDARD_DEVICE_ID: &str = "Device:001";
pub const STANDARD_APIKEY: &str = "fiware-api-test";

/// `Entity:001` with four numeric attributes, `attribute<n>` being set to `n`
pub fn standard_entity() -> ContextEntity {
    (1..=4).fold(
        ContextEntity::new(STANDARD_ENTITY_ID, STANDARD_ENTITY_TYPE),
        |entity, n| entity.with_attribute(format!("attribute{n}"), "Number", n),
    )
}

/// `Device:001`, an MQTT device mapping the fields `a<n>` onto the attributes of [standard_entity]
pub fn standard_device() -> Device {
    (1..=4).fold(
        Device::new(STANDARD_DEVICE_ID, STANDARD_ENTITY_ID, STANDARD_ENTITY_TYPE)
            .with_transport(Transport::Mqtt)
            .with_explicit_attrs(true),
        |device, n| {
            let attribute = DeviceAttribute::new(format!("attribute{n}"), "Number");
            device.with_attribute(attribute.with_object_id(format!("a{n}")))
        },
    )
}

/// A service group with explicit attributes and without autoprovisioning
pub fn standard_service_group() -> ServiceGroup {
    ServiceGroup::new(DEFAULT_RESOURCE, STANDARD_APIKEY)
        .with_explicit_attrs(true)
        .with_autoprovision(false)
}
