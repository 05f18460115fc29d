use crate::catalog::CatalogContext;
use crate::Check;
use crate::Expectation;
use crate::Scenario;
use crate::Stimulus;
use fiware_api::ContextEntity;
use fiware_api::Device;
use fiware_api::DeviceAttribute;
use fiware_api::EntityQuery;
use fiware_api::ServiceGroup;
use fiware_api::Transport;
use fiware_api::DEFAULT_RESOURCE;
use fiware_fixtures::standard_device;
use fiware_fixtures::standard_entity;
use fiware_fixtures::standard_service_group;
use fiware_fixtures::STANDARD_APIKEY;
use fiware_fixtures::STANDARD_DEVICE_ID;
use fiware_fixtures::STANDARD_ENTITY_ID;
use serde_json::json;

/// A measure sent for an unknown device under a group without autoprovisioning is dropped
pub fn autoprovision_disabled() -> Scenario {
    let unknown_device = "Device:unknown";
    Scenario::new("autoprovision disabled")
        .with_group(standard_service_group().with_entity_type("Type1"))
        .step(
            Stimulus::mqtt_uplink(STANDARD_APIKEY, unknown_device, json!({"a1": 15})),
            vec![
                Expectation::settled(Check::EntityCount {
                    query: EntityQuery::all(),
                    expected: 0,
                }),
                Expectation::settled(Check::DeviceExists {
                    device_id: unknown_device.to_string(),
                    exists: false,
                }),
            ],
        )
}

/// A measure sent for an unknown device under an autoprovisioning group
/// creates the device and its entity
pub fn autoprovision_enabled() -> Scenario {
    let device_id = "device1";
    let entity_type = "Type1";
    let entity_id = format!("{entity_type}:{device_id}");

    Scenario::new("autoprovision enabled")
        .with_group(
            ServiceGroup::new(DEFAULT_RESOURCE, STANDARD_APIKEY)
                .with_entity_type(entity_type)
                .with_explicit_attrs(false)
                .with_autoprovision(true)
                .with_attribute(DeviceAttribute::new("attribute1", "Number").with_object_id("a1")),
        )
        .step(
            Stimulus::mqtt_uplink(STANDARD_APIKEY, device_id, json!({"a1": 15})),
            vec![
                Expectation::eventually(Check::DeviceExists {
                    device_id: device_id.to_string(),
                    exists: true,
                }),
                Expectation::eventually(Check::DeviceCount { expected: 1 }),
                Expectation::eventually(
                    Check::attribute_value(&entity_id, "attribute1", 15.0).widened(),
                ),
                Expectation::eventually(Check::EntityCount {
                    query: EntityQuery::all(),
                    expected: 1,
                }),
            ],
        )
}

/// A device with `explicitAttrs` set ignores the attributes only defined by its service group,
/// while a device without projects them onto its entity
pub fn explicit_attrs(explicit: bool) -> Scenario {
    let group = standard_service_group()
        .with_explicit_attrs(false)
        .with_attribute(DeviceAttribute::new("attribute5", "Number").with_object_id("a5"));
    let device = standard_device()
        .with_apikey(STANDARD_APIKEY)
        .with_explicit_attrs(explicit);

    let group_attribute = if explicit {
        Expectation::settled(Check::attribute_absent(STANDARD_ENTITY_ID, "attribute5"))
    } else {
        Expectation::eventually(Check::attribute_value(STANDARD_ENTITY_ID, "attribute5", 55))
    };

    Scenario::new(format!("explicitAttrs {explicit}"))
        .with_group(group)
        .with_device(device)
        .with_entity(standard_entity())
        .step(
            Stimulus::mqtt_uplink(
                STANDARD_APIKEY,
                STANDARD_DEVICE_ID,
                json!({"a1": 11, "a5": 55}),
            ),
            vec![
                Expectation::eventually(Check::attribute_value(
                    STANDARD_ENTITY_ID,
                    "attribute1",
                    11,
                )),
                group_attribute,
            ],
        )
}

/// Renaming the measure field of an attribute
///
/// Once the device re-provisioned, the old field name is ignored and the new one is effective,
/// with no window where both or none are accepted.
pub fn attribute_rename_round_trip() -> Scenario {
    let mut renamed = standard_device().with_apikey(STANDARD_APIKEY);
    renamed
        .attributes
        .retain(|attribute| attribute.name != "attribute1");
    let renamed =
        renamed.with_attribute(DeviceAttribute::new("attribute1", "Number").with_object_id("b1"));

    let attribute1 = |value: i64| Check::attribute_value(STANDARD_ENTITY_ID, "attribute1", value);
    let uplink = |payload| Stimulus::mqtt_uplink(STANDARD_APIKEY, STANDARD_DEVICE_ID, payload);

    Scenario::new("attribute rename round trip")
        .with_group(standard_service_group())
        .with_device(standard_device().with_apikey(STANDARD_APIKEY))
        .with_entity(standard_entity())
        .step(
            uplink(json!({"a1": 21})),
            vec![Expectation::eventually(attribute1(21))],
        )
        .step(
            Stimulus::ReprovisionDevice { device: renamed },
            vec![Expectation::eventually(Check::DeviceExists {
                device_id: STANDARD_DEVICE_ID.to_string(),
                exists: true,
            })],
        )
        .step(
            uplink(json!({"a1": 22})),
            vec![Expectation::settled(attribute1(21))],
        )
        .step(
            uplink(json!({"b1": 23})),
            vec![Expectation::eventually(attribute1(23))],
        )
        .step(
            uplink(json!({"a1": 24, "b1": 25})),
            vec![Expectation::eventually(attribute1(25))],
        )
}

/// A provisioned device receiving a measure sent with the api key of another service group
pub fn cross_group_update(context: &CatalogContext) -> Scenario {
    let attribute2 = DeviceAttribute::new("attribute2", "Number").with_object_id("a2");
    let device_id = "Device:002";
    let entity_id = "Entity:002";

    let outcome = if context.quirks.cross_group_updates_accepted {
        Expectation::eventually(Check::attribute_value(entity_id, "attribute2", 10))
    } else {
        Expectation::settled(Check::attribute_value(entity_id, "attribute2", 0))
    };

    Scenario::new("cross group update")
        .with_group(
            ServiceGroup::new(DEFAULT_RESOURCE, "fiware-api-1")
                .with_entity_type("Type1")
                .with_autoprovision(true)
                .with_attribute(DeviceAttribute::new("attribute1", "Number").with_object_id("a1")),
        )
        .with_group(
            ServiceGroup::new(DEFAULT_RESOURCE, "fiware-api-2")
                .with_entity_type("Type2")
                .with_autoprovision(true)
                .with_attribute(attribute2.clone()),
        )
        .with_device(
            Device::new(device_id, entity_id, "Type2")
                .with_transport(Transport::Mqtt)
                .with_apikey("fiware-api-2")
                .with_attribute(attribute2),
        )
        .with_entity(
            ContextEntity::new(entity_id, "Type2").with_attribute("attribute2", "Number", 0),
        )
        .step(
            Stimulus::mqtt_uplink("fiware-api-1", device_id, json!({"a2": 10})),
            vec![outcome],
        )
}

/// Devices receiving measures over the transport they are not provisioned for
pub fn cross_transport_update(context: &CatalogContext) -> Scenario {
    let http_attribute = DeviceAttribute::new("attribute_http", "Number").with_object_id("h1");
    let mqtt_attribute = DeviceAttribute::new("attribute_mqtt", "Number").with_object_id("m1");
    let (http_device, http_entity, http_key) =
        ("Device:HTTP:001", "Entity:HTTP:001", "fiware-api-http");
    let (mqtt_device, mqtt_entity, mqtt_key) =
        ("Device:MQTT:001", "Entity:MQTT:001", "fiware-api-mqtt");

    let accepted = context.quirks.cross_transport_updates_accepted;
    let cross_outcome = |entity_id: &str, attr: &str, sent: i64, previous: i64| {
        if accepted {
            Expectation::eventually(Check::attribute_value(entity_id, attr, sent))
        } else {
            Expectation::settled(Check::attribute_value(entity_id, attr, previous))
        }
    };

    Scenario::new("cross transport update")
        .with_group(
            ServiceGroup::new(DEFAULT_RESOURCE, http_key)
                .with_entity_type("TypeHTTP")
                .with_autoprovision(true)
                .with_explicit_attrs(true)
                .with_attribute(http_attribute.clone()),
        )
        .with_group(
            ServiceGroup::new(DEFAULT_RESOURCE, mqtt_key)
                .with_entity_type("TypeMQTT")
                .with_autoprovision(true)
                .with_explicit_attrs(true)
                .with_attribute(mqtt_attribute.clone()),
        )
        .with_device(
            Device::new(http_device, http_entity, "TypeHTTP")
                .with_transport(Transport::Http)
                .with_apikey(http_key)
                .with_explicit_attrs(true)
                .with_attribute(http_attribute),
        )
        .with_device(
            Device::new(mqtt_device, mqtt_entity, "TypeMQTT")
                .with_transport(Transport::Mqtt)
                .with_apikey(mqtt_key)
                .with_explicit_attrs(true)
                .with_attribute(mqtt_attribute),
        )
        .with_entity(
            ContextEntity::new(http_entity, "TypeHTTP").with_attribute(
                "attribute_http",
                "Number",
                0,
            ),
        )
        .with_entity(
            ContextEntity::new(mqtt_entity, "TypeMQTT").with_attribute(
                "attribute_mqtt",
                "Number",
                0,
            ),
        )
        .step(
            Stimulus::mqtt_uplink(mqtt_key, mqtt_device, json!({"m1": 42})),
            vec![Expectation::eventually(Check::attribute_value(
                mqtt_entity,
                "attribute_mqtt",
                42,
            ))],
        )
        .step(
            Stimulus::http_measure(http_key, http_device, json!({"h1": 77})),
            vec![Expectation::eventually(Check::attribute_value(
                http_entity,
                "attribute_http",
                77,
            ))],
        )
        .step(
            Stimulus::mqtt_uplink(http_key, http_device, json!({"h1": 99})),
            vec![cross_outcome(http_entity, "attribute_http", 99, 77)],
        )
        .step(
            Stimulus::http_measure(mqtt_key, mqtt_device, json!({"m1": 88})),
            vec![cross_outcome(mqtt_entity, "attribute_mqtt", 88, 42)],
        )
}
