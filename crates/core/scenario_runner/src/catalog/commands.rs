use crate::command_topic;
use crate::Check;
use crate::Expectation;
use crate::NotificationMatch;
use crate::Scenario;
use crate::Stimulus;
use fiware_api::DeviceCommand;
use fiware_fixtures::standard_device;
use fiware_fixtures::standard_entity;
use fiware_fixtures::standard_service_group;
use fiware_fixtures::STANDARD_APIKEY;
use fiware_fixtures::STANDARD_DEVICE_ID;
use fiware_fixtures::STANDARD_ENTITY_ID;
use fiware_fixtures::STANDARD_ENTITY_TYPE;
use serde_json::json;

/// A command sent through the Context Broker reaches the device over MQTT,
/// and the result published by the device is reflected on the entity
pub fn command_round_trip() -> Scenario {
    let command = "ping";
    let device = standard_device()
        .with_apikey(STANDARD_APIKEY)
        .with_command(DeviceCommand::new(command));
    let command_topic = command_topic(STANDARD_APIKEY, STANDARD_DEVICE_ID)
        .map(|topic| topic.name)
        .unwrap_or_default();

    Scenario::new("command round trip")
        .with_group(standard_service_group())
        .with_device(device)
        .with_entity(standard_entity())
        .step(
            Stimulus::Command {
                entity_id: STANDARD_ENTITY_ID.to_string(),
                entity_type: Some(STANDARD_ENTITY_TYPE.to_string()),
                command: command.to_string(),
                value: json!("hello"),
            },
            vec![Expectation::eventually(Check::notification(
                command_topic,
                NotificationMatch::json(json!({"ping": "hello"})),
            ))],
        )
        .step(
            Stimulus::MqttCommandResult {
                apikey: STANDARD_APIKEY.to_string(),
                device_id: STANDARD_DEVICE_ID.to_string(),
                payload: json!({"ping": "pong"}),
            },
            vec![
                Expectation::eventually(Check::attribute_value(
                    STANDARD_ENTITY_ID,
                    format!("{command}_status"),
                    "OK",
                )),
                Expectation::eventually(Check::attribute_value(
                    STANDARD_ENTITY_ID,
                    format!("{command}_info"),
                    "pong",
                )),
            ],
        )
}
