use crate::catalog::CatalogContext;
use crate::render_json;
use crate::Check;
use crate::Expectation;
use crate::NotificationMatch;
use crate::Scenario;
use crate::Stimulus;
use crate::TopicTemplate;
use fiware_api::EntityPattern;
use fiware_api::MqttCustomTarget;
use fiware_api::Notification;
use fiware_api::Subject;
use fiware_api::Subscription;
use fiware_fixtures::standard_entity;
use fiware_fixtures::STANDARD_ENTITY_ID;
use serde_json::json;
use serde_json::Map;

pub const DEFAULT_NOTIFICATION_TOPIC: &str = "default/mqtt/notification";
pub const AUTH_NOTIFICATION_TOPIC: &str = "default/mqtt/notification/auth";
pub const PAYLOAD_NOTIFICATION_TOPIC: &str = "custom/mqtt/notification/payload";
pub const JSON_NOTIFICATION_TOPIC: &str = "custom/mqtt/notification/json";
pub const NGSI_NOTIFICATION_TOPIC: &str = "custom/mqtt/notification/ngsi";
pub const DYNAMIC_NOTIFICATION_TOPIC: &str = "custom/mqtt/notification/dynamic/${type}/${id}";

/// A subscription on the changes of `attribute1` of the standard entity
fn on_attribute1(description: &str, notification: Notification) -> Subscription {
    Subscription::new(
        Subject::new(vec![EntityPattern::id(STANDARD_ENTITY_ID)])
            .on_change_of(vec!["attribute1".to_string()]),
        notification,
    )
    .with_description(description)
    .with_throttling(0)
}

/// The standard entity once `attribute1` has been updated
fn updated_entity(value: i64) -> fiware_api::ContextEntity {
    standard_entity().with_attribute("attribute1", "Number", value)
}

fn update_attribute1(value: i64) -> Stimulus {
    Stimulus::update_attribute_value(STANDARD_ENTITY_ID, "attribute1", value)
}

/// An update notified with the default NGSI envelope
pub fn default_notification(context: &CatalogContext) -> Scenario {
    Scenario::new("default mqtt notification")
        .with_entity(standard_entity())
        .with_subscription(on_attribute1(
            "MQTT default notification",
            Notification::mqtt(&context.mqtt_broker_internal, DEFAULT_NOTIFICATION_TOPIC),
        ))
        .step(
            update_attribute1(101),
            vec![Expectation::eventually(
                Check::notification(
                    DEFAULT_NOTIFICATION_TOPIC,
                    NotificationMatch::data_attribute("attribute1", 101),
                )
                .from_subscription(0),
            )],
        )
}

/// An update notified with the default envelope to a broker requiring authentication
///
/// None unless MQTT credentials are configured.
pub fn authenticated_notification(context: &CatalogContext) -> Option<Scenario> {
    let credentials = context.mqtt_credentials.as_ref()?;
    let notification = Notification::mqtt(&context.mqtt_broker_internal, AUTH_NOTIFICATION_TOPIC)
        .with_credentials(&credentials.user, &credentials.passwd);

    let scenario = Scenario::new("authenticated mqtt notification")
        .with_entity(standard_entity())
        .with_subscription(on_attribute1("MQTT authenticated notification", notification))
        .step(
            update_attribute1(102),
            vec![Expectation::eventually(
                Check::notification(
                    AUTH_NOTIFICATION_TOPIC,
                    NotificationMatch::data_attribute("attribute1", 102),
                )
                .from_subscription(0),
            )],
        );
    Some(scenario)
}

/// An update notified with a text payload template
pub fn custom_text_notification(context: &CatalogContext) -> Scenario {
    let template = TopicTemplate::new("attribute1: ${attribute1}");
    let target = MqttCustomTarget {
        payload: Some(template.as_str().to_string()),
        ..MqttCustomTarget::new(&context.mqtt_broker_internal, PAYLOAD_NOTIFICATION_TOPIC)
    };

    Scenario::new("custom text mqtt notification")
        .with_entity(standard_entity())
        .with_subscription(on_attribute1(
            "MQTT custom text notification",
            Notification::mqtt_custom(target),
        ))
        .step(
            update_attribute1(103),
            vec![Expectation::eventually(Check::notification(
                PAYLOAD_NOTIFICATION_TOPIC,
                NotificationMatch::text(template.render(&updated_entity(103), &context.tenant)),
            ))],
        )
}

/// An update notified with a JSON payload template
pub fn custom_json_notification(context: &CatalogContext) -> Scenario {
    let template = json!({
        "attr1": "${attribute1}",
        "entity": "${id}",
        "origin": "${service}${servicePath}"
    });
    let target = MqttCustomTarget {
        json: Some(template.clone()),
        ..MqttCustomTarget::new(&context.mqtt_broker_internal, JSON_NOTIFICATION_TOPIC)
    };

    Scenario::new("custom json mqtt notification")
        .with_entity(standard_entity())
        .with_subscription(on_attribute1(
            "MQTT custom json notification",
            Notification::mqtt_custom(target),
        ))
        .step(
            update_attribute1(104),
            vec![Expectation::eventually(Check::notification(
                JSON_NOTIFICATION_TOPIC,
                NotificationMatch::json(render_json(
                    &template,
                    &updated_entity(104),
                    &context.tenant,
                )),
            ))],
        )
}

/// An update notified as an NGSI entity with an extra attribute
pub fn custom_ngsi_notification(context: &CatalogContext) -> Scenario {
    let mut ngsi = Map::new();
    ngsi.insert(
        "remapped".to_string(),
        json!({"type": "Number", "value": "${attribute1}"}),
    );
    let target = MqttCustomTarget {
        ngsi: Some(ngsi),
        ..MqttCustomTarget::new(&context.mqtt_broker_internal, NGSI_NOTIFICATION_TOPIC)
    };

    Scenario::new("custom ngsi mqtt notification")
        .with_entity(standard_entity())
        .with_subscription(on_attribute1(
            "MQTT custom ngsi notification",
            Notification::mqtt_custom(target),
        ))
        .step(
            update_attribute1(105),
            vec![Expectation::eventually(
                Check::notification(
                    NGSI_NOTIFICATION_TOPIC,
                    NotificationMatch::ngsi("remapped", 105),
                )
                .from_subscription(0),
            )],
        )
}

/// An update notified on a topic built from the id and type of the entity
pub fn dynamic_topic_notification(context: &CatalogContext) -> Scenario {
    let topic = TopicTemplate::new(DYNAMIC_NOTIFICATION_TOPIC);
    let expected_topic = topic.render(&standard_entity(), &context.tenant);

    Scenario::new("dynamic topic mqtt notification")
        .with_entity(standard_entity())
        .with_subscription(on_attribute1(
            "MQTT dynamic topic notification",
            Notification::mqtt_custom(MqttCustomTarget::new(
                &context.mqtt_broker_internal,
                topic.as_str(),
            )),
        ))
        .step(
            update_attribute1(106),
            vec![Expectation::eventually(Check::notification(
                expected_topic,
                NotificationMatch::data_attribute("attribute1", 106),
            ))],
        )
}
