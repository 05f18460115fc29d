use crate::state::Change;
use crate::state::SimState;
use fiware_api::ContextAttribute;
use fiware_api::ContextEntity;
use fiware_api::EntityPattern;
use fiware_api::Notification;
use fiware_api::Subscription;
use fiware_config::TenantContext;
use mqtt_channel::Message;
use mqtt_channel::Topic;
use regex::Regex;
use scenario_runner::render_json;
use scenario_runner::TopicTemplate;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use std::time::SystemTime;
use tracing::debug;
use tracing::warn;

/// Path where QuantumLeap receives notifications
pub(crate) const QL_NOTIFY_PATH: &str = "/v2/notify";

impl SimState {
    /// The MQTT notifications triggered by a change
    ///
    /// Notifications sent to QuantumLeap are recorded as time series right away;
    /// notifications to other http endpoints are dropped.
    pub fn notify(&mut self, tenant: &TenantContext, change: &Change) -> Vec<Message> {
        let timestamp = humantime::format_rfc3339_millis(SystemTime::now()).to_string();
        let state = self.tenant(tenant);
        let Some(entity) = state
            .entity(&change.entity_id, Some(&change.entity_type))
            .cloned()
        else {
            return vec![];
        };

        let mut messages = Vec::new();
        let mut recorded = Vec::new();
        for subscription in state.subscriptions.iter_mut() {
            if !subscription.is_active() || !triggered_by(subscription, change) {
                continue;
            }
            let id = subscription.id.clone().unwrap_or_default();
            let notified = notified_entity(&entity, &subscription.notification.attrs);
            let notification = &mut subscription.notification;
            notification.times_sent = Some(notification.times_sent.unwrap_or(0) + 1);
            notification.last_notification = Some(timestamp.clone());

            match &notification.http {
                Some(http) if http.url.ends_with(QL_NOTIFY_PATH) => recorded.push(notified),
                Some(http) => debug!("Dropping notification of {} to {}", entity, http.url),
                None => messages.extend(mqtt_notification(
                    &id,
                    notification,
                    &entity,
                    notified,
                    tenant,
                )),
            }
        }

        for notified in recorded {
            state.record(&notified, &timestamp);
        }
        messages
    }
}

fn triggered_by(subscription: &Subscription, change: &Change) -> bool {
    let subject = &subscription.subject;
    let selected = subject
        .entities
        .iter()
        .any(|pattern| selects(pattern, &change.entity_id, &change.entity_type));
    let condition: &[String] = subject
        .condition
        .as_ref()
        .map(|condition| condition.attrs.as_slice())
        .unwrap_or_default();

    selected && (condition.is_empty() || change.attrs.iter().any(|attr| condition.contains(attr)))
}

fn selects(pattern: &EntityPattern, entity_id: &str, entity_type: &str) -> bool {
    let type_matches = pattern
        .entity_type
        .as_deref()
        .is_none_or(|expected| expected == entity_type);
    let id_matches = match (&pattern.id, &pattern.id_pattern) {
        (Some(expected), _) => expected == entity_id,
        (None, Some(id_pattern)) => {
            Regex::new(id_pattern).is_ok_and(|regex| regex.is_match(entity_id))
        }
        (None, None) => false,
    };
    type_matches && id_matches
}

/// The entity restricted to the notified attributes, all of them if none is given
fn notified_entity(entity: &ContextEntity, attrs: &[String]) -> ContextEntity {
    if attrs.is_empty() {
        entity.clone()
    } else {
        let names: Vec<&str> = attrs.iter().map(String::as_str).collect();
        entity.with_only(&names)
    }
}

fn mqtt_notification(
    subscription_id: &str,
    notification: &Notification,
    entity: &ContextEntity,
    notified: ContextEntity,
    tenant: &TenantContext,
) -> Option<Message> {
    if let Some(target) = &notification.mqtt {
        return message_on(&target.topic, envelope(subscription_id, &notified));
    }

    let target = notification.mqtt_custom.as_ref()?;
    let topic = TopicTemplate::new(&target.topic).render(entity, tenant);
    let payload = if let Some(text) = &target.payload {
        TopicTemplate::new(text).render(entity, tenant)
    } else if let Some(template) = &target.json {
        render_json(template, entity, tenant).to_string()
    } else if let Some(ngsi) = &target.ngsi {
        envelope(subscription_id, &patched(notified, ngsi, tenant))
    } else {
        envelope(subscription_id, &notified)
    };
    message_on(&topic, payload)
}

/// The default NGSI v2 notification payload
fn envelope(subscription_id: &str, entity: &ContextEntity) -> String {
    json!({
        "subscriptionId": subscription_id,
        "data": [entity]
    })
    .to_string()
}

/// Apply an NGSI patch of a custom notification to the notified entity
fn patched(
    mut entity: ContextEntity,
    ngsi: &Map<String, Value>,
    tenant: &TenantContext,
) -> ContextEntity {
    let source = entity.clone();
    for (name, template) in ngsi {
        let rendered = render_json(template, &source, tenant);
        match (name.as_str(), rendered) {
            ("id", Value::String(id)) => entity.id = id,
            ("type", Value::String(entity_type)) => entity.entity_type = entity_type,
            (_, rendered) => match serde_json::from_value::<ContextAttribute>(rendered) {
                Ok(attribute) => {
                    entity.attributes.insert(name.clone(), attribute);
                }
                Err(err) => warn!("Ignoring the NGSI attribute {name} of a notification: {err}"),
            },
        }
    }
    entity
}

fn message_on(topic: &str, payload: String) -> Option<Message> {
    match Topic::new(topic) {
        Ok(topic) => Some(Message::new(&topic, payload)),
        Err(err) => {
            warn!("Dropping a notification: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiware_api::Subject;
    use test_case::test_case;

    fn change(entity_id: &str, entity_type: &str, attrs: &[&str]) -> Change {
        Change {
            entity_id: entity_id.to_string(),
            entity_type: entity_type.to_string(),
            attrs: attrs.iter().map(|attr| attr.to_string()).collect(),
        }
    }

    fn subscription(pattern: EntityPattern, condition: &[&str]) -> Subscription {
        Subscription::new(
            Subject::new(vec![pattern])
                .on_change_of(condition.iter().map(|attr| attr.to_string()).collect()),
            Notification::http("http://quantumleap:8668/v2/notify"),
        )
    }

    #[test_case(EntityPattern::id("Entity:001"), &["attribute1"], true)]
    #[test_case(EntityPattern::id("Entity:002"), &["attribute1"], false)]
    #[test_case(EntityPattern::id("Entity:001"), &["attribute2"], false)]
    #[test_case(EntityPattern::id("Entity:001"), &[], true)]
    #[test_case(EntityPattern::id_pattern(".*"), &["attribute1"], true)]
    #[test_case(EntityPattern::id_pattern(".*").with_type("Product"), &[], false)]
    #[test_case(EntityPattern::id_pattern("^Entity:00[12]$").with_type("Entity"), &[], true)]
    fn subscriptions_triggered_by_a_change(
        pattern: EntityPattern,
        condition: &[&str],
        triggered: bool,
    ) {
        let change = change("Entity:001", "Entity", &["attribute1"]);
        assert_eq!(
            triggered_by(&subscription(pattern, condition), &change),
            triggered
        );
    }

    #[test]
    fn an_ngsi_patch_adds_attributes_rendered_from_the_entity() {
        let tenant = TenantContext::new("sim", "/").unwrap();
        let entity = ContextEntity::new("Entity:001", "Entity").with_attribute(
            "attribute1",
            "Number",
            105,
        );
        let ngsi = json!({"remapped": {"type": "Number", "value": "${attribute1}"}});

        let patched = patched(entity, ngsi.as_object().unwrap(), &tenant);

        assert_eq!(patched.attribute_value("remapped"), Some(&json!(105)));
        assert_eq!(patched.attribute_value("attribute1"), Some(&json!(105)));
    }
}
