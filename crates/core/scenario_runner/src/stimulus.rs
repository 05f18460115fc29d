use crate::topics::command_result_topic;
use crate::topics::uplink_topic;
use crate::Platform;
use crate::ScenarioError;
use fiware_api::ActionType;
use fiware_api::ContextEntity;
use fiware_api::Device;
use fiware_api::IgnoreNotFound;
use fiware_api::SubscriptionStatus;
use mqtt_channel::Message;
use serde_json::Value;
use std::fmt::Display;
use tracing::info;

/// An event triggering an update of the platform state
///
/// A stimulus is applied exactly once: a failure is never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum Stimulus {
    /// Measures published by a device over MQTT
    MqttUplink {
        apikey: String,
        device_id: String,
        payload: Value,
    },

    /// Outcome of a command published by a device over MQTT
    MqttCommandResult {
        apikey: String,
        device_id: String,
        payload: Value,
    },

    /// Measures posted by a device to the http south bound of the IoT-Agent
    HttpMeasure {
        apikey: String,
        device_id: String,
        payload: Value,
    },

    UpdateAttributeValue {
        entity_id: String,
        entity_type: Option<String>,
        attr: String,
        value: Value,
    },

    /// Update attributes which must exist
    PatchAttributes { entity: ContextEntity },

    /// Add or update attributes
    AppendAttributes { entity: ContextEntity },

    DeleteAttribute {
        entity_id: String,
        entity_type: Option<String>,
        attr: String,
    },

    BatchUpdate {
        action: ActionType,
        entities: Vec<ContextEntity>,
    },

    Command {
        entity_id: String,
        entity_type: Option<String>,
        command: String,
        value: Value,
    },

    /// Delete a device then provision it again, possibly with a different definition
    ReprovisionDevice { device: Device },

    /// Activate or deactivate the subscription created at that index of the setup
    SetSubscriptionStatus {
        subscription: usize,
        status: SubscriptionStatus,
    },
}

impl Stimulus {
    pub fn mqtt_uplink(
        apikey: impl Into<String>,
        device_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Stimulus::MqttUplink {
            apikey: apikey.into(),
            device_id: device_id.into(),
            payload,
        }
    }

    pub fn http_measure(
        apikey: impl Into<String>,
        device_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Stimulus::HttpMeasure {
            apikey: apikey.into(),
            device_id: device_id.into(),
            payload,
        }
    }

    pub fn update_attribute_value(
        entity_id: impl Into<String>,
        attr: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Stimulus::UpdateAttributeValue {
            entity_id: entity_id.into(),
            entity_type: None,
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// Apply the stimulus, returning once the platform has acknowledged it
    pub async fn apply(
        &self,
        platform: &Platform,
        subscription_ids: &[String],
    ) -> Result<(), ScenarioError> {
        let context_broker = &platform.context_broker_once;
        let iot_agent = &platform.iot_agent_once;

        match self {
            Stimulus::MqttUplink {
                apikey,
                device_id,
                payload,
            } => {
                let topic = uplink_topic(apikey, device_id)?;
                platform
                    .events
                    .publish(Message::new(&topic, payload.to_string()))
                    .await?
            }
            Stimulus::MqttCommandResult {
                apikey,
                device_id,
                payload,
            } => {
                let topic = command_result_topic(apikey, device_id)?;
                platform
                    .events
                    .publish(Message::new(&topic, payload.to_string()))
                    .await?
            }
            Stimulus::HttpMeasure {
                apikey,
                device_id,
                payload,
            } => iot_agent.post_measure(apikey, device_id, payload).await?,
            Stimulus::UpdateAttributeValue {
                entity_id,
                entity_type,
                attr,
                value,
            } => {
                context_broker
                    .update_attribute_value(entity_id, entity_type.as_deref(), attr, value)
                    .await?
            }
            Stimulus::PatchAttributes { entity } => {
                context_broker.update_existing_attributes(entity).await?
            }
            Stimulus::AppendAttributes { entity } => {
                context_broker.append_attributes(entity).await?
            }
            Stimulus::DeleteAttribute {
                entity_id,
                entity_type,
                attr,
            } => {
                context_broker
                    .delete_attribute(entity_id, entity_type.as_deref(), attr)
                    .await?
            }
            Stimulus::BatchUpdate { action, entities } => {
                context_broker.batch_update(*action, entities).await?
            }
            Stimulus::Command {
                entity_id,
                entity_type,
                command,
                value,
            } => {
                context_broker
                    .post_command(entity_id, entity_type.as_deref(), command, value)
                    .await?
            }
            Stimulus::ReprovisionDevice { device } => {
                iot_agent
                    .delete_device(&device.device_id)
                    .await
                    .ignore_not_found()?;
                iot_agent.post_devices(std::slice::from_ref(device)).await?
            }
            Stimulus::SetSubscriptionStatus {
                subscription,
                status,
            } => {
                let id = subscription_ids.get(*subscription).ok_or_else(|| {
                    ScenarioError::UnknownSubscription {
                        index: *subscription,
                    }
                })?;
                let mut patch = context_broker.get_subscription(id).await?;
                patch.status = Some(*status);
                context_broker.update_subscription(id, &patch).await?
            }
        }

        info!("Applied: {self}");
        Ok(())
    }
}

impl Display for Stimulus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stimulus::MqttUplink {
                apikey,
                device_id,
                payload,
            } => write!(f, "mqtt uplink {payload} from {device_id} ({apikey})"),
            Stimulus::MqttCommandResult {
                apikey,
                device_id,
                payload,
            } => write!(f, "mqtt command result {payload} from {device_id} ({apikey})"),
            Stimulus::HttpMeasure {
                apikey,
                device_id,
                payload,
            } => write!(f, "http measure {payload} from {device_id} ({apikey})"),
            Stimulus::UpdateAttributeValue {
                entity_id,
                attr,
                value,
                ..
            } => write!(f, "update of {entity_id}.{attr} to {value}"),
            Stimulus::PatchAttributes { entity } => {
                write!(f, "patch of {entity} attributes")
            }
            Stimulus::AppendAttributes { entity } => {
                write!(f, "append of {entity} attributes")
            }
            Stimulus::DeleteAttribute {
                entity_id, attr, ..
            } => write!(f, "deletion of {entity_id}.{attr}"),
            Stimulus::BatchUpdate { action, entities } => {
                write!(f, "batch {action} of {} entities", entities.len())
            }
            Stimulus::Command {
                entity_id,
                command,
                value,
                ..
            } => write!(f, "command {command} {value} sent to {entity_id}"),
            Stimulus::ReprovisionDevice { device } => {
                write!(f, "re-provisioning of device {}", device.device_id)
            }
            Stimulus::SetSubscriptionStatus {
                subscription,
                status,
            } => write!(f, "subscription #{subscription} set to {status:?}"),
        }
    }
}
