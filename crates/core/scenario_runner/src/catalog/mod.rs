//! The behavioural test matrix of a FIWARE platform
//!
//! Each function builds a fresh [Scenario] to be run by an [Orchestrator](crate::Orchestrator).
//! Expectations that depend on platform quirks are derived from the [QuirksConfig].
//! The properties that cannot be expressed as a single scenario are async checks
//! in the [properties] module.
mod commands;
mod entity_update;
mod iot_agent;
mod notifications;
pub mod properties;
mod time_series;

pub use commands::*;
pub use entity_update::*;
pub use iot_agent::*;
pub use notifications::*;
pub use time_series::*;

use crate::Scenario;
use crate::ScenarioError;
use fiware_config::PlatformConfig;
use fiware_config::QuirksConfig;
use fiware_config::TenantContext;

/// What the scenarios need to know about the platform under validation
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogContext {
    pub tenant: TenantContext,
    pub quirks: QuirksConfig,

    /// The MQTT broker as reached by the Context Broker, used by MQTT subscriptions
    pub mqtt_broker_internal: String,

    /// Where the Context Broker notifies QuantumLeap
    pub ql_notify_url: String,

    /// Given to the subscriptions notifying a broker that requires authentication
    pub mqtt_credentials: Option<MqttCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    pub user: String,
    pub passwd: String,
}

impl CatalogContext {
    pub fn from_config(config: &PlatformConfig) -> Result<Self, ScenarioError> {
        Ok(CatalogContext {
            tenant: config.tenant()?,
            quirks: config.quirks,
            mqtt_broker_internal: config.internal_mqtt_broker()?,
            ql_notify_url: format!(
                "{}/v2/notify",
                config.ql_url_internal.as_str().trim_end_matches('/')
            ),
            mqtt_credentials: config
                .mqtt_username
                .clone()
                .zip(config.mqtt_password.clone())
                .map(|(user, passwd)| MqttCredentials { user, passwd }),
        })
    }

    pub fn with_quirks(self, quirks: QuirksConfig) -> Self {
        CatalogContext { quirks, ..self }
    }

    pub fn with_mqtt_credentials(self, user: impl Into<String>, passwd: impl Into<String>) -> Self {
        CatalogContext {
            mqtt_credentials: Some(MqttCredentials {
                user: user.into(),
                passwd: passwd.into(),
            }),
            ..self
        }
    }
}

/// All the scenarios of the catalog
///
/// The authenticated notification is only part of it when MQTT credentials are configured.
pub fn all(context: &CatalogContext) -> Vec<Scenario> {
    let mut scenarios = vec![
        autoprovision_disabled(),
        autoprovision_enabled(),
        explicit_attrs(true),
        explicit_attrs(false),
        attribute_rename_round_trip(),
        cross_group_update(context),
        cross_transport_update(context),
        default_notification(context),
    ];
    scenarios.extend(authenticated_notification(context));
    scenarios.extend([
        custom_text_notification(context),
        custom_json_notification(context),
        custom_ngsi_notification(context),
        dynamic_topic_notification(context),
        command_round_trip(),
        entity_update_suite(),
        time_series_notification(context),
    ]);
    scenarios
}
