use crate::ScenarioError;
use fiware_api::http_client;
use fiware_api::ContextBroker;
use fiware_api::ContextBrokerClient;
use fiware_api::EndPoint;
use fiware_api::IotAgent;
use fiware_api::IotAgentClient;
use fiware_api::QuantumLeapClient;
use fiware_api::RetryPolicy;
use fiware_api::TimeSeries;
use fiware_config::PlatformConfig;
use fiware_config::TenantContext;
use mqtt_channel::Channel;
use mqtt_channel::EventChannel;
use std::sync::Arc;
use tracing::info;

/// The components of a platform under validation, as seen by a tenant
///
/// Provisioning and cleanup go through clients retrying transient failures.
/// Stimuli go through clients sending each request exactly once.
#[derive(Clone)]
pub struct Platform {
    tenant: TenantContext,
    pub context_broker: Arc<dyn ContextBroker>,
    pub iot_agent: Arc<dyn IotAgent>,
    pub time_series: Option<Arc<dyn TimeSeries>>,
    pub events: Arc<dyn EventChannel>,
    pub context_broker_once: Arc<dyn ContextBroker>,
    pub iot_agent_once: Arc<dyn IotAgent>,
}

impl Platform {
    pub fn new(
        tenant: TenantContext,
        context_broker: Arc<dyn ContextBroker>,
        iot_agent: Arc<dyn IotAgent>,
        events: Arc<dyn EventChannel>,
    ) -> Self {
        Platform {
            tenant,
            context_broker_once: context_broker.clone(),
            iot_agent_once: iot_agent.clone(),
            context_broker,
            iot_agent,
            time_series: None,
            events,
        }
    }

    pub fn with_time_series(self, time_series: Arc<dyn TimeSeries>) -> Self {
        Platform {
            time_series: Some(time_series),
            ..self
        }
    }

    /// Use specific clients to apply stimuli
    pub fn with_single_shot_clients(
        self,
        context_broker: Arc<dyn ContextBroker>,
        iot_agent: Arc<dyn IotAgent>,
    ) -> Self {
        Platform {
            context_broker_once: context_broker,
            iot_agent_once: iot_agent,
            ..self
        }
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// Connect the http clients and the MQTT channel of a live platform
    pub async fn connect(config: &PlatformConfig) -> Result<Platform, ScenarioError> {
        let tenant = config.tenant()?;
        let retry = RetryPolicy::from(&config.retry);
        let http_con = http_client()?;

        let context_broker = ContextBrokerClient::new(
            http_con.clone(),
            EndPoint::new(&config.cb_url)?,
            tenant.clone(),
            retry,
        );
        let iot_agent = IotAgentClient::new(
            http_con.clone(),
            EndPoint::new(&config.iota_json_url)?,
            EndPoint::new(&config.iota_json_http_url)?,
            tenant.clone(),
            retry,
        );
        let time_series = QuantumLeapClient::new(
            http_con,
            EndPoint::new(&config.ql_url)?,
            tenant.clone(),
            retry,
        );

        let channel = Channel::connect(&mqtt_config(config)?).await?;
        info!(
            "Connected to the platform: context broker {}, iot agent {}, mqtt broker {} for tenant {tenant}",
            config.cb_url, config.iota_json_url, config.mqtt_broker_url
        );

        Ok(Platform::new(
            tenant,
            Arc::new(context_broker.clone()),
            Arc::new(iot_agent.clone()),
            Arc::new(channel),
        )
        .with_time_series(Arc::new(time_series))
        .with_single_shot_clients(
            Arc::new(context_broker.without_retry()),
            Arc::new(iot_agent.without_retry()),
        ))
    }
}

/// The MQTT channel configuration of the broker reached by the tests
pub fn mqtt_config(config: &PlatformConfig) -> Result<mqtt_channel::Config, ScenarioError> {
    let mut mqtt = mqtt_channel::Config::from_url(config.mqtt_broker_url.as_str())?
        .with_reconnect_deadline(config.timing.deadline);
    if let Some(username) = config.mqtt_username.as_deref().filter(|name| !name.is_empty()) {
        mqtt = mqtt.with_credentials(username, config.mqtt_password.as_deref());
    }
    if config.mqtt_tls {
        mqtt = mqtt.with_native_roots()?;
    }
    Ok(mqtt)
}
