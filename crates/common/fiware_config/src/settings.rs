use crate::ConfigError;
use crate::TenantContext;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Endpoints and credentials of the platform under validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Context Broker (NGSI v2)
    pub cb_url: Url,

    /// IoT-Agent north bound API
    pub iota_url: Url,
    pub iota_json_url: Url,
    pub iota_ul_url: Url,

    /// IoT-Agent south bound HTTP endpoint used to post measures
    pub iota_json_http_url: Url,

    /// QuantumLeap as reached by the tests
    pub ql_url: Url,

    /// QuantumLeap as reached by the Context Broker when notifying
    pub ql_url_internal: Url,

    /// MQTT broker as reached by the tests
    pub mqtt_broker_url: Url,

    /// MQTT broker as reached by the Context Broker when notifying
    pub mqtt_broker_url_internal: Url,

    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_tls: bool,

    pub fiware_service: String,
    pub fiware_servicepath: String,

    /// When set, the service path of the tenant is `/<ci_job_id>`
    pub ci_job_id: Option<String>,

    pub log_level: String,

    pub timing: TimingConfig,
    pub retry: RetryConfig,
    pub quirks: QuirksConfig,
}

/// Bounded waits applied when verifying eventually consistent outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between a stimulus and the first check
    #[serde(with = "humantime_duration")]
    pub settle: Duration,

    /// Deadline of expectations crossing one asynchronous hop
    #[serde(with = "humantime_duration")]
    pub deadline: Duration,

    /// Deadline of notification expectations, which cross two hops
    #[serde(with = "humantime_duration")]
    pub notification_deadline: Duration,

    /// First interval between two polls, doubled after each poll
    #[serde(with = "humantime_duration")]
    pub poll_interval: Duration,

    #[serde(with = "humantime_duration")]
    pub max_poll_interval: Duration,
}

/// Retry applied to provisioning and cleanup requests
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,

    #[serde(with = "humantime_duration")]
    pub initial_interval: Duration,

    pub multiplier: f64,

    #[serde(with = "humantime_duration")]
    pub max_interval: Duration,
}

/// Behaviours the platform is known to exhibit even though they contradict its documentation
///
/// Scenario expectations are derived from these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuirksConfig {
    /// A device provisioned for MQTT also accepts measures sent over HTTP, and conversely
    pub cross_transport_updates_accepted: bool,

    /// A device accepts measures sent with the api key of another service group
    pub cross_group_updates_accepted: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            cb_url: default_url("http://localhost:1026"),
            iota_url: default_url("http://localhost:4041"),
            iota_json_url: default_url("http://localhost:4041"),
            iota_ul_url: default_url("http://127.0.0.1:4061"),
            iota_json_http_url: default_url("http://localhost:7896"),
            ql_url: default_url("http://127.0.0.1:8668"),
            ql_url_internal: default_url("http://quantumleap:8668"),
            mqtt_broker_url: default_url("mqtt://127.0.0.1:1883"),
            mqtt_broker_url_internal: default_url("mqtt://mosquitto:1883"),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_tls: false,
            fiware_service: "filip".to_string(),
            fiware_servicepath: "/".to_string(),
            ci_job_id: None,
            log_level: "error".to_string(),
            timing: TimingConfig::default(),
            retry: RetryConfig::default(),
            quirks: QuirksConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            settle: Duration::from_secs(2),
            deadline: Duration::from_secs(10),
            notification_deadline: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            max_poll_interval: Duration::from_secs(2),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(5),
        }
    }
}

impl Default for QuirksConfig {
    fn default() -> Self {
        QuirksConfig {
            cross_transport_updates_accepted: true,
            cross_group_updates_accepted: true,
        }
    }
}

impl PlatformConfig {
    /// The tenant the scenarios are scoped to
    ///
    /// A CI job id, when set, replaces the configured service path.
    pub fn tenant(&self) -> Result<TenantContext, ConfigError> {
        match self.ci_job_id.as_deref().filter(|id| !id.is_empty()) {
            Some(ci_job_id) => TenantContext::for_ci_job(&self.fiware_service, ci_job_id),
            None => TenantContext::new(&self.fiware_service, &self.fiware_servicepath),
        }
    }

    /// The host and port of the MQTT broker as seen by the Context Broker
    ///
    /// This is the broker address to be used in MQTT subscriptions.
    pub fn internal_mqtt_broker(&self) -> Result<String, ConfigError> {
        let url = &self.mqtt_broker_url_internal;
        let host = url.host_str().ok_or_else(|| ConfigError::InvalidUrl {
            key: "mqtt_broker_url_internal",
            url: url.to_string(),
        })?;
        Ok(format!(
            "{}://{}:{}",
            url.scheme(),
            host,
            url.port().unwrap_or(1883)
        ))
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        crate::parse_log_level(&self.log_level)
    }
}

fn default_url(url: &'static str) -> Url {
    // Only called with literal urls
    Url::parse(url).unwrap_or_else(|err| panic!("invalid default url {url:?}: {err}"))
}

/// (De)serialize durations as human readable strings such as `"2s"` or `"500ms"`
pub mod humantime_duration {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
