use crate::ConfigError;
use crate::PlatformConfig;
use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Serialized;
use figment::providers::Toml;
use figment::value::Dict;
use figment::value::Map;
use figment::value::Value;
use figment::Figment;
use figment::Metadata;
use figment::Profile;
use figment::Provider;
use std::path::Path;

/// Prefix of the environment variables mapped onto the nested configuration keys
///
/// `FIWARE_VALIDATION_TIMING__SETTLE=5s` sets `timing.settle`.
pub const ENV_PREFIX: &str = "FIWARE_VALIDATION_";

/// Environment variable naming the TOML configuration file
pub const CONFIG_FILE_ENV: &str = "FIWARE_VALIDATION_CONFIG";

/// The environment variables accepted for each top-level key, by order of precedence
const ENV_ALIASES: &[(&str, &[&str])] = &[
    (
        "cb_url",
        &["ORION_URL", "CB_URL", "CB_HOST", "CONTEXTBROKER_URL", "OCB_URL"],
    ),
    ("iota_url", &["IOTA_URL"]),
    ("iota_json_url", &["IOTA_JSON_URL"]),
    ("iota_ul_url", &["IOTA_UL_URL"]),
    ("iota_json_http_url", &["IOTA_JSON_HTTP_URL"]),
    ("ql_url", &["QUANTUMLEAP_URL", "QL_URL"]),
    ("ql_url_internal", &["QL_URL_INTERNAL"]),
    (
        "mqtt_broker_url",
        &["MQTT_BROKER_URL", "MQTT_URL", "MQTT_BROKER"],
    ),
    (
        "mqtt_broker_url_internal",
        &["MQTT_BROKER_URL_INTERNAL", "MQTT_URL_INTERNAL"],
    ),
    ("mqtt_username", &["MQTT_USERNAME"]),
    ("mqtt_password", &["MQTT_PASSWORD"]),
    ("mqtt_tls", &["MQTT_TLS"]),
    ("fiware_service", &["FIWARE_SERVICE"]),
    (
        "fiware_servicepath",
        &["FIWARE_PATH", "FIWARE_SERVICEPATH", "FIWARE_SERVICE_PATH"],
    ),
    ("ci_job_id", &["CI_JOB_ID"]),
    ("log_level", &["LOG_LEVEL", "LOGLEVEL"]),
];

/// Keys whose environment values are parsed (as bool or number) rather than kept as strings
const TYPED_KEYS: &[&str] = &["mqtt_tls"];

impl PlatformConfig {
    /// Load the configuration from the defaults, the optional TOML file and the environment
    ///
    /// Later sources take precedence:
    /// 1. the defaults,
    /// 2. the TOML file, if any,
    /// 3. the environment variables listed in [ENV_ALIASES],
    /// 4. the `FIWARE_VALIDATION_` prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<PlatformConfig, ConfigError> {
        let figment = figment(path);
        let config: PlatformConfig = figment.extract()?;

        for warning in unused_value_warnings(&figment)? {
            tracing::warn!("{warning}");
        }

        // Fail early on an invalid tenant
        config.tenant()?;
        Ok(config)
    }

    /// Load the configuration using the TOML file named by `FIWARE_VALIDATION_CONFIG`, if set
    pub fn from_env() -> Result<PlatformConfig, ConfigError> {
        match std::env::var_os(CONFIG_FILE_ENV) {
            Some(path) if !path.is_empty() => PlatformConfig::load(Some(Path::new(&path))),
            _ => PlatformConfig::load(None),
        }
    }
}

fn figment(path: Option<&Path>) -> Figment {
    let figment = Figment::from(Serialized::defaults(PlatformConfig::default()));
    let figment = match path {
        Some(path) => figment.merge(Toml::file(path)),
        None => figment,
    };
    figment
        .merge(AliasedEnv)
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG"]).split("__"))
}

fn unused_value_warnings(figment: &Figment) -> Result<Vec<String>, ConfigError> {
    let mut warnings = Vec::new();
    let value: Value = figment.extract()?;

    let _: PlatformConfig = serde_ignored::deserialize(&value, |path| {
        let serde_path = path.to_string();
        match figment.find_metadata(&serde_path) {
            Some(metadata) => warnings.push(format!(
                "Unknown configuration field {serde_path:?} from {}",
                metadata.name
            )),
            None => warnings.push(format!("Unknown configuration field {serde_path:?}")),
        }
    })?;

    Ok(warnings)
}

/// Environment variables named after the settings of the platform deployment
///
/// For each key, the first non-empty alias wins.
struct AliasedEnv;

impl AliasedEnv {
    fn lookup(aliases: &[&str]) -> Option<(String, String)> {
        aliases.iter().find_map(|alias| {
            std::env::var(alias)
                .ok()
                .filter(|value| !value.is_empty())
                .map(|value| (alias.to_string(), value))
        })
    }
}

impl Provider for AliasedEnv {
    fn metadata(&self) -> Metadata {
        Metadata::named("environment variable").interpolater(|_profile, keys| {
            let key = keys.join(".");
            ENV_ALIASES
                .iter()
                .find(|(name, _)| *name == key)
                .and_then(|(_, aliases)| AliasedEnv::lookup(aliases))
                .map(|(alias, _)| alias)
                .unwrap_or(key)
        })
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        let mut dict = Dict::new();
        for (key, aliases) in ENV_ALIASES {
            let Some((_, raw)) = AliasedEnv::lookup(aliases) else {
                continue;
            };
            let value = if TYPED_KEYS.contains(key) {
                raw.parse::<Value>().unwrap_or_else(|never| match never {})
            } else {
                Value::from(raw)
            };
            dict.insert(key.to_string(), value);
        }
        Ok(Profile::Default.collect(dict))
    }
}
