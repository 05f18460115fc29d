/// An error related to the configuration of the validation harness
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] figment::Error),

    #[error("Invalid fiware-service {service:?}: {reason}")]
    InvalidService { service: String, reason: &'static str },

    #[error("Invalid fiware-servicepath {path:?}: {reason}")]
    InvalidServicePath { path: String, reason: &'static str },

    #[error("Invalid log level: {name:?}, supported levels are trace, debug, info, warn and error")]
    InvalidLogLevel { name: String },

    #[error("Invalid url for {key}: {url:?}")]
    InvalidUrl { key: &'static str, url: String },
}
