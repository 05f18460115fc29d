use std::path::PathBuf;
use std::time::Duration;

/// An MQTT channel error
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("Invalid topic name: {name:?}")]
    InvalidTopic { name: String },

    #[error("Invalid topic filter: {pattern:?}")]
    InvalidFilter { pattern: String },

    #[error("Invalid broker url {url:?}: {reason}")]
    InvalidBrokerUrl { url: String, reason: String },

    #[error("Fail to read certificates from {path:?}: {reason}")]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("No usable root certificate found in the native certificate store")]
    NoNativeCertificate,

    #[error("MQTT client error: {0}")]
    ClientError(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    ConnectionError(#[from] rumqttc::ConnectionError),

    #[error("Connection to {host}:{port} refused by the broker: {reason}")]
    ConnectionRefused {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Fail to connect {host}:{port} within {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("The connection to the broker has not been re-established within {deadline:?}")]
    ReconnectTimeout { deadline: Duration },

    #[error("The broker did not acknowledge the {request} request within {timeout:?}")]
    AckTimeout {
        request: &'static str,
        timeout: Duration,
    },

    #[error("The connection has been interrupted before the {request} request was acknowledged")]
    AckInterrupted { request: &'static str },

    #[error("Invalid UTF8 payload: {from}: {input_excerpt}...")]
    InvalidUtf8Payload {
        input_excerpt: String,
        from: std::str::Utf8Error,
    },

    #[error("The channel has been closed")]
    Closed,
}

impl ChannelError {
    pub fn new_invalid_utf8_payload(bytes: &[u8], from: std::str::Utf8Error) -> ChannelError {
        const EXCERPT_LEN: usize = 80;
        let index = from.valid_up_to();
        let input = std::str::from_utf8(&bytes[..index]).unwrap_or("");

        ChannelError::InvalidUtf8Payload {
            input_excerpt: ChannelError::input_prefix(input, EXCERPT_LEN),
            from,
        }
    }

    fn input_prefix(input: &str, len: usize) -> String {
        input
            .chars()
            .filter(|c| !c.is_whitespace())
            .take(len)
            .collect()
    }
}
