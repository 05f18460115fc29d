//! Typed clients of the FIWARE platform components
//!
//! - [ContextBroker]: the NGSI v2 API of Orion
//! - [IotAgent]: the provisioning API of the IoT-Agent JSON and its http south bound transport
//! - [TimeSeries]: the QuantumLeap API
//!
//! All the requests are scoped by a [TenantContext](fiware_config::TenantContext)
//! and mutating requests are retried according to a [RetryPolicy].

mod context_broker;
mod endpoint;
mod error;
mod http;
mod iot_agent;
pub mod models;
mod quantumleap;
mod retry;


pub use context_broker::*;
pub use endpoint::*;
pub use error::*;
pub use http::FIWARE_SERVICE;
pub use http::FIWARE_SERVICE_PATH;
pub use http::PAGE_SIZE;
pub use http::TOTAL_COUNT;
pub use iot_agent::*;
pub use models::*;
pub use quantumleap::*;
pub use retry::*;

/// The http client shared by all the platform clients
pub fn http_client() -> Result<reqwest::Client, PlatformError> {
    reqwest::Client::builder()
        .build()
        .map_err(|err| PlatformError::InvalidRequest {
            reason: format!("cannot build the http client: {err}"),
        })
}
