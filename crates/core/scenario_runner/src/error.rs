use fiware_api::PlatformError;
use fiware_config::ConfigError;
use fiware_config::TenantContext;
use fiware_fixtures::FixtureError;
use mqtt_channel::ChannelError;

#[derive(thiserror::Error, Debug)]
pub enum ScenarioError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Fail to provision {step}: {source}")]
    Provisioning {
        step: String,
        #[source]
        source: PlatformError,
    },

    #[error("Expectation not met: {expectation}. Last observed: {last_observed}")]
    VerificationTimeout {
        expectation: String,
        last_observed: String,
    },

    #[error("No notification is watched on {filter}")]
    NotWatched { filter: String },

    #[error("No subscription has been created at index {index}")]
    UnknownSubscription { index: usize },

    #[error("No QuantumLeap client is configured")]
    NoTimeSeries,

    #[error("The platform is scoped to {actual}, not to {expected}")]
    TenantMismatch {
        expected: TenantContext,
        actual: TenantContext,
    },

    #[error("Scenario {scenario:?} failed at {step}: {source}")]
    Failed {
        scenario: String,
        step: String,
        #[source]
        source: Box<ScenarioError>,
    },

    #[error("Property {property:?} doesn't hold: {observed}")]
    PropertyViolated {
        property: &'static str,
        observed: String,
    },

    #[error("The scenario has not been torn down")]
    NotTornDown,

    #[error("Teardown of scenario {scenario:?} failed: {source}")]
    Teardown {
        scenario: String,
        #[source]
        source: Box<ScenarioError>,
    },
}

impl ScenarioError {
    pub fn provisioning(step: impl Into<String>, source: PlatformError) -> Self {
        ScenarioError::Provisioning {
            step: step.into(),
            source,
        }
    }
}
