//! Access to the live FIWARE platform the validation scenarios are run against
//!
//! The platform is described by the environment of the deployment
//! (see [PlatformConfig::from_env]). All the tests share the same tenant,
//! so a [LivePlatform] grants an exclusive access to it for the duration of a test.
use anyhow::Context;
use fiware_api::RetryPolicy;
use fiware_config::log_init;
use fiware_config::PlatformConfig;
use once_cell::sync::Lazy;
use scenario_runner::catalog::CatalogContext;
use scenario_runner::Orchestrator;
use scenario_runner::Platform;
use scenario_runner::Scenario;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tracing::info;

static TENANT_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Exclusive access to the platform under validation
pub struct LivePlatform {
    pub config: PlatformConfig,
    pub context: CatalogContext,
    pub orchestrator: Orchestrator,
    _exclusive: MutexGuard<'static, ()>,
}

impl LivePlatform {
    pub async fn connect() -> anyhow::Result<LivePlatform> {
        let exclusive = TENANT_LOCK.lock().await;
        let config = PlatformConfig::from_env().context("loading the platform configuration")?;
        log_init(&config.log_level)?;

        let platform = Platform::connect(&config)
            .await
            .context("connecting the platform")?;
        let context = CatalogContext::from_config(&config)?;
        let orchestrator = Orchestrator::from_config(platform, &config);

        Ok(LivePlatform {
            config,
            context,
            orchestrator,
            _exclusive: exclusive,
        })
    }

    pub fn platform(&self) -> &Platform {
        self.orchestrator.platform()
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    /// Connect the same platform for another tenant, which is given a service of its own
    pub async fn other_tenant(&self) -> anyhow::Result<Platform> {
        let config = PlatformConfig {
            fiware_service: format!("{}_isolation", self.config.fiware_service),
            ..self.config.clone()
        };
        let platform = Platform::connect(&config)
            .await
            .context("connecting the platform for another tenant")?;
        Ok(platform)
    }

    /// Run a scenario, failing with the step that went wrong
    pub async fn run(&self, scenario: Scenario) -> anyhow::Result<()> {
        let report = self.orchestrator.run(&scenario).await;
        info!("Scenario {:?}: {:?}", report.scenario, report.transitions);
        report.into_result()?;
        Ok(())
    }
}
