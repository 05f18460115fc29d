use crate::cleanup::clear_all;
use crate::cleanup::CleanupReport;
use crate::provision::Provisioner;
use crate::scenario::Scenario;
use crate::verify::Verifier;
use crate::verify::Watched;
use crate::Platform;
use crate::ScenarioError;
use fiware_api::RetryPolicy;
use fiware_config::PlatformConfig;
use fiware_config::TimingConfig;
use std::fmt::Display;
use tokio::time::Instant;
use tracing::error;
use tracing::info;
use tracing::warn;

/// The states a scenario goes through
///
/// `Clean → Provisioned → (Stimulated → Verified)* → TornDown`,
/// `Failed` being reachable from any step before the teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioState {
    Clean,
    Provisioned,
    Stimulated { step: usize },
    Verified { step: usize },
    Failed { step: String },
    TornDown,
}

impl Display for ScenarioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioState::Clean => write!(f, "clean"),
            ScenarioState::Provisioned => write!(f, "provisioned"),
            ScenarioState::Stimulated { step } => write!(f, "stimulated (step {step})"),
            ScenarioState::Verified { step } => write!(f, "verified (step {step})"),
            ScenarioState::Failed { step } => write!(f, "failed at {step}"),
            ScenarioState::TornDown => write!(f, "torn down"),
        }
    }
}

/// What happened while running a scenario
#[derive(Debug)]
pub struct ScenarioReport {
    pub scenario: String,
    pub transitions: Vec<ScenarioState>,
    pub subscription_ids: Vec<String>,
    failure: Option<(String, ScenarioError)>,
    teardown: Option<Result<CleanupReport, ScenarioError>>,
}

impl ScenarioReport {
    fn new(scenario: &str) -> Self {
        ScenarioReport {
            scenario: scenario.to_string(),
            transitions: Vec::new(),
            subscription_ids: Vec::new(),
            failure: None,
            teardown: None,
        }
    }

    fn transition(&mut self, state: ScenarioState) {
        info!("Scenario {:?}: {state}", self.scenario);
        self.transitions.push(state);
    }

    fn fail(&mut self, step: String, err: ScenarioError) {
        error!("Scenario {:?} failed at {step}: {err}", self.scenario);
        self.transitions
            .push(ScenarioState::Failed { step: step.clone() });
        self.failure = Some((step, err));
    }

    /// The current state
    pub fn state(&self) -> &ScenarioState {
        self.transitions.last().unwrap_or(&ScenarioState::Clean)
    }

    /// The step that failed and why, if any
    pub fn failure(&self) -> Option<(&str, &ScenarioError)> {
        self.failure.as_ref().map(|(step, err)| (step.as_str(), err))
    }

    /// The outcome of the cleanup run at the end of the scenario
    pub fn teardown(&self) -> Option<&Result<CleanupReport, ScenarioError>> {
        self.teardown.as_ref()
    }

    /// A scenario succeeds when all its expectations have been met and its teardown succeeded
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && matches!(self.teardown, Some(Ok(_)))
    }

    pub fn into_result(self) -> Result<(), ScenarioError> {
        if let Some((step, source)) = self.failure {
            return Err(ScenarioError::Failed {
                scenario: self.scenario,
                step,
                source: Box::new(source),
            });
        }
        match self.teardown {
            Some(Ok(_)) => Ok(()),
            Some(Err(source)) => Err(ScenarioError::Teardown {
                scenario: self.scenario,
                source: Box::new(source),
            }),
            None => Err(ScenarioError::Teardown {
                scenario: self.scenario,
                source: Box::new(ScenarioError::NotTornDown),
            }),
        }
    }
}

/// Runs scenarios against a platform
pub struct Orchestrator {
    platform: Platform,
    timing: TimingConfig,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(platform: Platform, timing: TimingConfig, retry: RetryPolicy) -> Self {
        Orchestrator {
            platform,
            timing,
            retry,
        }
    }

    pub fn from_config(platform: Platform, config: &PlatformConfig) -> Self {
        Orchestrator::new(platform, config.timing, RetryPolicy::from(&config.retry))
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Run a scenario then clear the tenant, whatever the outcome of the scenario
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let mut report = ScenarioReport::new(&scenario.name);
        info!("Running scenario {:?}", scenario.name);

        if let Err((step, err)) = self.execute(scenario, &mut report).await {
            report.fail(step, err);
        }

        let teardown = clear_all(&self.platform, self.platform.tenant()).await;
        match &teardown {
            Ok(_) => report.transition(ScenarioState::TornDown),
            Err(err) => warn!("Teardown of scenario {:?} failed: {err}", scenario.name),
        }
        report.teardown = Some(teardown);
        report
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        report: &mut ScenarioReport,
    ) -> Result<(), (String, ScenarioError)> {
        clear_all(&self.platform, self.platform.tenant())
            .await
            .map_err(at("initial cleanup"))?;
        report.transition(ScenarioState::Clean);

        let setup = &scenario.setup;
        let provisioner = Provisioner::new(&self.platform, self.retry);
        for group in &setup.groups {
            provisioner
                .ensure_service_group(group, setup.provision)
                .await
                .map_err(at("setup"))?;
        }
        for device in &setup.devices {
            provisioner
                .ensure_device(device, setup.provision)
                .await
                .map_err(at("setup"))?;
        }
        for entity in &setup.entities {
            provisioner
                .ensure_entity(entity, setup.provision)
                .await
                .map_err(at("setup"))?;
        }
        for subscription in &setup.subscriptions {
            let id = provisioner
                .ensure_subscription(subscription, setup.provision)
                .await
                .map_err(at("setup"))?;
            report.subscription_ids.push(id);
        }

        let watched = Watched::subscribe(self.platform.events.as_ref(), scenario.watched_topics())
            .await
            .map_err(at("setup"))?;
        report.transition(ScenarioState::Provisioned);

        for (index, step) in scenario.steps.iter().enumerate() {
            let baseline = watched.baseline();
            step.stimulus
                .apply(&self.platform, &report.subscription_ids)
                .await
                .map_err(at(&format!("stimulus of step {index}")))?;
            let acknowledged = Instant::now();
            report.transition(ScenarioState::Stimulated { step: index });

            Verifier::new(
                &self.platform,
                self.timing,
                &watched,
                &report.subscription_ids,
            )
            .verify(&step.expectations, &baseline, acknowledged)
            .await
            .map_err(at(&format!("verification of step {index}")))?;
            report.transition(ScenarioState::Verified { step: index });
        }

        Ok(())
    }
}

/// Tag an error with the step it occurred at
fn at(step: &str) -> impl FnOnce(ScenarioError) -> (String, ScenarioError) {
    let step = step.to_string();
    move |err| (step, err)
}
