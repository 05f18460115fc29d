use crate::expectation::Check;
use crate::expectation::Expectation;
use crate::provision::Provision;
use crate::stimulus::Stimulus;
use fiware_api::ContextEntity;
use fiware_api::Device;
use fiware_api::ServiceGroup;
use fiware_api::Subscription;

/// The resources a scenario relies on, created in that order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Setup {
    pub provision: Provision,
    pub groups: Vec<ServiceGroup>,
    pub devices: Vec<Device>,
    pub entities: Vec<ContextEntity>,
    pub subscriptions: Vec<Subscription>,
}

/// A stimulus along with the expected outcomes
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub stimulus: Stimulus,
    pub expectations: Vec<Expectation>,
}

/// A validation scenario: provision, then a sequence of stimulus and verification
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub setup: Setup,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Scenario {
            name: name.into(),
            setup: Setup::default(),
            steps: Vec::new(),
        }
    }

    pub fn with_provision(mut self, provision: Provision) -> Self {
        self.setup.provision = provision;
        self
    }

    pub fn with_group(mut self, group: ServiceGroup) -> Self {
        self.setup.groups.push(group);
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.setup.devices.push(device);
        self
    }

    pub fn with_entity(mut self, entity: ContextEntity) -> Self {
        self.setup.entities.push(entity);
        self
    }

    /// Add a subscription; its id will be at the index of this subscription in the setup
    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.setup.subscriptions.push(subscription);
        self
    }

    pub fn step(mut self, stimulus: Stimulus, expectations: Vec<Expectation>) -> Self {
        self.steps.push(Step {
            stimulus,
            expectations,
        });
        self
    }

    /// The topics notification expectations are waiting on
    pub fn watched_topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self
            .steps
            .iter()
            .flat_map(|step| step.expectations.iter())
            .filter_map(|expectation| match &expectation.check {
                Check::Notification { topic, .. } => Some(topic.as_str()),
                _ => None,
            })
            .collect();
        topics.sort_unstable();
        topics.dedup();
        topics
    }
}
