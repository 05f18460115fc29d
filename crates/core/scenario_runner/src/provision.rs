use crate::Platform;
use crate::ScenarioError;
use fiware_api::ContextEntity;
use fiware_api::Device;
use fiware_api::IgnoreNotFound;
use fiware_api::RetryPolicy;
use fiware_api::ServiceGroup;
use fiware_api::Subscription;
use tracing::debug;
use tracing::info;

/// What to do when a resource to be provisioned already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Provision {
    /// Delete the existing resource, then create it again
    #[default]
    Force,

    /// Leave the existing resource unchanged
    SkipIfExists,
}

/// Creates the resources a scenario relies on
///
/// Creations are retried on transient failures, and on conflicts while a resource is recreated.
pub struct Provisioner<'a> {
    platform: &'a Platform,
    retry: RetryPolicy,
}

impl<'a> Provisioner<'a> {
    pub fn new(platform: &'a Platform, retry: RetryPolicy) -> Self {
        Provisioner { platform, retry }
    }

    fn creation_policy(&self, recreating: bool) -> RetryPolicy {
        if recreating {
            self.retry.retrying_conflicts()
        } else {
            self.retry
        }
    }

    pub async fn ensure_service_group(
        &self,
        group: &ServiceGroup,
        provision: Provision,
    ) -> Result<(), ScenarioError> {
        let step = format!("service group {} {}", group.resource, group.apikey);
        let iot_agent = &self.platform.iot_agent;

        let exists = iot_agent
            .get_group(&group.resource, &group.apikey)
            .await
            .ignore_not_found()
            .map_err(|err| ScenarioError::provisioning(&step, err))?
            .is_some();
        if exists {
            if provision == Provision::SkipIfExists {
                debug!("Keeping the existing {step}");
                return Ok(());
            }
            iot_agent
                .delete_group(&group.resource, &group.apikey)
                .await
                .ignore_not_found()
                .map_err(|err| ScenarioError::provisioning(&step, err))?;
        }

        let once = &self.platform.iot_agent_once;
        let groups = std::slice::from_ref(group);
        self.creation_policy(exists)
            .run(&step, move || once.post_groups(groups))
            .await
            .map_err(|err| ScenarioError::provisioning(&step, err))?;
        info!("Provisioned {step}");
        Ok(())
    }

    /// Provision a device; an existing device is never patched, only deleted then recreated
    pub async fn ensure_device(
        &self,
        device: &Device,
        provision: Provision,
    ) -> Result<(), ScenarioError> {
        let step = format!("device {}", device.device_id);
        let iot_agent = &self.platform.iot_agent;

        let exists = iot_agent
            .does_device_exist(&device.device_id)
            .await
            .map_err(|err| ScenarioError::provisioning(&step, err))?;
        if exists {
            if provision == Provision::SkipIfExists {
                debug!("Keeping the existing {step}");
                return Ok(());
            }
            iot_agent
                .delete_device(&device.device_id)
                .await
                .ignore_not_found()
                .map_err(|err| ScenarioError::provisioning(&step, err))?;
        }

        let once = &self.platform.iot_agent_once;
        let devices = std::slice::from_ref(device);
        self.creation_policy(exists)
            .run(&step, move || once.post_devices(devices))
            .await
            .map_err(|err| ScenarioError::provisioning(&step, err))?;
        info!("Provisioned {step}");
        Ok(())
    }

    pub async fn ensure_entity(
        &self,
        entity: &ContextEntity,
        provision: Provision,
    ) -> Result<(), ScenarioError> {
        let step = format!("entity {entity}");
        let context_broker = &self.platform.context_broker;
        let entity_type = Some(entity.entity_type.as_str());

        let exists = context_broker
            .does_entity_exist(&entity.id, entity_type)
            .await
            .map_err(|err| ScenarioError::provisioning(&step, err))?;
        if exists {
            if provision == Provision::SkipIfExists {
                debug!("Keeping the existing {step}");
                return Ok(());
            }
            context_broker
                .delete_entity(&entity.id, entity_type)
                .await
                .ignore_not_found()
                .map_err(|err| ScenarioError::provisioning(&step, err))?;
        }

        let once = &self.platform.context_broker_once;
        self.creation_policy(exists)
            .run(&step, move || once.post_entity(entity, false))
            .await
            .map_err(|err| ScenarioError::provisioning(&step, err))?;
        info!("Provisioned {step}");
        Ok(())
    }

    /// Create a subscription, returning its id
    ///
    /// Existing subscriptions are identified by their description:
    /// with `Force` they are deleted, with `SkipIfExists` the id of the first one is returned.
    pub async fn ensure_subscription(
        &self,
        subscription: &Subscription,
        provision: Provision,
    ) -> Result<String, ScenarioError> {
        let step = format!(
            "subscription {}",
            subscription.description.as_deref().unwrap_or("without description")
        );
        let context_broker = &self.platform.context_broker;

        let mut recreating = false;
        if subscription.description.is_some() {
            let existing: Vec<Subscription> = context_broker
                .get_subscription_list()
                .await
                .map_err(|err| ScenarioError::provisioning(&step, err))?
                .into_iter()
                .filter(|existing| existing.description == subscription.description)
                .collect();

            for existing in existing {
                let Some(id) = existing.id else {
                    continue;
                };
                if provision == Provision::SkipIfExists {
                    debug!("Keeping the existing {step}: {id}");
                    return Ok(id);
                }
                context_broker
                    .delete_subscription(&id)
                    .await
                    .ignore_not_found()
                    .map_err(|err| ScenarioError::provisioning(&step, err))?;
                recreating = true;
            }
        }

        let once = &self.platform.context_broker_once;
        let id = self
            .creation_policy(recreating)
            .run(&step, move || once.post_subscription(subscription))
            .await
            .map_err(|err| ScenarioError::provisioning(&step, err))?;
        info!("Provisioned {step}: {id}");
        Ok(id)
    }
}
