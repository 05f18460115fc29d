use crate::Platform;
use crate::ScenarioError;
use fiware_api::ActionType;
use fiware_api::ContextEntity;
use fiware_api::EntityQuery;
use fiware_api::IgnoreNotFound;
use fiware_api::PlatformError;
use fiware_config::TenantContext;
use std::fmt::Display;
use tracing::info;
use tracing::instrument;

/// Number of entities deleted by a single batch request
pub const DELETE_CHUNK_SIZE: usize = 100;

/// What has been deleted by a cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub subscriptions: usize,
    pub registrations: usize,
    pub devices: usize,
    pub groups: usize,
    pub entities: usize,
    pub time_series: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.subscriptions
            + self.registrations
            + self.devices
            + self.groups
            + self.entities
            + self.time_series
    }
}

impl Display for CleanupReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} subscriptions, {} registrations, {} devices, {} service groups, {} entities, {} time series",
            self.subscriptions,
            self.registrations,
            self.devices,
            self.groups,
            self.entities,
            self.time_series
        )
    }
}

/// Delete all the resources of a tenant
///
/// Subscriptions go first so no notification is sent while entities are deleted,
/// then registrations, devices, service groups, entities and finally the time series.
/// Resources already gone are ignored: running twice in a row is not an error.
#[instrument(skip(platform))]
pub async fn clear_all(
    platform: &Platform,
    tenant: &TenantContext,
) -> Result<CleanupReport, ScenarioError> {
    if platform.tenant() != tenant {
        return Err(ScenarioError::TenantMismatch {
            expected: tenant.clone(),
            actual: platform.tenant().clone(),
        });
    }

    let mut report = CleanupReport::default();
    let context_broker = &platform.context_broker;
    let iot_agent = &platform.iot_agent;

    for subscription in context_broker.get_subscription_list().await? {
        if let Some(id) = subscription.id {
            report.subscriptions += deleted(context_broker.delete_subscription(&id).await)?;
        }
    }

    for registration in context_broker.get_registration_list().await? {
        report.registrations +=
            deleted(context_broker.delete_registration(&registration.id).await)?;
    }

    for device in iot_agent.get_device_list().await? {
        report.devices += deleted(iot_agent.delete_device(&device.device_id).await)?;
    }

    for group in iot_agent.get_group_list().await? {
        report.groups += deleted(iot_agent.delete_group(&group.resource, &group.apikey).await)?;
    }

    let entities: Vec<ContextEntity> = context_broker
        .get_entity_list(&EntityQuery::all())
        .await?
        .into_iter()
        .map(|entity| ContextEntity::new(entity.id, entity.entity_type))
        .collect();
    for chunk in entities.chunks(DELETE_CHUNK_SIZE) {
        match context_broker.batch_update(ActionType::Delete, chunk).await {
            Ok(()) => report.entities += chunk.len(),
            // Some entities of the chunk are already gone
            Err(err) if err.is_not_found() => {
                for entity in chunk {
                    report.entities += deleted(
                        context_broker
                            .delete_entity(&entity.id, Some(&entity.entity_type))
                            .await,
                    )?;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(time_series) = &platform.time_series {
        for header in time_series.get_entity_list().await? {
            report.time_series += deleted(
                time_series
                    .delete_entity(&header.entity_id, header.entity_type.as_deref())
                    .await,
            )?;
        }
    }

    info!("Cleared tenant {tenant}: {report}");
    Ok(report)
}

/// 1 if the resource has been deleted, 0 if it was already gone
fn deleted(outcome: Result<(), PlatformError>) -> Result<usize, PlatformError> {
    Ok(outcome.ignore_not_found()?.map_or(0, |()| 1))
}
