//! Properties checked across scenarios or across tenants
//!
//! Each check leaves the tenants it uses cleared.
use crate::clear_all;
use crate::Platform;
use crate::Provision;
use crate::Provisioner;
use crate::ScenarioError;
use fiware_api::ContextEntity;
use fiware_api::Device;
use fiware_api::DeviceAttribute;
use fiware_api::EntityQuery;
use fiware_api::RetryPolicy;
use fiware_api::ServiceGroup;
use fiware_fixtures::standard_device;
use fiware_fixtures::standard_entity;
use fiware_fixtures::standard_service_group;
use fiware_fixtures::STANDARD_DEVICE_ID;
use fiware_fixtures::STANDARD_ENTITY_ID;
use fiware_fixtures::STANDARD_ENTITY_TYPE;
use tracing::info;
use tracing::warn;

pub const TENANT_ISOLATION: &str = "tenant isolation";
pub const IDEMPOTENT_CLEANUP: &str = "idempotent cleanup";
pub const RECREATE_SAFE: &str = "recreate-safe provisioning";

/// Resources provisioned for a tenant are neither visible from nor deleted by another tenant
pub async fn tenant_isolation(
    tenant_a: &Platform,
    tenant_b: &Platform,
    retry: RetryPolicy,
) -> Result<(), ScenarioError> {
    if tenant_a.tenant() == tenant_b.tenant() {
        return Err(ScenarioError::PropertyViolated {
            property: TENANT_ISOLATION,
            observed: format!("both platforms are scoped to {}", tenant_a.tenant()),
        });
    }

    let outcome = check_isolation(tenant_a, tenant_b, retry).await;
    cleared_after(outcome, &[tenant_b, tenant_a]).await
}

async fn check_isolation(
    tenant_a: &Platform,
    tenant_b: &Platform,
    retry: RetryPolicy,
) -> Result<(), ScenarioError> {
    clear_all(tenant_a, tenant_a.tenant()).await?;
    clear_all(tenant_b, tenant_b.tenant()).await?;
    Provisioner::new(tenant_a, retry)
        .ensure_entity(&standard_entity(), Provision::Force)
        .await?;

    let seen_by_b = tenant_b
        .context_broker
        .does_entity_exist(STANDARD_ENTITY_ID, Some(STANDARD_ENTITY_TYPE))
        .await?;
    if seen_by_b {
        return Err(ScenarioError::PropertyViolated {
            property: TENANT_ISOLATION,
            observed: format!(
                "{STANDARD_ENTITY_ID} created for {} is visible from {}",
                tenant_a.tenant(),
                tenant_b.tenant()
            ),
        });
    }

    clear_all(tenant_b, tenant_b.tenant()).await?;
    let kept_by_a = tenant_a
        .context_broker
        .does_entity_exist(STANDARD_ENTITY_ID, Some(STANDARD_ENTITY_TYPE))
        .await?;
    if !kept_by_a {
        return Err(ScenarioError::PropertyViolated {
            property: TENANT_ISOLATION,
            observed: format!(
                "{STANDARD_ENTITY_ID} of {} has been deleted by a cleanup of {}",
                tenant_a.tenant(),
                tenant_b.tenant()
            ),
        });
    }

    info!(
        "Tenants {} and {} are isolated",
        tenant_a.tenant(),
        tenant_b.tenant()
    );
    Ok(())
}

/// A cleanup right after a cleanup has nothing to delete
pub async fn clear_all_is_idempotent(platform: &Platform) -> Result<(), ScenarioError> {
    clear_all(platform, platform.tenant()).await?;
    let second = clear_all(platform, platform.tenant()).await?;
    if second.total() != 0 {
        return Err(ScenarioError::PropertyViolated {
            property: IDEMPOTENT_CLEANUP,
            observed: format!("the second cleanup deleted {second}"),
        });
    }
    Ok(())
}

/// Provisioning again with `Force` a modified definition of the same resources
/// leaves a single copy of each, as last defined
pub async fn recreate_safe(platform: &Platform, retry: RetryPolicy) -> Result<(), ScenarioError> {
    let outcome = check_recreation(platform, retry).await;
    cleared_after(outcome, &[platform]).await
}

/// The attribute only defined by the second definitions
const REDEFINED_ATTRIBUTE: &str = "attribute5";

fn redefined_group() -> ServiceGroup {
    standard_service_group().with_attribute(redefined_attribute())
}

fn redefined_device() -> Device {
    standard_device().with_attribute(redefined_attribute())
}

fn redefined_entity() -> ContextEntity {
    standard_entity().with_attribute(REDEFINED_ATTRIBUTE, "Number", 5)
}

fn redefined_attribute() -> DeviceAttribute {
    DeviceAttribute::new(REDEFINED_ATTRIBUTE, "Number").with_object_id("a5")
}

async fn check_recreation(platform: &Platform, retry: RetryPolicy) -> Result<(), ScenarioError> {
    clear_all(platform, platform.tenant()).await?;

    let provisioner = Provisioner::new(platform, retry);
    let definitions = [
        (standard_service_group(), standard_device(), standard_entity()),
        (redefined_group(), redefined_device(), redefined_entity()),
    ];
    for (group, device, entity) in &definitions {
        provisioner
            .ensure_service_group(group, Provision::Force)
            .await?;
        provisioner.ensure_device(device, Provision::Force).await?;
        provisioner.ensure_entity(entity, Provision::Force).await?;
    }

    let group = standard_service_group();
    let groups = platform
        .iot_agent
        .get_group_list()
        .await?
        .into_iter()
        .filter(|found| found.resource == group.resource && found.apikey == group.apikey)
        .collect::<Vec<_>>();
    let devices = platform
        .iot_agent
        .get_device_list()
        .await?
        .into_iter()
        .filter(|device| device.device_id == STANDARD_DEVICE_ID)
        .collect::<Vec<_>>();
    let entities = platform
        .context_broker
        .get_entity_list(&EntityQuery {
            id: Some(STANDARD_ENTITY_ID.to_string()),
            ..EntityQuery::all()
        })
        .await?;

    if (groups.len(), devices.len(), entities.len()) != (1, 1, 1) {
        return Err(ScenarioError::PropertyViolated {
            property: RECREATE_SAFE,
            observed: format!(
                "{} service groups {} {}, {} devices {STANDARD_DEVICE_ID}, {} entities {}",
                groups.len(),
                group.resource,
                group.apikey,
                devices.len(),
                entities.len(),
                STANDARD_ENTITY_ID
            ),
        });
    }

    let defines_redefined = |attributes: &[DeviceAttribute]| {
        attributes
            .iter()
            .any(|attribute| attribute.name == REDEFINED_ATTRIBUTE)
    };
    let stale = [
        (!defines_redefined(&groups[0].attributes[..])).then_some("service group"),
        (!defines_redefined(&devices[0].attributes[..])).then_some("device"),
        entities[0]
            .attribute(REDEFINED_ATTRIBUTE)
            .is_none()
            .then_some("entity"),
    ];
    let stale: Vec<&str> = stale.into_iter().flatten().collect();
    if !stale.is_empty() {
        return Err(ScenarioError::PropertyViolated {
            property: RECREATE_SAFE,
            observed: format!(
                "{REDEFINED_ATTRIBUTE} missing from the recreated {}",
                stale.join(", ")
            ),
        });
    }

    info!("Recreated resources replace the previous ones");
    Ok(())
}

/// Clear the tenants used by a check, whatever its outcome
///
/// A failed check takes precedence over a failed cleanup.
async fn cleared_after(
    outcome: Result<(), ScenarioError>,
    platforms: &[&Platform],
) -> Result<(), ScenarioError> {
    let mut teardown = Ok(());
    for platform in platforms {
        if let Err(err) = clear_all(platform, platform.tenant()).await {
            warn!("Cleanup of {} failed: {err}", platform.tenant());
            teardown = teardown.and(Err(err));
        }
    }
    outcome.and(teardown)
}
