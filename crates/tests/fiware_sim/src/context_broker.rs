use crate::errors::already_exists;
use crate::errors::bad_request;
use crate::errors::missing_attributes;
use crate::errors::not_found;
use crate::state::Change;
use crate::state::SimState;
use crate::state::TenantState;
use crate::FiwareSim;
use async_trait::async_trait;
use fiware_api::ActionType;
use fiware_api::ContextBroker;
use fiware_api::ContextEntity;
use fiware_api::EntityQuery;
use fiware_api::PlatformError;
use fiware_api::Registration;
use fiware_api::Subscription;
use fiware_api::SubscriptionStatus;
use fiware_config::TenantContext;
use mqtt_channel::Message;
use regex::Regex;
use scenario_runner::command_topic;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

/// Attribute type of the status of a command
pub const COMMAND_STATUS: &str = "commandStatus";

/// Attribute type of the result of a command
pub const COMMAND_RESULT: &str = "commandResult";

/// The NGSI v2 API of the Context Broker
pub struct SimContextBroker {
    sim: FiwareSim,
    tenant: TenantContext,
}

impl SimContextBroker {
    pub fn new(sim: FiwareSim, tenant: TenantContext) -> Self {
        SimContextBroker { sim, tenant }
    }

    /// Apply an update to the tenant, then the notifications it triggers
    fn update<T>(
        &self,
        update: impl FnOnce(&mut TenantState) -> Result<(T, Vec<Change>), PlatformError>,
    ) -> Result<T, PlatformError> {
        let mut state = self.sim.lock();
        let (outcome, changes) = update(state.tenant(&self.tenant))?;
        for change in changes {
            state.commit(&self.tenant, Some(change));
        }
        Ok(outcome)
    }

    fn read<T>(&self, read: impl FnOnce(&TenantState) -> T) -> T {
        let mut state = self.sim.lock();
        read(state.tenant(&self.tenant))
    }
}

fn entity_url(entity_id: &str) -> String {
    format!("/v2/entities/{entity_id}")
}

impl TenantState {
    fn existing_entity(
        &mut self,
        method: &str,
        entity_id: &str,
        entity_type: Option<&str>,
    ) -> Result<&mut ContextEntity, PlatformError> {
        self.entity_mut(entity_id, entity_type)
            .ok_or_else(|| not_found(method, entity_url(entity_id)))
    }

    fn create_entity(&mut self, entity: &ContextEntity) -> Result<Change, PlatformError> {
        if self.entity(&entity.id, Some(&entity.entity_type)).is_some() {
            return Err(already_exists("POST", "/v2/entities"));
        }
        Ok(self.upsert(entity))
    }

    /// Replace the attributes of an entity, which must all exist
    fn update_existing(&mut self, update: &ContextEntity) -> Result<Change, PlatformError> {
        let url = format!("{}/attrs", entity_url(&update.id));
        let entity = self.existing_entity("PATCH", &update.id, Some(&update.entity_type))?;
        if !update
            .attributes
            .keys()
            .all(|name| entity.attributes.contains_key(name))
        {
            return Err(missing_attributes("PATCH", url));
        }
        entity.attributes.extend(update.attributes.clone());
        Ok(Change::of(update))
    }

    fn append(&mut self, update: &ContextEntity, strict: bool) -> Result<Change, PlatformError> {
        let url = format!("{}/attrs", entity_url(&update.id));
        let entity = self.existing_entity("POST", &update.id, Some(&update.entity_type))?;
        if strict
            && update
                .attributes
                .keys()
                .any(|name| entity.attributes.contains_key(name))
        {
            return Err(already_exists("POST", url));
        }
        entity.attributes.extend(update.attributes.clone());
        Ok(Change::of(update))
    }

    fn replace(&mut self, update: &ContextEntity) -> Result<Change, PlatformError> {
        let entity = self.existing_entity("PUT", &update.id, Some(&update.entity_type))?;
        entity.attributes = update.attributes.clone();
        Ok(Change::of(update))
    }

    fn remove_attribute(
        &mut self,
        entity_id: &str,
        entity_type: Option<&str>,
        attr: &str,
    ) -> Result<(), PlatformError> {
        let url = format!("{}/attrs/{attr}", entity_url(entity_id));
        self.existing_entity("DELETE", entity_id, entity_type)?
            .attributes
            .remove(attr)
            .map(|_| ())
            .ok_or_else(|| not_found("DELETE", url))
    }

    fn remove_entity(
        &mut self,
        entity_id: &str,
        entity_type: Option<&str>,
    ) -> Result<(), PlatformError> {
        let position = self
            .entities
            .iter()
            .position(|entity| {
                entity.id == entity_id
                    && entity_type.is_none_or(|entity_type| entity.entity_type == entity_type)
            })
            .ok_or_else(|| not_found("DELETE", entity_url(entity_id)))?;
        self.entities.remove(position);
        Ok(())
    }

    /// Apply a batch operation, stopping on the first failure
    fn batch(
        &mut self,
        action: ActionType,
        entities: &[ContextEntity],
    ) -> Result<Vec<Change>, PlatformError> {
        let mut changes = Vec::new();
        for entity in entities {
            let exists = self.entity(&entity.id, Some(&entity.entity_type)).is_some();
            let change = match action {
                ActionType::Append => Some(self.upsert(entity)),
                ActionType::AppendStrict if exists => Some(self.append(entity, true)?),
                ActionType::AppendStrict => Some(self.create_entity(entity)?),
                ActionType::Update => Some(self.update_existing(entity)?),
                ActionType::Replace => Some(self.replace(entity)?),
                ActionType::Delete if entity.attributes.is_empty() => {
                    self.remove_entity(&entity.id, Some(&entity.entity_type))?;
                    None
                }
                ActionType::Delete => {
                    for attr in entity.attributes.keys() {
                        self.remove_attribute(&entity.id, Some(&entity.entity_type), attr)?;
                    }
                    None
                }
            };
            changes.extend(change);
        }
        Ok(changes)
    }
}

impl SimState {
    /// Forward a command to the device behind an entity, marking the command as pending
    fn send_command(
        &mut self,
        tenant: &TenantContext,
        entity_id: &str,
        entity_type: Option<&str>,
        command: &str,
        value: &Value,
    ) -> Result<(), PlatformError> {
        let url = format!("{}/attrs/{command}", entity_url(entity_id));
        let state = self.tenant(tenant);
        let entity = state
            .entity(entity_id, entity_type)
            .ok_or_else(|| not_found("PATCH", url.clone()))?;
        let pending = ContextEntity::new(&entity.id, &entity.entity_type).with_attribute(
            format!("{command}_status"),
            COMMAND_STATUS,
            "PENDING",
        );

        let device = state
            .devices
            .iter()
            .find(|device| {
                device.entity_name == entity_id
                    && device.commands.iter().any(|cmd| cmd.name == command)
            })
            .ok_or_else(|| not_found("PATCH", url))?;
        let apikey = device
            .apikey
            .clone()
            .or_else(|| state.groups.first().map(|group| group.apikey.clone()))
            .unwrap_or_default();
        let topic = command_topic(&apikey, &device.device_id).map_err(|err| {
            bad_request("PATCH", entity_url(entity_id), &err.to_string())
        })?;
        let mut payload = Map::new();
        payload.insert(command.to_string(), value.clone());

        let change = state.upsert(&pending);
        debug!("Forwarding command {command} to {}", topic.name);
        self.publish([Message::new(&topic, Value::Object(payload).to_string())]);
        self.commit(tenant, Some(change));
        Ok(())
    }
}

fn matches_query(entity: &ContextEntity, query: &EntityQuery, id_pattern: Option<&Regex>) -> bool {
    query.id.as_ref().is_none_or(|id| *id == entity.id)
        && id_pattern.is_none_or(|pattern| pattern.is_match(&entity.id))
        && query
            .entity_type
            .as_ref()
            .is_none_or(|entity_type| *entity_type == entity.entity_type)
}

#[async_trait]
impl ContextBroker for SimContextBroker {
    async fn get_version(&self) -> Result<Value, PlatformError> {
        Ok(json!({"orion": {"version": "simulated"}}))
    }

    async fn get_entity_list(
        &self,
        query: &EntityQuery,
    ) -> Result<Vec<ContextEntity>, PlatformError> {
        let id_pattern = query
            .id_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| bad_request("GET", "/v2/entities", &err.to_string()))?;
        let attrs: Vec<&str> = query.attrs.iter().map(String::as_str).collect();

        Ok(self.read(|state| {
            state
                .entities
                .iter()
                .filter(|entity| matches_query(entity, query, id_pattern.as_ref()))
                .map(|entity| {
                    if attrs.is_empty() {
                        entity.clone()
                    } else {
                        entity.with_only(&attrs)
                    }
                })
                .collect()
        }))
    }

    async fn get_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<ContextEntity, PlatformError> {
        self.read(|state| state.entity(entity_id, entity_type).cloned())
            .ok_or_else(|| not_found("GET", entity_url(entity_id)))
    }

    async fn does_entity_exist<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<bool, PlatformError> {
        Ok(self.read(|state| state.entity(entity_id, entity_type).is_some()))
    }

    async fn post_entity(&self, entity: &ContextEntity, update: bool) -> Result<(), PlatformError> {
        self.update(|state| {
            let change = if update {
                state.upsert(entity)
            } else {
                state.create_entity(entity)?
            };
            Ok(((), vec![change]))
        })
    }

    async fn update_existing_attributes(
        &self,
        entity: &ContextEntity,
    ) -> Result<(), PlatformError> {
        self.update(|state| Ok(((), vec![state.update_existing(entity)?])))
    }

    async fn append_attributes(&self, entity: &ContextEntity) -> Result<(), PlatformError> {
        self.update(|state| Ok(((), vec![state.append(entity, false)?])))
    }

    async fn update_attribute_value<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        attr: &str,
        value: &Value,
    ) -> Result<(), PlatformError> {
        let url = format!("{}/attrs/{attr}/value", entity_url(entity_id));
        self.update(|state| {
            let entity = state.existing_entity("PUT", entity_id, entity_type)?;
            let attribute = entity
                .attributes
                .get_mut(attr)
                .ok_or_else(|| not_found("PUT", url))?;
            attribute.value = value.clone();
            let change = Change {
                entity_id: entity.id.clone(),
                entity_type: entity.entity_type.clone(),
                attrs: vec![attr.to_string()],
            };
            Ok(((), vec![change]))
        })
    }

    async fn delete_attribute<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        attr: &str,
    ) -> Result<(), PlatformError> {
        self.update(|state| {
            state.remove_attribute(entity_id, entity_type, attr)?;
            Ok(((), vec![]))
        })
    }

    async fn delete_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<(), PlatformError> {
        self.update(|state| {
            state.remove_entity(entity_id, entity_type)?;
            Ok(((), vec![]))
        })
    }

    async fn batch_update(
        &self,
        action: ActionType,
        entities: &[ContextEntity],
    ) -> Result<(), PlatformError> {
        self.update(|state| Ok(((), state.batch(action, entities)?)))
    }

    async fn post_command<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        command: &str,
        value: &Value,
    ) -> Result<(), PlatformError> {
        self.sim
            .lock()
            .send_command(&self.tenant, entity_id, entity_type, command, value)
    }

    async fn get_subscription_list(&self) -> Result<Vec<Subscription>, PlatformError> {
        Ok(self.read(|state| state.subscriptions.clone()))
    }

    async fn get_subscription(&self, id: &str) -> Result<Subscription, PlatformError> {
        self.read(|state| {
            state
                .subscriptions
                .iter()
                .find(|subscription| subscription.id.as_deref() == Some(id))
                .cloned()
        })
        .ok_or_else(|| not_found("GET", format!("/v2/subscriptions/{id}")))
    }

    async fn post_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<String, PlatformError> {
        if subscription.subject.entities.is_empty() {
            return Err(bad_request(
                "POST",
                "/v2/subscriptions",
                "no entities in subject",
            ));
        }

        let mut state = self.sim.lock();
        let id = state.next_id();
        state.tenant(&self.tenant).subscriptions.push(Subscription {
            id: Some(id.clone()),
            status: Some(subscription.status.unwrap_or(SubscriptionStatus::Active)),
            ..subscription.clone()
        });
        Ok(id)
    }

    async fn update_subscription(
        &self,
        id: &str,
        subscription: &Subscription,
    ) -> Result<(), PlatformError> {
        self.update(|state| {
            let existing = state
                .subscriptions
                .iter_mut()
                .find(|existing| existing.id.as_deref() == Some(id))
                .ok_or_else(|| not_found("PATCH", format!("/v2/subscriptions/{id}")))?;
            *existing = Subscription {
                id: existing.id.clone(),
                ..subscription.clone()
            };
            Ok(((), vec![]))
        })
    }

    async fn delete_subscription(&self, id: &str) -> Result<(), PlatformError> {
        self.update(|state| {
            let position = state
                .subscriptions
                .iter()
                .position(|subscription| subscription.id.as_deref() == Some(id))
                .ok_or_else(|| not_found("DELETE", format!("/v2/subscriptions/{id}")))?;
            state.subscriptions.remove(position);
            Ok(((), vec![]))
        })
    }

    async fn get_registration_list(&self) -> Result<Vec<Registration>, PlatformError> {
        Ok(self.read(|state| state.registrations.clone()))
    }

    async fn delete_registration(&self, id: &str) -> Result<(), PlatformError> {
        self.update(|state| {
            let position = state
                .registrations
                .iter()
                .position(|registration| registration.id == id)
                .ok_or_else(|| not_found("DELETE", format!("/v2/registrations/{id}")))?;
            state.registrations.remove(position);
            Ok(((), vec![]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn context_broker() -> SimContextBroker {
        SimContextBroker::new(
            FiwareSim::default(),
            TenantContext::new("sim", "/").unwrap(),
        )
    }

    fn product() -> ContextEntity {
        ContextEntity::new("urn:ngsi-ld:Product:001", "Product")
            .with_attribute("price", "Integer", 99)
            .with_attribute("name", "Text", "Apples")
    }

    #[tokio::test]
    async fn an_entity_cannot_be_created_twice() {
        let context_broker = context_broker();
        context_broker.post_entity(&product(), false).await.unwrap();

        assert_matches!(
            context_broker.post_entity(&product(), false).await,
            Err(PlatformError::Conflict { status: 422, .. })
        );
        context_broker.post_entity(&product(), true).await.unwrap();
    }

    #[tokio::test]
    async fn patching_requires_existing_attributes() {
        let context_broker = context_broker();
        context_broker.post_entity(&product(), false).await.unwrap();

        let update = ContextEntity::new("urn:ngsi-ld:Product:001", "Product")
            .with_attribute("price", "String", "79");
        context_broker
            .update_existing_attributes(&update)
            .await
            .unwrap();
        let price = context_broker
            .get_entity("urn:ngsi-ld:Product:001", None)
            .await
            .unwrap()
            .attribute("price")
            .cloned()
            .unwrap();
        assert_eq!(price.attr_type, "String");
        assert_eq!(price.value, json!("79"));

        let unknown = ContextEntity::new("urn:ngsi-ld:Product:001", "Product")
            .with_attribute("color", "Text", "red");
        assert_matches!(
            context_broker.update_existing_attributes(&unknown).await,
            Err(PlatformError::Conflict { .. })
        );
    }

    #[tokio::test]
    async fn batch_delete_removes_attributes_or_entities() {
        let context_broker = context_broker();
        context_broker.post_entity(&product(), false).await.unwrap();

        let attributes = ContextEntity::new("urn:ngsi-ld:Product:001", "Product").with_attribute(
            "price",
            "Integer",
            Value::Null,
        );
        context_broker
            .batch_update(ActionType::Delete, &[attributes])
            .await
            .unwrap();
        let entity = context_broker
            .get_entity("urn:ngsi-ld:Product:001", Some("Product"))
            .await
            .unwrap();
        assert_eq!(entity.attributes.keys().collect::<Vec<_>>(), vec!["name"]);

        let whole = ContextEntity::new("urn:ngsi-ld:Product:001", "Product");
        context_broker
            .batch_update(ActionType::Delete, &[whole.clone()])
            .await
            .unwrap();
        assert!(!context_broker
            .does_entity_exist("urn:ngsi-ld:Product:001", None)
            .await
            .unwrap());
        assert_matches!(
            context_broker
                .batch_update(ActionType::Delete, &[whole])
                .await,
            Err(PlatformError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn append_strict_refuses_existing_attributes() {
        let context_broker = context_broker();
        context_broker.post_entity(&product(), false).await.unwrap();

        assert_matches!(
            context_broker
                .batch_update(ActionType::AppendStrict, &[product()])
                .await,
            Err(PlatformError::Conflict { .. })
        );
    }

    #[tokio::test]
    async fn entities_are_listed_by_pattern_and_type() {
        let context_broker = context_broker();
        context_broker.post_entity(&product(), false).await.unwrap();
        context_broker
            .post_entity(&ContextEntity::new("Entity:001", "Entity"), false)
            .await
            .unwrap();

        let products = context_broker
            .get_entity_list(&EntityQuery::all().with_type("Product"))
            .await
            .unwrap();
        let by_pattern = context_broker
            .get_entity_list(&EntityQuery::all().with_id_pattern("^Entity:"))
            .await
            .unwrap();

        assert_eq!(products, vec![product()]);
        assert_eq!(by_pattern.len(), 1);
        assert_eq!(by_pattern[0].id, "Entity:001");
    }

    #[tokio::test]
    async fn subscriptions_are_active_by_default() {
        let context_broker = context_broker();
        let subscription = Subscription::new(
            fiware_api::Subject::new(vec![fiware_api::EntityPattern::id("Entity:001")]),
            fiware_api::Notification::http("http://quantumleap:8668/v2/notify"),
        );

        let id = context_broker
            .post_subscription(&subscription)
            .await
            .unwrap();

        let created = context_broker.get_subscription(&id).await.unwrap();
        assert_eq!(created.id.as_deref(), Some(id.as_str()));
        assert!(created.is_active());
    }
}
