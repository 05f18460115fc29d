use crate::http::created_id;
use crate::http::TenantHttp;
use crate::ActionType;
use crate::BatchOperation;
use crate::ContextEntity;
use crate::EndPoint;
use crate::EntityQuery;
use crate::IgnoreNotFound;
use crate::PlatformError;
use crate::Registration;
use crate::RetryPolicy;
use crate::Subscription;
use async_trait::async_trait;
use fiware_config::TenantContext;
use mockall::automock;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::json;
use serde_json::Value;
use tracing::info;
use tracing::instrument;

/// The NGSI v2 API of the Context Broker, scoped to a tenant
#[automock]
#[async_trait]
pub trait ContextBroker: Send + Sync {
    async fn get_version(&self) -> Result<Value, PlatformError>;

    /// All the entities matching the query, following the pagination
    async fn get_entity_list(&self, query: &EntityQuery)
        -> Result<Vec<ContextEntity>, PlatformError>;

    async fn get_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<ContextEntity, PlatformError>;

    async fn does_entity_exist<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<bool, PlatformError>;

    /// Create an entity, or with `update` append its attributes to an existing one
    async fn post_entity(&self, entity: &ContextEntity, update: bool) -> Result<(), PlatformError>;

    /// Update attributes which must all exist
    async fn update_existing_attributes(&self, entity: &ContextEntity)
        -> Result<(), PlatformError>;

    /// Add or update attributes
    async fn append_attributes(&self, entity: &ContextEntity) -> Result<(), PlatformError>;

    async fn update_attribute_value<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        attr: &str,
        value: &Value,
    ) -> Result<(), PlatformError>;

    async fn delete_attribute<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        attr: &str,
    ) -> Result<(), PlatformError>;

    async fn delete_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<(), PlatformError>;

    async fn batch_update(
        &self,
        action: ActionType,
        entities: &[ContextEntity],
    ) -> Result<(), PlatformError>;

    /// Send a command to the device behind an entity
    async fn post_command<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        command: &str,
        value: &Value,
    ) -> Result<(), PlatformError>;

    async fn get_subscription_list(&self) -> Result<Vec<Subscription>, PlatformError>;

    async fn get_subscription(&self, id: &str) -> Result<Subscription, PlatformError>;

    /// Create a subscription, returning the id assigned by the broker
    async fn post_subscription(&self, subscription: &Subscription)
        -> Result<String, PlatformError>;

    async fn update_subscription(
        &self,
        id: &str,
        subscription: &Subscription,
    ) -> Result<(), PlatformError>;

    async fn delete_subscription(&self, id: &str) -> Result<(), PlatformError>;

    async fn get_registration_list(&self) -> Result<Vec<Registration>, PlatformError>;

    async fn delete_registration(&self, id: &str) -> Result<(), PlatformError>;
}

/// A Context Broker client over http
#[derive(Debug, Clone)]
pub struct ContextBrokerClient {
    http: TenantHttp,
    end_point: EndPoint,
}

impl ContextBrokerClient {
    pub fn new(
        http_con: reqwest::Client,
        end_point: EndPoint,
        tenant: TenantContext,
        retry: RetryPolicy,
    ) -> Self {
        ContextBrokerClient {
            http: TenantHttp::new(http_con, tenant, retry),
            end_point,
        }
    }

    /// A clone of this client sending each request exactly once
    pub fn without_retry(&self) -> Self {
        self.with_retry(RetryPolicy::none())
    }

    pub fn with_retry(&self, retry: RetryPolicy) -> Self {
        ContextBrokerClient {
            http: self.http.with_retry(retry),
            end_point: self.end_point.clone(),
        }
    }

    pub fn tenant(&self) -> &TenantContext {
        self.http.tenant()
    }
}

fn type_param(entity_type: Option<&str>) -> Vec<(&'static str, String)> {
    entity_type
        .map(|entity_type| vec![("type", entity_type.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl ContextBroker for ContextBrokerClient {
    async fn get_version(&self) -> Result<Value, PlatformError> {
        self.http
            .get_json(self.end_point.get_url_for_version(), &[])
            .await
    }

    #[instrument(skip(self), name = "get_entity_list")]
    async fn get_entity_list(
        &self,
        query: &EntityQuery,
    ) -> Result<Vec<ContextEntity>, PlatformError> {
        self.http
            .get_all_pages(self.end_point.get_url_for_entities(), &query.params())
            .await
    }

    async fn get_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<ContextEntity, PlatformError> {
        self.http
            .get_json(
                self.end_point.get_url_for_entity(entity_id),
                &type_param(entity_type),
            )
            .await
    }

    async fn does_entity_exist<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<bool, PlatformError> {
        let mut query = type_param(entity_type);
        query.push(("attrs", "id".to_string()));
        let response = self
            .http
            .send(
                self.http
                    .request(Method::GET, self.end_point.get_url_for_entity(entity_id))
                    .query(&query),
            )
            .await
            .ignore_not_found()?;
        Ok(response.is_some())
    }

    #[instrument(skip(self, entity), fields(id = %entity.id), name = "post_entity")]
    async fn post_entity(&self, entity: &ContextEntity, update: bool) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_entities();
        let query: Vec<(&str, &str)> = if update {
            vec![("options", "upsert")]
        } else {
            vec![]
        };
        self.http
            .send_with_retry("post entity", || {
                self.http
                    .request(Method::POST, url.clone())
                    .query(&query)
                    .json(entity)
            })
            .await?;
        info!("Entity {entity} posted");
        Ok(())
    }

    async fn update_existing_attributes(
        &self,
        entity: &ContextEntity,
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_entity_attrs(&entity.id);
        let query = type_param(Some(&entity.entity_type));
        let attributes = entity.attributes_json();
        self.http
            .send_with_retry("update attributes", || {
                self.http
                    .request(Method::PATCH, url.clone())
                    .query(&query)
                    .json(&attributes)
            })
            .await?;
        Ok(())
    }

    async fn append_attributes(&self, entity: &ContextEntity) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_entity_attrs(&entity.id);
        let query = type_param(Some(&entity.entity_type));
        let attributes = entity.attributes_json();
        self.http
            .send_with_retry("append attributes", || {
                self.http
                    .request(Method::POST, url.clone())
                    .query(&query)
                    .json(&attributes)
            })
            .await?;
        Ok(())
    }

    async fn update_attribute_value<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        attr: &str,
        value: &Value,
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_attribute_value(entity_id, attr);
        let query = type_param(entity_type);
        // Objects and arrays are sent as JSON, other values as their JSON text
        let (content_type, body) = match value {
            Value::Object(_) | Value::Array(_) => ("application/json", value.to_string()),
            _ => ("text/plain", value.to_string()),
        };
        self.http
            .send_with_retry("update attribute value", || {
                self.http
                    .request(Method::PUT, url.clone())
                    .query(&query)
                    .header(CONTENT_TYPE, content_type)
                    .body(body.clone())
            })
            .await?;
        Ok(())
    }

    async fn delete_attribute<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        attr: &str,
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_attribute(entity_id, attr);
        let query = type_param(entity_type);
        self.http
            .send_with_retry("delete attribute", || {
                self.http.request(Method::DELETE, url.clone()).query(&query)
            })
            .await?;
        Ok(())
    }

    async fn delete_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_entity(entity_id);
        let query = type_param(entity_type);
        self.http
            .send_with_retry("delete entity", || {
                self.http.request(Method::DELETE, url.clone()).query(&query)
            })
            .await?;
        info!("Entity {entity_id} deleted");
        Ok(())
    }

    #[instrument(skip(self, entities), fields(count = entities.len()), name = "batch_update")]
    async fn batch_update(
        &self,
        action: ActionType,
        entities: &[ContextEntity],
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_batch_update();
        let batch = BatchOperation {
            action_type: action,
            entities: entities.to_vec(),
        };
        self.http
            .send_with_retry("batch update", || {
                self.http.request(Method::POST, url.clone()).json(&batch)
            })
            .await?;
        Ok(())
    }

    async fn post_command<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
        command: &str,
        value: &Value,
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_entity_attrs(entity_id);
        let query = type_param(entity_type);
        let body = json!({ command: {"type": "command", "value": value} });
        self.http
            .send_with_retry("post command", || {
                self.http
                    .request(Method::PATCH, url.clone())
                    .query(&query)
                    .json(&body)
            })
            .await?;
        Ok(())
    }

    async fn get_subscription_list(&self) -> Result<Vec<Subscription>, PlatformError> {
        self.http
            .get_all_pages(self.end_point.get_url_for_subscriptions(), &[])
            .await
    }

    async fn get_subscription(&self, id: &str) -> Result<Subscription, PlatformError> {
        self.http
            .get_json(self.end_point.get_url_for_subscription(id), &[])
            .await
    }

    #[instrument(skip(self, subscription), name = "post_subscription")]
    async fn post_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<String, PlatformError> {
        let url = self.end_point.get_url_for_subscriptions();
        let response = self
            .http
            .send_with_retry("post subscription", || {
                self.http.request(Method::POST, url.clone()).json(subscription)
            })
            .await?;
        let id = created_id(&response)?;
        info!("Subscription {id} created");
        Ok(id)
    }

    async fn update_subscription(
        &self,
        id: &str,
        subscription: &Subscription,
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_subscription(id);
        self.http
            .send_with_retry("update subscription", || {
                self.http.request(Method::PATCH, url.clone()).json(subscription)
            })
            .await?;
        Ok(())
    }

    async fn delete_subscription(&self, id: &str) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_subscription(id);
        self.http
            .send_with_retry("delete subscription", || {
                self.http.request(Method::DELETE, url.clone())
            })
            .await?;
        Ok(())
    }

    async fn get_registration_list(&self) -> Result<Vec<Registration>, PlatformError> {
        self.http
            .get_all_pages(self.end_point.get_url_for_registrations(), &[])
            .await
    }

    async fn delete_registration(&self, id: &str) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_registration(id);
        self.http
            .send_with_retry("delete registration", || {
                self.http.request(Method::DELETE, url.clone())
            })
            .await?;
        Ok(())
    }
}
