use crate::http::TenantHttp;
use crate::AttributeSeries;
use crate::EndPoint;
use crate::IgnoreNotFound;
use crate::PlatformError;
use crate::RetryPolicy;
use crate::TimeSeriesHeader;
use async_trait::async_trait;
use fiware_config::TenantContext;
use mockall::automock;
use reqwest::Method;
use serde_json::Value;
use tracing::info;

/// The time series recorded by QuantumLeap from Context Broker notifications
#[automock]
#[async_trait]
pub trait TimeSeries: Send + Sync {
    async fn get_version(&self) -> Result<Value, PlatformError>;

    /// The entities with recorded values, none if nothing has been recorded yet
    async fn get_entity_list(&self) -> Result<Vec<TimeSeriesHeader>, PlatformError>;

    /// The values recorded for an attribute, limited to the `last_n` most recent ones
    async fn get_attribute_series(
        &self,
        entity_id: &str,
        attr: &str,
        last_n: Option<usize>,
    ) -> Result<AttributeSeries, PlatformError>;

    async fn delete_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<(), PlatformError>;
}

#[derive(Debug, Clone)]
pub struct QuantumLeapClient {
    http: TenantHttp,
    end_point: EndPoint,
}

impl QuantumLeapClient {
    pub fn new(
        http_con: reqwest::Client,
        end_point: EndPoint,
        tenant: TenantContext,
        retry: RetryPolicy,
    ) -> Self {
        QuantumLeapClient {
            http: TenantHttp::new(http_con, tenant, retry),
            end_point,
        }
    }

    pub fn tenant(&self) -> &TenantContext {
        self.http.tenant()
    }
}

#[async_trait]
impl TimeSeries for QuantumLeapClient {
    async fn get_version(&self) -> Result<Value, PlatformError> {
        self.http
            .get_json(self.end_point.get_url_for_version(), &[])
            .await
    }

    async fn get_entity_list(&self) -> Result<Vec<TimeSeriesHeader>, PlatformError> {
        // QuantumLeap answers 404 "No records were found" for an empty tenant
        let entities = self
            .http
            .get_json(self.end_point.get_url_for_entities(), &[])
            .await
            .ignore_not_found()?;
        Ok(entities.unwrap_or_default())
    }

    async fn get_attribute_series(
        &self,
        entity_id: &str,
        attr: &str,
        last_n: Option<usize>,
    ) -> Result<AttributeSeries, PlatformError> {
        let query: Vec<(&str, String)> = last_n
            .map(|last_n| vec![("lastN", last_n.to_string())])
            .unwrap_or_default();
        self.http
            .get_json(self.end_point.get_url_for_attribute(entity_id, attr), &query)
            .await
    }

    async fn delete_entity<'a>(
        &self,
        entity_id: &str,
        entity_type: Option<&'a str>,
    ) -> Result<(), PlatformError> {
        let url = self.end_point.get_url_for_entity(entity_id);
        let query: Vec<(&str, String)> = entity_type
            .map(|entity_type| vec![("type", entity_type.to_string())])
            .unwrap_or_default();
        self.http
            .send_with_retry("delete time series", || {
                self.http.request(Method::DELETE, url.clone()).query(&query)
            })
            .await?;
        info!("Time series of {entity_id} deleted");
        Ok(())
    }
}
