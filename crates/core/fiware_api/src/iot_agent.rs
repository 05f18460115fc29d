use crate::http::TenantHttp;
use crate::Device;
use crate::EndPoint;
use crate::IgnoreNotFound;
use crate::PlatformError;
use crate::RetryPolicy;
use crate::ServiceGroup;
use crate::DEFAULT_RESOURCE;
use async_trait::async_trait;
use fiware_config::TenantContext;
use mockall::automock;
use reqwest::Method;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use tracing::instrument;

const PAGE_SIZE: usize = 100;

/// The provisioning API of the IoT-Agent, plus its south bound http transport
#[automock]
#[async_trait]
pub trait IotAgent: Send + Sync {
    async fn get_version(&self) -> Result<Value, PlatformError>;

    async fn get_group_list(&self) -> Result<Vec<ServiceGroup>, PlatformError>;

    async fn get_group(&self, resource: &str, apikey: &str)
        -> Result<ServiceGroup, PlatformError>;

    async fn post_groups(&self, groups: &[ServiceGroup]) -> Result<(), PlatformError>;

    async fn update_group(&self, group: &ServiceGroup) -> Result<(), PlatformError>;

    async fn delete_group(&self, resource: &str, apikey: &str) -> Result<(), PlatformError>;

    async fn get_device_list(&self) -> Result<Vec<Device>, PlatformError>;

    async fn get_device(&self, device_id: &str) -> Result<Device, PlatformError>;

    async fn does_device_exist(&self, device_id: &str) -> Result<bool, PlatformError>;

    async fn post_devices(&self, devices: &[Device]) -> Result<(), PlatformError>;

    async fn update_device(&self, device: &Device) -> Result<(), PlatformError>;

    async fn delete_device(&self, device_id: &str) -> Result<(), PlatformError>;

    /// Send a measure as would do a device using the http transport
    async fn post_measure(
        &self,
        apikey: &str,
        device_id: &str,
        payload: &Value,
    ) -> Result<(), PlatformError>;
}

#[derive(Deserialize)]
struct GroupList {
    #[serde(default)]
    services: Vec<ServiceGroup>,
}

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Serialize)]
struct GroupBatch<'a> {
    services: &'a [ServiceGroup],
}

#[derive(Serialize)]
struct DeviceBatch<'a> {
    devices: &'a [Device],
}

/// An IoT-Agent client over http
///
/// The north bound end point is used for provisioning, the south bound one for measures.
#[derive(Debug, Clone)]
pub struct IotAgentClient {
    http: TenantHttp,
    north: EndPoint,
    south: EndPoint,
}

impl IotAgentClient {
    pub fn new(
        http_con: reqwest::Client,
        north: EndPoint,
        south: EndPoint,
        tenant: TenantContext,
        retry: RetryPolicy,
    ) -> Self {
        IotAgentClient {
            http: TenantHttp::new(http_con, tenant, retry),
            north,
            south,
        }
    }

    /// A clone of this client sending each request exactly once
    pub fn without_retry(&self) -> Self {
        self.with_retry(RetryPolicy::none())
    }

    pub fn with_retry(&self, retry: RetryPolicy) -> Self {
        IotAgentClient {
            http: self.http.with_retry(retry),
            ..self.clone()
        }
    }

    pub fn tenant(&self) -> &TenantContext {
        self.http.tenant()
    }
}

fn group_key(resource: &str, apikey: &str) -> [(&'static str, String); 2] {
    [
        ("resource", resource.to_string()),
        ("apikey", apikey.to_string()),
    ]
}

/// The body of an update, without the fields identifying the updated resource
fn without_keys(value: impl Serialize, keys: &[&str]) -> Result<Value, PlatformError> {
    let mut body = serde_json::to_value(value).map_err(|err| PlatformError::InvalidRequest {
        reason: err.to_string(),
    })?;
    if let Value::Object(fields) = &mut body {
        for key in keys {
            fields.remove(*key);
        }
    }
    Ok(body)
}

#[async_trait]
impl IotAgent for IotAgentClient {
    async fn get_version(&self) -> Result<Value, PlatformError> {
        self.http
            .get_json(self.north.get_url_for_iot_about(), &[])
            .await
    }

    async fn get_group_list(&self) -> Result<Vec<ServiceGroup>, PlatformError> {
        let groups: GroupList = self
            .http
            .get_json(self.north.get_url_for_services(), &[])
            .await?;
        Ok(groups.services)
    }

    async fn get_group(
        &self,
        resource: &str,
        apikey: &str,
    ) -> Result<ServiceGroup, PlatformError> {
        let url = self.north.get_url_for_services();
        let groups: GroupList = self
            .http
            .get_json(url.clone(), &group_key(resource, apikey))
            .await?;
        groups
            .services
            .into_iter()
            .find(|group| group.key() == (resource, apikey))
            .ok_or_else(|| PlatformError::NotFound {
                method: "GET".to_string(),
                url: url.to_string(),
                body: format!("no service group for resource {resource} and apikey {apikey}"),
            })
    }

    #[instrument(skip(self, groups), fields(count = groups.len()), name = "post_groups")]
    async fn post_groups(&self, groups: &[ServiceGroup]) -> Result<(), PlatformError> {
        let url = self.north.get_url_for_services();
        let body = GroupBatch { services: groups };
        self.http
            .send_with_retry("post service groups", || {
                self.http.request(Method::POST, url.clone()).json(&body)
            })
            .await?;
        Ok(())
    }

    async fn update_group(&self, group: &ServiceGroup) -> Result<(), PlatformError> {
        let url = self.north.get_url_for_services();
        let query = group_key(&group.resource, &group.apikey);
        let body = without_keys(group, &["resource", "apikey"])?;
        self.http
            .send_with_retry("update service group", || {
                self.http
                    .request(Method::PUT, url.clone())
                    .query(&query)
                    .json(&body)
            })
            .await?;
        Ok(())
    }

    async fn delete_group(&self, resource: &str, apikey: &str) -> Result<(), PlatformError> {
        let url = self.north.get_url_for_services();
        let query = group_key(resource, apikey);
        self.http
            .send_with_retry("delete service group", || {
                self.http.request(Method::DELETE, url.clone()).query(&query)
            })
            .await?;
        info!("Service group {resource} {apikey} deleted");
        Ok(())
    }

    async fn get_device_list(&self) -> Result<Vec<Device>, PlatformError> {
        let url = self.north.get_url_for_devices();
        let mut devices = Vec::new();
        loop {
            let query = [
                ("limit", PAGE_SIZE.to_string()),
                ("offset", devices.len().to_string()),
            ];
            let page: DeviceList = self.http.get_json(url.clone(), &query).await?;
            let page_len = page.devices.len();
            devices.extend(page.devices);

            let complete = match page.count {
                Some(count) => devices.len() >= count,
                None => page_len < PAGE_SIZE,
            };
            if complete || page_len == 0 {
                return Ok(devices);
            }
        }
    }

    async fn get_device(&self, device_id: &str) -> Result<Device, PlatformError> {
        self.http
            .get_json(self.north.get_url_for_device(device_id), &[])
            .await
    }

    async fn does_device_exist(&self, device_id: &str) -> Result<bool, PlatformError> {
        let device = self.get_device(device_id).await.ignore_not_found()?;
        Ok(device.is_some())
    }

    #[instrument(skip(self, devices), fields(count = devices.len()), name = "post_devices")]
    async fn post_devices(&self, devices: &[Device]) -> Result<(), PlatformError> {
        let url = self.north.get_url_for_devices();
        let body = DeviceBatch { devices };
        self.http
            .send_with_retry("post devices", || {
                self.http.request(Method::POST, url.clone()).json(&body)
            })
            .await?;
        Ok(())
    }

    async fn update_device(&self, device: &Device) -> Result<(), PlatformError> {
        let url = self.north.get_url_for_device(&device.device_id);
        let body = without_keys(device, &["device_id"])?;
        self.http
            .send_with_retry("update device", || {
                self.http.request(Method::PUT, url.clone()).json(&body)
            })
            .await?;
        Ok(())
    }

    async fn delete_device(&self, device_id: &str) -> Result<(), PlatformError> {
        let url = self.north.get_url_for_device(device_id);
        self.http
            .send_with_retry("delete device", || {
                self.http.request(Method::DELETE, url.clone())
            })
            .await?;
        info!("Device {device_id} deleted");
        Ok(())
    }

    async fn post_measure(
        &self,
        apikey: &str,
        device_id: &str,
        payload: &Value,
    ) -> Result<(), PlatformError> {
        let url = self.south.get_url_for_measure(DEFAULT_RESOURCE);
        let query = [("k", apikey), ("i", device_id)];
        self.http
            .send_with_retry("post measure", || {
                self.http
                    .request(Method::POST, url.clone())
                    .query(&query)
                    .json(payload)
            })
            .await?;
        Ok(())
    }
}

