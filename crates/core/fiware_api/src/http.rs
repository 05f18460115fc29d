use crate::PlatformError;
use crate::RetryPolicy;
use fiware_config::TenantContext;
use reqwest::header::HeaderMap;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const FIWARE_SERVICE: &str = "fiware-service";
pub const FIWARE_SERVICE_PATH: &str = "fiware-servicepath";
pub const TOTAL_COUNT: &str = "fiware-total-count";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum page size accepted by the Context Broker
pub const PAGE_SIZE: usize = 1000;

/// An http connection scoped to a tenant
#[derive(Debug, Clone)]
pub(crate) struct TenantHttp {
    http_con: reqwest::Client,
    tenant: TenantContext,
    retry: RetryPolicy,
    timeout: Duration,
}

impl TenantHttp {
    pub fn new(http_con: reqwest::Client, tenant: TenantContext, retry: RetryPolicy) -> Self {
        TenantHttp {
            http_con,
            tenant,
            retry,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    pub fn with_retry(&self, retry: RetryPolicy) -> Self {
        TenantHttp {
            retry,
            ..self.clone()
        }
    }

    /// A request carrying the tenant headers
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_con
            .request(method, url)
            .header(FIWARE_SERVICE, self.tenant.service())
            .header(FIWARE_SERVICE_PATH, self.tenant.service_path())
            .timeout(self.timeout)
    }

    /// Send a request once, turning any non success status into an error
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let request = request.build().map_err(|err| {
            let url = err.url().map(|url| url.to_string()).unwrap_or_default();
            PlatformError::from_reqwest("?", url, err)
        })?;
        let method = request.method().to_string();
        let url = request.url().to_string();

        debug!(target: "HTTP", "{method} {url}");
        let response = self
            .http_con
            .execute(request)
            .await
            .map_err(|err| PlatformError::from_reqwest(&method, &url, err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(target: "HTTP", "{method} {url} => {status}: {body}");
        Err(PlatformError::from_status(method, url, status, body))
    }

    /// Send a request built afresh for each attempt of the retry policy
    pub async fn send_with_retry<F>(
        &self,
        operation: &str,
        build_request: F,
    ) -> Result<Response, PlatformError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.retry
            .run(operation, || self.send(build_request()))
            .await
    }

    /// Send a GET request and parse the JSON response
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let response = self.send(self.request(Method::GET, url).query(query)).await?;
        parse_json(response).await
    }

    /// Get all the items of a paginated Context Broker collection
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, PlatformError> {
        let mut items = Vec::new();
        loop {
            let mut params = query.to_vec();
            params.push(("limit", PAGE_SIZE.to_string()));
            params.push(("offset", items.len().to_string()));
            params.push(("options", "count".to_string()));

            let response = self
                .send(self.request(Method::GET, url.clone()).query(&params))
                .await?;
            let total = total_count(response.headers());
            let page: Vec<T> = parse_json(response).await?;
            let page_len = page.len();
            items.extend(page);

            let complete = match total {
                Some(total) => items.len() >= total,
                None => page_len < PAGE_SIZE,
            };
            if complete || page_len == 0 {
                return Ok(items);
            }
        }
    }
}

pub(crate) async fn parse_json<T: DeserializeOwned>(
    response: Response,
) -> Result<T, PlatformError> {
    let url = response.url().to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| PlatformError::from_reqwest("GET", &url, err))?;
    serde_json::from_slice(&bytes).map_err(|err| PlatformError::InvalidResponse {
        url,
        reason: err.to_string(),
    })
}

fn total_count(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(TOTAL_COUNT)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// The id of a created resource, i.e. the last segment of its `Location` header
pub(crate) fn created_id(response: &Response) -> Result<String, PlatformError> {
    let url = response.url().to_string();
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|location| location.to_str().ok())
        .and_then(|location| location.split('?').next())
        .and_then(|location| location.rsplit('/').find(|segment| !segment.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| PlatformError::InvalidResponse {
            url,
            reason: "missing Location header".to_string(),
        })
}
