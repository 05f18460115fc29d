use crate::ConfigError;
use std::fmt::Display;

const MAX_SERVICE_LEN: usize = 50;
const MAX_PATH_SEGMENT_LEN: usize = 50;

/// The tenant all the platform requests of a scenario are scoped to
///
/// Sent with each request as the `fiware-service` and `fiware-servicepath` headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    service: String,
    service_path: String,
}

impl TenantContext {
    pub fn new(
        service: impl Into<String>,
        service_path: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let service = service.into();
        let service_path = service_path.into();
        validate_service(&service)?;
        validate_service_path(&service_path)?;
        Ok(TenantContext {
            service,
            service_path,
        })
    }

    /// The tenant of a CI job: the configured service with `/<ci_job_id>` as path
    pub fn for_ci_job(service: impl Into<String>, ci_job_id: &str) -> Result<Self, ConfigError> {
        TenantContext::new(service, format!("/{ci_job_id}"))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// The same service with another service path
    pub fn with_service_path(&self, service_path: impl Into<String>) -> Result<Self, ConfigError> {
        TenantContext::new(self.service.clone(), service_path)
    }
}

impl Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.service, self.service_path)
    }
}

fn validate_service(service: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidService {
        service: service.to_string(),
        reason,
    };
    if service.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if service.len() > MAX_SERVICE_LEN {
        return Err(invalid("must not be longer than 50 characters"));
    }
    if !service
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid(
            "only lowercase alphanumeric characters and underscores are allowed",
        ));
    }
    Ok(())
}

fn validate_service_path(path: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidServicePath {
        path: path.to_string(),
        reason,
    };
    let Some(segments) = path.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if segments.is_empty() {
        return Ok(());
    }
    for segment in segments.split('/') {
        if segment.is_empty() {
            return Err(invalid("must not contain empty segments"));
        }
        if segment.len() > MAX_PATH_SEGMENT_LEN {
            return Err(invalid("segments must not be longer than 50 characters"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(
                "only alphanumeric characters, dashes and underscores are allowed",
            ));
        }
    }
    Ok(())
}
