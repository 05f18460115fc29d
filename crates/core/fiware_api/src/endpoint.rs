use crate::PlatformError;
use url::Url;

/// The base url of a platform component, used to build the urls of its resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndPoint {
    base: Url,
}

impl EndPoint {
    pub fn new(base: &Url) -> Result<EndPoint, PlatformError> {
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(PlatformError::InvalidUrl {
                url: base.to_string(),
                reason: "an http or https url is expected",
            });
        }
        Ok(EndPoint { base: base.clone() })
    }

    pub fn parse(base: &str) -> Result<EndPoint, PlatformError> {
        let url = Url::parse(base).map_err(|_| PlatformError::InvalidUrl {
            url: base.to_string(),
            reason: "not a url",
        })?;
        EndPoint::new(&url)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The url of a resource, each segment being percent-encoded
    pub fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn get_url_for_version(&self) -> Url {
        self.url_for(&["version"])
    }

    pub fn get_url_for_entities(&self) -> Url {
        self.url_for(&["v2", "entities"])
    }

    pub fn get_url_for_entity(&self, entity_id: &str) -> Url {
        self.url_for(&["v2", "entities", entity_id])
    }

    pub fn get_url_for_entity_attrs(&self, entity_id: &str) -> Url {
        self.url_for(&["v2", "entities", entity_id, "attrs"])
    }

    pub fn get_url_for_attribute(&self, entity_id: &str, attr: &str) -> Url {
        self.url_for(&["v2", "entities", entity_id, "attrs", attr])
    }

    pub fn get_url_for_attribute_value(&self, entity_id: &str, attr: &str) -> Url {
        self.url_for(&["v2", "entities", entity_id, "attrs", attr, "value"])
    }

    pub fn get_url_for_batch_update(&self) -> Url {
        self.url_for(&["v2", "op", "update"])
    }

    pub fn get_url_for_subscriptions(&self) -> Url {
        self.url_for(&["v2", "subscriptions"])
    }

    pub fn get_url_for_subscription(&self, id: &str) -> Url {
        self.url_for(&["v2", "subscriptions", id])
    }

    pub fn get_url_for_registrations(&self) -> Url {
        self.url_for(&["v2", "registrations"])
    }

    pub fn get_url_for_registration(&self, id: &str) -> Url {
        self.url_for(&["v2", "registrations", id])
    }

    pub fn get_url_for_iot_about(&self) -> Url {
        self.url_for(&["iot", "about"])
    }

    pub fn get_url_for_services(&self) -> Url {
        self.url_for(&["iot", "services"])
    }

    pub fn get_url_for_devices(&self) -> Url {
        self.url_for(&["iot", "devices"])
    }

    pub fn get_url_for_device(&self, device_id: &str) -> Url {
        self.url_for(&["iot", "devices", device_id])
    }

    /// The south bound url where devices post their measures
    pub fn get_url_for_measure(&self, resource: &str) -> Url {
        let segments: Vec<&str> = resource.split('/').filter(|s| !s.is_empty()).collect();
        self.url_for(&segments)
    }
}
