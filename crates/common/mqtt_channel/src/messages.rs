use crate::errors::ChannelError;
use crate::topics::Topic;
use rumqttc::Publish;

/// A message published by a device or notified by the platform
///
/// Messages are always published with QoS 1 and never retained:
/// a stimulus is sent once and only counts once acknowledged.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: &Topic, payload: impl Into<Vec<u8>>) -> Message {
        Message {
            topic: topic.clone(),
            payload: payload.into(),
        }
    }

    /// The payload string (unless this payload is not UTF8)
    pub fn payload_str(&self) -> Result<&str, ChannelError> {
        let bytes = self.payload_bytes();
        std::str::from_utf8(bytes).map_err(|err| ChannelError::new_invalid_utf8_payload(bytes, err))
    }

    /// The bytes of the payload, without the trailing null char some devices append
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload
            .strip_suffix(&[0])
            .unwrap_or(self.payload.as_slice())
    }
}

impl From<Publish> for Message {
    fn from(publish: Publish) -> Self {
        Message {
            topic: Topic::new_unchecked(&publish.topic),
            payload: publish.payload.to_vec(),
        }
    }
}
