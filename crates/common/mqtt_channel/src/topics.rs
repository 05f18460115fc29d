use crate::errors::ChannelError;
use crate::Message;

/// An MQTT topic
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Topic {
    pub name: String,
}

impl Topic {
    /// Check if the topic name is valid and build a new topic.
    pub fn new(name: &str) -> Result<Topic, ChannelError> {
        let name = String::from(name);
        if rumqttc::valid_topic(&name) {
            Ok(Topic { name })
        } else {
            Err(ChannelError::InvalidTopic { name })
        }
    }

    /// Build a new topic, assuming the name is valid
    pub fn new_unchecked(name: &str) -> Topic {
        Topic {
            name: String::from(name),
        }
    }
}

/// An MQTT topic filter, subscribed with QoS 1
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TopicFilter {
    pub pattern: String,
}

impl TopicFilter {
    /// Check if the pattern is valid and build a new topic filter.
    pub fn new(pattern: &str) -> Result<TopicFilter, ChannelError> {
        let pattern = String::from(pattern);
        if rumqttc::valid_filter(&pattern) {
            Ok(TopicFilter { pattern })
        } else {
            Err(ChannelError::InvalidFilter { pattern })
        }
    }

    /// Build a new topic filter, assuming the pattern is valid.
    pub fn new_unchecked(pattern: &str) -> TopicFilter {
        TopicFilter {
            pattern: String::from(pattern),
        }
    }

    /// Check if the given message matches this filter pattern.
    pub fn accept(&self, msg: &Message) -> bool {
        rumqttc::matches(&msg.topic.name, &self.pattern)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl std::fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}
