use crate::assertions::assert_attribute_absent;
use crate::assertions::assert_attribute_metadata_present;
use crate::assertions::assert_attribute_type;
use crate::assertions::assert_attribute_value;
use crate::assertions::Mismatch;
use crate::assertions::NotificationMatch;
use crate::expectation::Check;
use crate::expectation::Expectation;
use crate::expectation::Mode;
use crate::Platform;
use crate::ScenarioError;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use fiware_api::ErrorKind;
use fiware_api::PlatformError;
use fiware_config::TimingConfig;
use mqtt_channel::EventChannel;
use mqtt_channel::Mailbox;
use mqtt_channel::TopicFilter;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

/// The outcome of a single evaluation of a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Met,
    NotMet(String),
}

impl From<Result<(), Mismatch>> for Observation {
    fn from(outcome: Result<(), Mismatch>) -> Self {
        match outcome {
            Ok(()) => Observation::Met,
            Err(mismatch) => Observation::NotMet(mismatch.observed),
        }
    }
}

/// The mailboxes of the topics notifications are expected on
#[derive(Debug, Clone, Default)]
pub struct Watched {
    mailboxes: BTreeMap<String, Mailbox>,
}

/// How many messages each watched mailbox had received before a stimulus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    versions: BTreeMap<String, u64>,
}

impl Watched {
    pub async fn subscribe<'a>(
        events: &dyn EventChannel,
        topics: impl IntoIterator<Item = &'a str>,
    ) -> Result<Watched, ScenarioError> {
        let mut mailboxes = BTreeMap::new();
        for topic in topics {
            if mailboxes.contains_key(topic) {
                continue;
            }
            let mailbox = events.subscribe(TopicFilter::new(topic)?).await?;
            mailboxes.insert(topic.to_string(), mailbox);
        }
        Ok(Watched { mailboxes })
    }

    pub fn baseline(&self) -> Baseline {
        Baseline {
            versions: self
                .mailboxes
                .iter()
                .map(|(topic, mailbox)| (topic.clone(), mailbox.version()))
                .collect(),
        }
    }

    pub fn mailbox(&self, topic: &str) -> Option<&Mailbox> {
        self.mailboxes.get(topic)
    }
}

impl Baseline {
    fn version(&self, topic: &str) -> u64 {
        self.versions.get(topic).copied().unwrap_or(0)
    }
}

/// Evaluates expectations after a stimulus
pub struct Verifier<'a> {
    platform: &'a Platform,
    timing: TimingConfig,
    watched: &'a Watched,
    subscription_ids: &'a [String],
}

impl<'a> Verifier<'a> {
    pub fn new(
        platform: &'a Platform,
        timing: TimingConfig,
        watched: &'a Watched,
        subscription_ids: &'a [String],
    ) -> Self {
        Verifier {
            platform,
            timing,
            watched,
            subscription_ids,
        }
    }

    /// Wait for the settle delay, then check the expectations in turn
    ///
    /// Deadlines are counted from the acknowledgement of the stimulus.
    pub async fn verify(
        &self,
        expectations: &[Expectation],
        baseline: &Baseline,
        acknowledged: Instant,
    ) -> Result<(), ScenarioError> {
        tokio::time::sleep_until(acknowledged + self.timing.settle).await;

        for expectation in expectations {
            match expectation.mode {
                Mode::Settled => self.check_once(expectation, baseline).await?,
                Mode::Eventually => {
                    let deadline = acknowledged
                        + expectation
                            .deadline(&self.timing)
                            .max(self.timing.settle);
                    self.poll(expectation, baseline, deadline).await?
                }
            }
            info!("Verified: {expectation}");
        }
        Ok(())
    }

    async fn check_once(
        &self,
        expectation: &Expectation,
        baseline: &Baseline,
    ) -> Result<(), ScenarioError> {
        match self.observe(&expectation.check, baseline).await? {
            Observation::Met => Ok(()),
            Observation::NotMet(last_observed) => Err(ScenarioError::VerificationTimeout {
                expectation: expectation.to_string(),
                last_observed,
            }),
        }
    }

    async fn poll(
        &self,
        expectation: &Expectation,
        baseline: &Baseline,
        deadline: Instant,
    ) -> Result<(), ScenarioError> {
        let mut backoff = ExponentialBackoff {
            current_interval: self.timing.poll_interval,
            initial_interval: self.timing.poll_interval,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_interval: self.timing.max_poll_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        loop {
            let last_observed = match self.observe(&expectation.check, baseline).await? {
                Observation::Met => return Ok(()),
                Observation::NotMet(last_observed) => last_observed,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(ScenarioError::VerificationTimeout {
                    expectation: expectation.to_string(),
                    last_observed,
                });
            }
            let delay = backoff
                .next_backoff()
                .unwrap_or(self.timing.max_poll_interval)
                .min(deadline - now);
            debug!("Not yet {expectation}: {last_observed}. Polling again in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }

    /// Evaluate a check once
    ///
    /// Missing resources and transient failures make the check unsatisfied for now,
    /// other platform errors are returned.
    pub async fn observe(
        &self,
        check: &Check,
        baseline: &Baseline,
    ) -> Result<Observation, ScenarioError> {
        let context_broker = &self.platform.context_broker_once;
        let iot_agent = &self.platform.iot_agent_once;

        match check {
            Check::AttributeValue {
                entity_id,
                entity_type,
                attr,
                expected,
                numeric,
            } => observing(
                context_broker
                    .get_entity(entity_id, entity_type.as_deref())
                    .await,
                |entity| assert_attribute_value(&entity, attr, expected, *numeric),
            ),

            Check::AttributeAbsent {
                entity_id,
                entity_type,
                attr,
            } => match context_broker
                .get_entity(entity_id, entity_type.as_deref())
                .await
            {
                Err(err) if err.is_not_found() => Ok(Observation::Met),
                outcome => observing(outcome, |entity| assert_attribute_absent(&entity, attr)),
            },

            Check::AttributeType {
                entity_id,
                entity_type,
                attr,
                expected_type,
            } => observing(
                context_broker
                    .get_entity(entity_id, entity_type.as_deref())
                    .await,
                |entity| assert_attribute_type(&entity, attr, expected_type),
            ),

            Check::AttributeMetadataPresent {
                entity_id,
                entity_type,
                attr,
            } => observing(
                context_broker
                    .get_entity(entity_id, entity_type.as_deref())
                    .await,
                |entity| assert_attribute_metadata_present(&entity, attr),
            ),

            Check::EntityExists {
                entity_id,
                entity_type,
                exists,
            } => observing(
                context_broker
                    .does_entity_exist(entity_id, entity_type.as_deref())
                    .await,
                |found| expect_existence("entity", entity_id, *exists, found),
            ),

            Check::EntityCount { query, expected } => observing(
                context_broker.get_entity_list(query).await,
                |entities| expect_count("entities", *expected, entities.len()),
            ),

            Check::DeviceCount { expected } => observing(
                iot_agent.get_device_list().await,
                |devices| expect_count("devices", *expected, devices.len()),
            ),

            Check::DeviceExists { device_id, exists } => observing(
                iot_agent.does_device_exist(device_id).await,
                |found| expect_existence("device", device_id, *exists, found),
            ),

            Check::Notification {
                topic,
                matcher,
                subscription,
            } => self.observe_notification(topic, matcher, *subscription, baseline),

            Check::TimeSeriesLength {
                entity_id,
                attr,
                last_n,
                expected,
            } => {
                let time_series = self
                    .platform
                    .time_series
                    .as_ref()
                    .ok_or(ScenarioError::NoTimeSeries)?;
                observing(
                    time_series
                        .get_attribute_series(entity_id, attr, *last_n)
                        .await,
                    |series| expect_count("values", *expected, series.len()),
                )
            }
        }
    }

    fn observe_notification(
        &self,
        topic: &str,
        matcher: &NotificationMatch,
        subscription: Option<usize>,
        baseline: &Baseline,
    ) -> Result<Observation, ScenarioError> {
        let mailbox = self
            .watched
            .mailbox(topic)
            .ok_or_else(|| ScenarioError::NotWatched {
                filter: topic.to_string(),
            })?;

        let (version, latest) = mailbox.snapshot();
        let message = match latest {
            Some(message) if version > baseline.version(topic) => message,
            _ => {
                return Ok(Observation::NotMet(format!(
                    "no notification on {topic} since the stimulus"
                )))
            }
        };
        let payload = match message.payload_str() {
            Ok(payload) => payload,
            Err(err) => return Ok(Observation::NotMet(err.to_string())),
        };

        if let Some(index) = subscription {
            let expected_id = self.subscription_ids.get(index).map(String::as_str);
            let sender = serde_json::from_str::<Value>(payload)
                .ok()
                .and_then(|envelope| {
                    envelope
                        .get("subscriptionId")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                });
            if let Some(sender) = sender {
                if Some(sender.as_str()) != expected_id {
                    return Ok(Observation::NotMet(format!(
                        "notification sent by subscription {sender}"
                    )));
                }
            }
        }

        Ok(matcher.check(payload).into())
    }
}

fn observing<T>(
    outcome: Result<T, PlatformError>,
    assertion: impl FnOnce(T) -> Result<(), Mismatch>,
) -> Result<Observation, ScenarioError> {
    match outcome {
        Ok(observed) => Ok(assertion(observed).into()),
        Err(err) => match err.kind() {
            ErrorKind::NotFound | ErrorKind::Transient => Ok(Observation::NotMet(err.to_string())),
            ErrorKind::Conflict | ErrorKind::Fatal => Err(err.into()),
        },
    }
}

fn expect_count(what: &str, expected: usize, observed: usize) -> Result<(), Mismatch> {
    if expected == observed {
        Ok(())
    } else {
        Err(Mismatch::new(
            format!("{expected} {what}"),
            format!("{observed} {what}"),
        ))
    }
}

fn expect_existence(what: &str, id: &str, expected: bool, found: bool) -> Result<(), Mismatch> {
    let describe = |exists: bool| {
        if exists {
            format!("{what} {id} exists")
        } else {
            format!("no {what} {id}")
        }
    };
    if expected == found {
        Ok(())
    } else {
        Err(Mismatch::new(describe(expected), describe(found)))
    }
}
