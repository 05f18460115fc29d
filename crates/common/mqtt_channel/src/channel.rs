use crate::ChannelError;
use crate::Config;
use crate::Mailbox;
use crate::MailboxSender;
use crate::Message;
use crate::ReconnectPolicy;
use crate::TopicFilter;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use rumqttc::AsyncClient;
use rumqttc::ConnectReturnCode;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::Outgoing;
use rumqttc::Packet;
use rumqttc::QoS;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// A channel used to publish stimuli and to observe the resulting events
///
/// Implemented by [Channel] over a real MQTT broker,
/// and by in-memory simulators for hermetic tests.
#[mockall::automock]
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Publish a message, returning only when the message has been acknowledged
    async fn publish(&self, message: Message) -> Result<(), ChannelError>;

    /// Subscribe to a topic filter, returning the mailbox where matching messages are delivered
    async fn subscribe(&self, filter: TopicFilter) -> Result<Mailbox, ChannelError>;
}

/// State of the connection to the broker as seen by the event loop
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected { reason: String },
    Refused { reason: String },
    Closed,
}

/// An MQTT connection maintained by a background event loop
///
/// The event loop reconnects on error with an exponential backoff
/// and restores all the subscriptions on each new connection.
/// The connection is closed on drop.
pub struct Channel {
    client: AsyncClient,
    host: String,
    port: u16,
    state: watch::Receiver<ConnectionState>,
    shared: Arc<Shared>,
    reconnect_deadline: Duration,
    event_loop: JoinHandle<()>,
}

/// State shared by the foreground and the event loop
#[derive(Default)]
struct Shared {
    routes: Mutex<Vec<MailboxSender>>,
    acks: Mutex<Acks>,
}

#[derive(Default)]
struct Acks {
    publish: AckTracker,
    subscribe: AckTracker,
}

/// Matches broker acknowledgements with the requests waiting for them
///
/// Requests are queued in the order they are handed to the client,
/// which is also the order the event loop sends them and learns their packet ids.
/// A packet sent again on a resumed session keeps its id: it is not a new request.
#[derive(Default)]
struct AckTracker {
    queued: VecDeque<oneshot::Sender<()>>,
    inflight: HashMap<u16, oneshot::Sender<()>>,
    unacknowledged: HashSet<u16>,
}

impl AckTracker {
    fn sent(&mut self, pkid: u16) {
        if self.unacknowledged.remove(&pkid) || self.inflight.contains_key(&pkid) {
            return;
        }
        if let Some(waiter) = self.queued.pop_front() {
            self.inflight.insert(pkid, waiter);
        }
    }

    fn acknowledged(&mut self, pkid: u16) {
        self.unacknowledged.remove(&pkid);
        if let Some(waiter) = self.inflight.remove(&pkid) {
            let _ = waiter.send(());
        }
    }

    /// Drop all the waiters, which then fail with `AckInterrupted`
    ///
    /// The ids of the packets in flight are kept till the next session,
    /// for the client to send these packets again if the session is resumed.
    fn interrupt(&mut self) {
        self.queued.clear();
        self.unacknowledged.extend(self.inflight.drain().map(|(pkid, _)| pkid));
    }

    /// A new session starts from scratch: the client drops the packets of the previous one
    fn new_session(&mut self) {
        self.unacknowledged.clear();
    }
}

impl Shared {
    fn routes(&self) -> MutexGuard<'_, Vec<MailboxSender>> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acks(&self) -> MutexGuard<'_, Acks> {
        self.acks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(&self, message: &Message) {
        let mut routes = self.routes();
        routes.retain(|route| !route.is_closed());
        let delivered = routes
            .iter()
            .filter(|route| route.deliver(message))
            .count();
        debug!(target: "MQTT", topic = %message.topic, delivered, "received message");
    }
}

impl Channel {
    /// Connect the broker, waiting for the connection to be acknowledged
    pub async fn connect(config: &Config) -> Result<Channel, ChannelError> {
        let mqtt_options = config.mqtt_options();
        let (client, event_loop) = AsyncClient::new(mqtt_options, config.queue_capacity);
        let (state_sender, state) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared::default());

        info!(target: "MQTT", host = %config.host, port = config.port, "connecting broker");
        let event_loop = tokio::spawn(run_event_loop(
            event_loop,
            client.clone(),
            shared.clone(),
            state_sender,
            config.reconnect,
        ));

        let channel = Channel {
            client,
            host: config.host.clone(),
            port: config.port,
            state,
            shared,
            reconnect_deadline: config.reconnect.deadline,
            event_loop,
        };

        match channel.wait_connected().await {
            Ok(()) => Ok(channel),
            Err(ChannelError::ReconnectTimeout { deadline }) => Err(ChannelError::ConnectTimeout {
                host: config.host.clone(),
                port: config.port,
                timeout: deadline,
            }),
            Err(err) => Err(err),
        }
    }

    /// The current state of the connection
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Wait till the connection is up, giving up after the reconnect deadline
    pub async fn wait_connected(&self) -> Result<(), ChannelError> {
        let mut state = self.state.clone();
        let deadline = self.reconnect_deadline;
        let outcome = tokio::time::timeout(
            deadline,
            state.wait_for(|state| {
                matches!(
                    state,
                    ConnectionState::Connected
                        | ConnectionState::Refused { .. }
                        | ConnectionState::Closed
                )
            }),
        )
        .await;

        match outcome {
            Err(_elapsed) => Err(ChannelError::ReconnectTimeout { deadline }),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Ok(Ok(state)) => match &*state {
                ConnectionState::Connected => Ok(()),
                ConnectionState::Refused { reason } => Err(ChannelError::ConnectionRefused {
                    host: self.host.clone(),
                    port: self.port,
                    reason: reason.clone(),
                }),
                _ => Err(ChannelError::Closed),
            },
        }
    }

    /// Publish a message with QoS 1, returning once acknowledged by the broker
    pub async fn publish(&self, message: Message) -> Result<(), ChannelError> {
        self.wait_connected().await?;

        let topic = message.topic.name;
        let acknowledged = {
            let mut acks = self.shared.acks();
            let (waiter, acknowledged) = oneshot::channel();
            self.client.try_publish(topic.clone(), QoS::AtLeastOnce, false, message.payload)?;
            acks.publish.queued.push_back(waiter);
            acknowledged
        };
        self.wait_ack("publish", acknowledged).await?;
        debug!(target: "MQTT", %topic, "published message");
        Ok(())
    }

    /// Subscribe to a topic filter
    ///
    /// The returned mailbox receives the messages published on the filter,
    /// including after a reconnection.
    pub async fn subscribe(&self, filter: TopicFilter) -> Result<Mailbox, ChannelError> {
        self.wait_connected().await?;

        let (sender, mailbox) = Mailbox::new(filter.clone());
        let acknowledged = {
            let mut acks = self.shared.acks();
            let (waiter, acknowledged) = oneshot::channel();
            self.client.try_subscribe(filter.pattern.clone(), QoS::AtLeastOnce)?;
            acks.subscribe.queued.push_back(waiter);
            self.shared.routes().push(sender);
            acknowledged
        };
        self.wait_ack("subscribe", acknowledged).await?;
        info!(target: "MQTT", %filter, "subscribed");
        Ok(mailbox)
    }

    /// Close the connection
    pub async fn disconnect(self) -> Result<(), ChannelError> {
        info!(target: "MQTT", host = %self.host, port = self.port, "disconnecting broker");
        if self.state() == ConnectionState::Connected {
            self.client.disconnect().await?;
            let mut state = self.state.clone();
            let _ = tokio::time::timeout(
                self.reconnect_deadline,
                state.wait_for(|state| *state == ConnectionState::Closed),
            )
            .await;
        }
        Ok(())
    }

    async fn wait_ack(
        &self,
        request: &'static str,
        acknowledged: oneshot::Receiver<()>,
    ) -> Result<(), ChannelError> {
        let timeout = self.reconnect_deadline;
        match tokio::time::timeout(timeout, acknowledged).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ChannelError::AckInterrupted { request }),
            Err(_elapsed) => Err(ChannelError::AckTimeout { request, timeout }),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

#[async_trait]
impl EventChannel for Channel {
    async fn publish(&self, message: Message) -> Result<(), ChannelError> {
        Channel::publish(self, message).await
    }

    async fn subscribe(&self, filter: TopicFilter) -> Result<Mailbox, ChannelError> {
        Channel::subscribe(self, filter).await
    }
}

fn reconnect_backoff(policy: ReconnectPolicy) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: policy.initial_interval,
        initial_interval: policy.initial_interval,
        max_interval: policy.max_interval,
        multiplier: policy.multiplier as f64,
        randomization_factor: 0.1,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    shared: Arc<Shared>,
    state: watch::Sender<ConnectionState>,
    policy: ReconnectPolicy,
) {
    let mut backoff = reconnect_backoff(policy);
    let mut connected_once = false;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    continue;
                }
                backoff.reset();
                if !ack.session_present {
                    shared.acks().publish.new_session();
                    shared.acks().subscribe.new_session();
                }
                if connected_once {
                    info!(target: "MQTT", "reconnected");
                    resubscribe(&client, &shared);
                }
                connected_once = true;
                state.send_replace(ConnectionState::Connected);
            }

            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.deliver(&publish.into());
            }

            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                shared.acks().publish.acknowledged(ack.pkid);
            }

            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                shared.acks().subscribe.acknowledged(ack.pkid);
            }

            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                shared.acks().publish.sent(pkid);
            }

            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                shared.acks().subscribe.sent(pkid);
            }

            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                break;
            }

            Ok(_) => {}

            Err(err) => {
                shared.acks().publish.interrupt();
                shared.acks().subscribe.interrupt();

                let reason = err.to_string();
                let refused = matches!(err, rumqttc::ConnectionError::ConnectionRefused(_));
                if refused {
                    warn!(target: "MQTT", "connection refused: {reason}");
                    state.send_replace(ConnectionState::Refused { reason });
                } else {
                    warn!(target: "MQTT", "connection error: {reason}");
                    state.send_replace(ConnectionState::Disconnected { reason });
                }

                let pause = backoff.next_backoff().unwrap_or(policy.max_interval);
                tokio::time::sleep(pause).await;
            }
        }
    }

    state.send_replace(ConnectionState::Closed);
    info!(target: "MQTT", "connection closed");
}

/// Restore the subscriptions of all the live mailboxes
fn resubscribe(client: &AsyncClient, shared: &Shared) {
    let filters: Vec<TopicFilter> = {
        let mut routes = shared.routes();
        routes.retain(|route| !route.is_closed());
        routes.iter().map(|route| route.filter().clone()).collect()
    };

    let mut acks = shared.acks();
    for filter in filters {
        // Nobody waits for these acknowledgements, but they must be tracked
        // to keep the packet ids aligned with the pending subscribe requests.
        let (waiter, _) = oneshot::channel();
        match client.try_subscribe(filter.pattern.clone(), QoS::AtLeastOnce) {
            Ok(()) => {
                acks.subscribe.queued.push_back(waiter);
                debug!(target: "MQTT", %filter, "resubscribed");
            }
            Err(err) => warn!(target: "MQTT", %filter, "fail to resubscribe: {err}"),
        }
    }
}
