use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;

/// Check that the given payloads are received in order, each within the timeout
pub async fn assert_received<T>(
    messages: &mut UnboundedReceiver<String>,
    timeout: Duration,
    expected: T,
) where
    T: IntoIterator,
    T::Item: ToString,
{
    for expected in expected {
        let received = tokio::time::timeout(timeout, messages.recv()).await;
        assert_eq!(received, Ok(Some(expected.to_string())));
    }
}

/// An MQTT connection whose event loop is polled by the caller
pub(crate) struct RawClient {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl RawClient {
    pub fn connect(port: u16) -> RawClient {
        let id: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(10)
            .collect();
        let mut options = MqttOptions::new(format!("test-{id}"), "127.0.0.1", port);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 10);
        RawClient { client, eventloop }
    }

    pub async fn subscribe(&mut self, filter: &str) -> Result<(), anyhow::Error> {
        self.client.subscribe(filter, QoS::AtLeastOnce).await?;
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::SubAck(_)) => return Ok(()),
                _ => continue,
            }
        }
    }

    pub async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), anyhow::Error> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::PubAck(_)) => return Ok(()),
                _ => continue,
            }
        }
    }

    /// Forward the payloads of the received messages till the receiver is dropped
    pub async fn forward(mut self, sender: UnboundedSender<String>) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(message))) => {
                    let payload = String::from_utf8_lossy(&message.payload).to_string();
                    if sender.send(payload).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    let _ = sender.send(format!("Error: {err:?}"));
                    break;
                }
            }
        }
        let _ = self.client.disconnect().await;
    }
}
