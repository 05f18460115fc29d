use crate::client::RawClient;
use once_cell::sync::Lazy;
use rumqttd::Broker;
use rumqttd::Config;
use rumqttd::ConnectionSettings;
use rumqttd::RouterConfig;
use rumqttd::ServerSettings;
use std::collections::HashMap;
use std::net::TcpListener;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

static BROKER: Lazy<TestBroker> = Lazy::new(TestBroker::start);

/// The broker shared by all the tests of a process
pub fn test_mqtt_broker() -> &'static TestBroker {
    Lazy::force(&BROKER)
}

pub struct TestBroker {
    pub port: u16,
}

impl TestBroker {
    fn start() -> TestBroker {
        TestBroker {
            port: spawn_broker(),
        }
    }

    /// The url of the broker, as expected by the platform configuration
    pub fn url(&self) -> String {
        format!("mqtt://127.0.0.1:{}", self.port)
    }

    /// Publish a message with QoS 1, returning once acknowledged
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), anyhow::Error> {
        RawClient::connect(self.port).publish(topic, payload).await
    }

    /// The payloads of the messages received from now on a topic filter
    ///
    /// Errors are returned as messages prefixed by `Error:`.
    pub async fn messages_published_on(&self, filter: &str) -> UnboundedReceiver<String> {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();

        // The broker may still be starting
        let mut client = RawClient::connect(self.port);
        if client.subscribe(filter).await.is_err() {
            tokio::time::sleep(Duration::from_millis(500)).await;
            client = RawClient::connect(self.port);
            if let Err(err) = client.subscribe(filter).await {
                let _ = sender.send(format!("Error: {err:?}"));
                return receiver;
            }
        }

        tokio::spawn(client.forward(sender));
        receiver
    }
}

fn spawn_broker() -> u16 {
    // A port freed by the kernel can be taken by another test before the broker binds it:
    // retry on a new port till the broker is up.
    loop {
        let port = match TcpListener::bind("127.0.0.1:0").and_then(|l| l.local_addr()) {
            Ok(addr) => addr.port(),
            Err(err) => panic!("MQTT-TEST: no free port for the test broker: {err}"),
        };

        let mut broker = Broker::new(broker_config(port));
        // `start()` blocks, so a bind failure is only seen when the thread ends early
        let broker_thread = std::thread::spawn(move || broker.start());
        std::thread::sleep(Duration::from_millis(50));
        if !broker_thread.is_finished() {
            eprintln!("MQTT-TEST: test broker listening on port {port}");
            return port;
        }

        match broker_thread.join() {
            Ok(Ok(())) => eprintln!("MQTT-TEST: the test broker stopped"),
            Ok(Err(err)) => eprintln!("MQTT-TEST: the test broker failed to start: {err:?}"),
            Err(_) => eprintln!("MQTT-TEST: the test broker panicked"),
        }
    }
}

fn broker_config(port: u16) -> Config {
    let connections = ConnectionSettings {
        connection_timeout_ms: 1000,
        max_payload_size: 268435455,
        max_inflight_count: 200,
        auth: None,
        dynamic_filters: false,
        external_auth: None,
    };
    let server = ServerSettings {
        name: port.to_string(),
        listen: ([127, 0, 0, 1], port).into(),
        tls: None,
        next_connection_delay_ms: 1,
        connections,
    };

    Config {
        id: 0,
        router: RouterConfig {
            max_segment_size: 10240,
            max_segment_count: 10,
            max_connections: 100,
            initialized_filters: None,
            ..Default::default()
        },
        cluster: None,
        console: None,
        v4: Some(HashMap::from([("1".to_string(), server)])),
        ws: None,
        v5: None,
        bridge: None,
        prometheus: None,
        metrics: None,
    }
}
