use std::net::Ipv4Addr;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A TCP relay to a broker, which can be cut to simulate a network failure
///
/// While cut, the established connections are dropped and new ones are closed as soon as accepted.
pub struct BrokerLink {
    pub port: u16,
    up: watch::Sender<bool>,
    relay: JoinHandle<()>,
}

impl BrokerLink {
    /// Start relaying the connections to the broker listening on `broker_port`
    pub async fn start(broker_port: u16) -> Result<BrokerLink, anyhow::Error> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let port = listener.local_addr()?.port();
        let (up, _) = watch::channel(true);
        let relay = tokio::spawn(relay(listener, broker_port, up.clone()));
        Ok(BrokerLink { port, up, relay })
    }

    /// Drop all the connections and refuse new ones
    pub fn cut(&self) {
        self.up.send_replace(false);
    }

    /// Accept connections again
    pub fn restore(&self) {
        self.up.send_replace(true);
    }
}

impl Drop for BrokerLink {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

async fn relay(listener: TcpListener, broker_port: u16, up: watch::Sender<bool>) {
    loop {
        let Ok((mut client, _)) = listener.accept().await else {
            continue;
        };
        if !*up.borrow() {
            drop(client);
            continue;
        }

        let mut state = up.subscribe();
        tokio::spawn(async move {
            let Ok(mut broker) = TcpStream::connect((Ipv4Addr::LOCALHOST, broker_port)).await
            else {
                return;
            };
            tokio::select! {
                _ = tokio::io::copy_bidirectional(&mut client, &mut broker) => {}
                _ = state.wait_for(|up| !*up) => {}
            }
        });
    }
}
