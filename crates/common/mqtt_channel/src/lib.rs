//! An MQTT channel used to stimulate a platform and to observe its notifications.
//!
//! ```no_run
//! use mqtt_channel::{Channel, ChannelError, Config, Message, Topic, TopicFilter};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ChannelError> {
//!     let config = Config::from_url("mqtt://localhost:1883")?;
//!     let channel = Channel::connect(&config).await?;
//!
//!     // Messages received on a filter are kept in a single-slot mailbox
//!     let mailbox = channel.subscribe(TopicFilter::new("notifications/#")?).await?;
//!
//!     // Publishing returns once the broker acknowledged the message
//!     let topic = Topic::new("/json/apikey/device1/attrs")?;
//!     channel.publish(Message::new(&topic, r#"{"a1": 15}"#)).await?;
//!
//!     if let Ok(message) = mailbox.wait_for(Duration::from_secs(10), |_| true).await {
//!         println!("{}", message.payload_str()?);
//!     }
//!
//!     channel.disconnect().await
//! }
//! ```
#![forbid(unsafe_code)]

mod channel;
mod config;
mod errors;
mod mailbox;
mod messages;
mod topics;


pub use channel::*;
pub use config::*;
pub use errors::*;
pub use mailbox::*;
pub use messages::*;
pub use topics::*;
