use crate::Message;
use crate::TopicFilter;
use std::time::Duration;
use tokio::sync::watch;

/// The content of a mailbox: the last accepted message and how many messages were accepted so far
#[derive(Debug, Clone, Default)]
struct Slot {
    version: u64,
    message: Option<Message>,
}

/// A single-slot mailbox holding the last message received on a topic filter
///
/// The topic and the payload of a message are always updated and read as a single value.
/// Older messages are overwritten: a mailbox only tells what has been last observed.
#[derive(Debug, Clone)]
pub struct Mailbox {
    filter: TopicFilter,
    slot: watch::Receiver<Slot>,
}

/// The writing side of a [Mailbox]
#[derive(Debug)]
pub struct MailboxSender {
    filter: TopicFilter,
    slot: watch::Sender<Slot>,
}

/// The outcome of a wait on a mailbox that didn't observe the expected message
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WaitError {
    /// No matching message within the timeout; holds the last message observed if any
    Timeout { last: Option<Message> },

    /// The sender side has been dropped
    Closed { last: Option<Message> },
}

impl WaitError {
    pub fn last_observed(&self) -> Option<&Message> {
        match self {
            WaitError::Timeout { last } | WaitError::Closed { last } => last.as_ref(),
        }
    }
}

impl Mailbox {
    /// Create a new mailbox along with the sender used to feed it
    pub fn new(filter: TopicFilter) -> (MailboxSender, Mailbox) {
        let (sender, receiver) = watch::channel(Slot::default());
        let sender = MailboxSender {
            filter: filter.clone(),
            slot: sender,
        };
        let mailbox = Mailbox {
            filter,
            slot: receiver,
        };
        (sender, mailbox)
    }

    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// The last message delivered to this mailbox
    pub fn latest(&self) -> Option<Message> {
        self.slot.borrow().message.clone()
    }

    /// The number of messages delivered so far
    pub fn version(&self) -> u64 {
        self.slot.borrow().version
    }

    /// The last message delivered along with its version, read as a single value
    pub fn snapshot(&self) -> (u64, Option<Message>) {
        let slot = self.slot.borrow();
        (slot.version, slot.message.clone())
    }

    /// Wait for a message satisfying the predicate
    ///
    /// The message already in the slot is checked first.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Result<Message, WaitError>
    where
        F: Fn(&Message) -> bool,
    {
        let mut slot = self.slot.clone();
        let outcome = tokio::time::timeout(
            timeout,
            slot.wait_for(|slot| slot.message.as_ref().is_some_and(&predicate)),
        )
        .await;

        match outcome {
            Ok(Ok(slot)) => match slot.message.clone() {
                Some(message) => Ok(message),
                None => Err(WaitError::Closed { last: None }),
            },
            Ok(Err(_)) => Err(WaitError::Closed {
                last: self.latest(),
            }),
            Err(_elapsed) => Err(WaitError::Timeout {
                last: self.latest(),
            }),
        }
    }

    /// Wait for a message delivered after the given version
    pub async fn next_after(&self, version: u64, timeout: Duration) -> Result<Message, WaitError> {
        let mut slot = self.slot.clone();
        let outcome = tokio::time::timeout(
            timeout,
            slot.wait_for(|slot| slot.version > version && slot.message.is_some()),
        )
        .await;

        match outcome {
            Ok(Ok(slot)) => match slot.message.clone() {
                Some(message) => Ok(message),
                None => Err(WaitError::Closed { last: None }),
            },
            Ok(Err(_)) => Err(WaitError::Closed {
                last: self.latest(),
            }),
            Err(_elapsed) => Err(WaitError::Timeout {
                last: self.latest(),
            }),
        }
    }
}

impl MailboxSender {
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// Store the message if it matches the filter of the mailbox
    ///
    /// Return `true` if the message has been accepted.
    pub fn deliver(&self, message: &Message) -> bool {
        if !self.filter.accept(message) {
            return false;
        }
        self.slot.send_modify(|slot| {
            slot.version += 1;
            slot.message = Some(message.clone());
        });
        true
    }

    /// `true` when all the mailboxes fed by this sender have been dropped
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}
