use std::time::Duration;

use crate::channel::{OwnedPermit, SendError, SendTimeoutError, Sender, TrySendError};
use crate::metrics::{Counter, Gauge};

pub struct ChannelSender<T>
where
    T: Send,
{
    name: String,
    sender: Sender<T>,

    size: Gauge,
    counter: Counter,
}

impl<T> Clone for ChannelSender<T>
where
    T: Send,
{
    fn clone(&self) -> Self {
        ChannelSender {
            name: self.name.clone(),
            sender: self.sender.clone(),
            size: self.size.clone(),
            counter: self.counter.clone(),
        }
    }
}

impl<T> ChannelSender<T>
where
    T: Send,
{
    pub fn new(name: &str, sender: Sender<T>, size: Gauge, counter: Counter) -> Self {
        ChannelSender {
            name: name.to_string(),
            sender,
            size,
            counter,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    fn on_success(&self) {
        self.size.fetch_add(1 as i64);
        self.counter.fetch_add(1 as u64);
    }

    pub async fn send(&self, event: T) -> Result<(), SendError<T>> {
        self.sender.send(event).await.map(|r| {
            self.on_success();
            r
        })
    }

    pub async fn send_timeout(&self, event: T, timeout: Duration) -> Result<(), SendTimeoutError<T>> {
        self.sender.send_timeout(event, timeout).await.map(|r| {
            self.on_success();
            r
        })
    }

    pub fn try_send(&self, event: T) -> Result<(), TrySendError<T>> {
        self.sender.try_send(event).map(|r| {
            self.on_success();
            r
        })
    }

    #[inline]
    pub fn try_send_opt(&self, event: T) -> Option<T> {
        match self.try_send(event) {
            Ok(_) => None,
            Err(TrySendError::Full(t)) => Some(t),
            Err(TrySendError::Closed(t)) => Some(t),
        }
    }

    /// Wait for a free slot without giving up an event, the slot is released if the future
    /// is dropped before it completes.
    pub async fn reserve_owned(self) -> Result<ChannelPermit<T>, SendError<()>> {
        let permit = self
            .sender
            .reserve_owned()
            .await
            .map_err(|_e| tokio::sync::mpsc::error::SendError(()))?;
        Ok(ChannelPermit {
            permit,
            size: self.size,
            counter: self.counter,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A reserved slot of a `ChannelSender`.
pub struct ChannelPermit<T>
where
    T: Send,
{
    permit: OwnedPermit<T>,
    size: Gauge,
    counter: Counter,
}

impl<T> ChannelPermit<T>
where
    T: Send,
{
    pub fn send(self, event: T) {
        self.permit.send(event);
        self.size.fetch_add(1 as i64);
        self.counter.fetch_add(1 as u64);
    }
}
