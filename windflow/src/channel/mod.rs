use crate::channel::receiver::ChannelReceiver;
use crate::channel::sender::ChannelSender;
use crate::metrics::{MetricRegistry, Tag};

pub const CHANNEL_SIZE_PREFIX: &str = "Channel.Size.";
pub const CHANNEL_ACCEPTED_PREFIX: &str = "Channel.Accepted.";
pub const CHANNEL_DRAIN_PREFIX: &str = "Channel.Drain.";

pub type TrySendError<T> = tokio::sync::mpsc::error::TrySendError<T>;
pub type TryRecvError = tokio::sync::mpsc::error::TryRecvError;
pub type SendTimeoutError<T> = tokio::sync::mpsc::error::SendTimeoutError<T>;
pub type SendError<T> = tokio::sync::mpsc::error::SendError<T>;
pub type OwnedPermit<T> = tokio::sync::mpsc::OwnedPermit<T>;

pub type Receiver<T> = tokio::sync::mpsc::Receiver<T>;
pub type Sender<T> = tokio::sync::mpsc::Sender<T>;

pub mod receiver;
pub mod sender;

pub fn bounded<T>(cap: usize) -> (Sender<T>, Receiver<T>) {
    tokio::sync::mpsc::channel(cap)
}

/// A bounded channel whose depth and throughput are tracked in `registry`.
pub fn named_channel<T>(
    name: &str,
    tags: Vec<Tag>,
    cap: usize,
    registry: &MetricRegistry,
) -> (ChannelSender<T>, ChannelReceiver<T>)
where
    T: Send,
{
    debug!("Create channel named with {}, capacity: {}", name, cap);

    let (sender, receiver) = bounded(cap);

    let size = registry.register_gauge(CHANNEL_SIZE_PREFIX.to_owned() + name, tags.clone());
    let accepted_counter =
        registry.register_counter(CHANNEL_ACCEPTED_PREFIX.to_owned() + name, tags.clone());
    let drain_counter = registry.register_counter(CHANNEL_DRAIN_PREFIX.to_owned() + name, tags);

    (
        ChannelSender::new(name, sender, size.clone(), accepted_counter),
        ChannelReceiver::new(name, receiver, size, drain_counter),
    )
}
