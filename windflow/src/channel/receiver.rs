use crate::channel::{Receiver, TryRecvError};
use crate::metrics::{Counter, Gauge};

pub struct ChannelReceiver<T> {
    name: String,
    receiver: Receiver<T>,
    size: Gauge,
    drain_counter: Counter,
}

impl<T> ChannelReceiver<T> {
    pub fn new(name: &str, receiver: Receiver<T>, size: Gauge, drain_counter: Counter) -> Self {
        ChannelReceiver {
            name: name.to_string(),
            receiver,
            size,
            drain_counter,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    fn on_success(&self) {
        self.size.fetch_sub(1 as i64);
        self.drain_counter.fetch_add(1 as u64);
    }

    pub async fn recv(&mut self) -> Option<T> {
        let event = self.receiver.recv().await;
        if event.is_some() {
            self.on_success();
        }
        event
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.receiver.try_recv().map(|event| {
            self.on_success();
            event
        })
    }

    /// Stop accepting new messages, the buffered ones can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
