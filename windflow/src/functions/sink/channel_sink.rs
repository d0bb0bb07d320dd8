use tokio::sync::mpsc::{Receiver, Sender};

use crate::core::element::ProcessingResult;
use crate::core::function::{NamedFunction, Sink};

/// A sink handing results to an in-process receiver. `emit` fails once the receiver is gone.
pub fn channel_sink(cap: usize) -> (ChannelSink, Receiver<ProcessingResult>) {
    let (sender, receiver) = tokio::sync::mpsc::channel(cap);
    (ChannelSink { sender }, receiver)
}

pub struct ChannelSink {
    sender: Sender<ProcessingResult>,
}

#[async_trait]
impl Sink for ChannelSink {
    async fn emit(&self, result: &ProcessingResult) -> anyhow::Result<()> {
        self.sender
            .send(result.clone())
            .await
            .map_err(|_e| anyhow!("result receiver closed"))
    }
}

impl NamedFunction for ChannelSink {
    fn name(&self) -> &str {
        "ChannelSink"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::core::element::ProcessingResult;
    use crate::core::function::Sink;
    use crate::core::window::{Window, WindowType};
    use crate::functions::sink::channel_sink;

    #[tokio::test]
    pub async fn channel_sink_test() {
        let (sink, mut receiver) = channel_sink(4);
        let window = Window::new("k", WindowType::Tumbling, 0, 10);
        let result = ProcessingResult::new(&window, json!(1), 1, 5, 0);

        sink.emit(&result).await.unwrap();
        assert_eq!(receiver.recv().await, Some(result.clone()));

        drop(receiver);
        assert!(sink.emit(&result).await.is_err());
    }
}
