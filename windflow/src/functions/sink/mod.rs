pub mod channel_sink;
pub mod print;

pub use channel_sink::{channel_sink, ChannelSink};
pub use print::{print_sink, PrintSink};
