pub mod client;
pub mod consumer;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{ByteStream, HistoryClient, HttpTransport, StreamResponse, StreamTransport};
pub use consumer::{
    ChannelHandler, ConsumerUpdate, StreamConsumer, StreamHandle, StreamHandler, StreamOutcome,
};
pub use stream::{encode_frame, FrameDecoder, WireFormat, MAX_FRAME_LEN};
