pub mod client;
pub mod logging;
#[cfg(test)]
pub mod mock_client;
pub mod stream;

pub use client::{ApiClient, ByteStream, StreamSource, StreamTarget};
pub use stream::SseDecoder;
