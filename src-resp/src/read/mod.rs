//! RESP text parsing: line cursor, blockette decoders and channel assembly.

mod blockettes;
mod channel;
mod cursor;

// Re-export the reading entry points
pub use channel::ChannelReader;
pub use channel::parse_channel;
pub use channel::parse_channels;
pub use channel::parse_clock;
pub use channel::parse_resp_time;
