pub mod channel_sink;
pub mod sink;
