pub mod batch;
pub mod downloader;
pub mod status;
pub mod types;
pub mod validator;

pub use batch::coordinator::BatchCoordinator;
pub use batch::state::{BatchPhase, BatchSnapshot};
pub use status::channel_sink::{ChannelStatusSink, StatusUpdate};
pub use status::sink::StatusSink;
pub use types::types::{BatchError, BatchReceipt, FetchConfig, FetchError, TaskOutcome, TaskReport};
