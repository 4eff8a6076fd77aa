pub mod coordinator;
pub mod state;
