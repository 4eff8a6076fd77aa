pub mod collision_writer;
pub mod fetch_task;
