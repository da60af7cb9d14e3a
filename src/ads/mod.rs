pub mod forms;
pub mod store;
