pub mod alert;
pub mod message;
pub mod state;
pub mod transcript;
