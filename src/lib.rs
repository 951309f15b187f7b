pub mod actor;
pub mod api;
pub mod conversation;
pub mod directory;
pub mod fanout;
pub mod integration;
pub mod message;
pub mod state;
