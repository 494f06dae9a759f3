pub mod attachment;
pub mod auth;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod model;
pub mod storage;

#[cfg(test)]
mod test_server;
