//! In-process storage. Everything lives for the lifetime of the server.

pub mod chat_repository;
pub mod message_repository;
