//! Client for the student assistant's streaming chat.
//!
//! Frames flow `ChatClient::send_message` → [`codec::encode`] →
//! [`Transport`] → server, and back through [`codec::decode`] into the
//! [`StreamingSession`] of the active chat, whose changes reach the UI via
//! [`ChatClient::subscribe`].

pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use api::{ChatDirectory, HttpDirectory};
pub use client::ChatClient;
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::{ClientError, DecodeError};
pub use models::{ConversationMessage, Envelope, Role};
pub use session::{StreamingSession, TranscriptEvent};
pub use transport::{Channel, Connector, Transport, WsConnector};

/// Locks a mutex, carrying on with the data if a handler panicked under it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
