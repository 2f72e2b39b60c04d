//! Data models for the resolink client library.
//!
//! Wire shapes for the create-and-subscribe HTTP response and the broadcast
//! change messages, plus connection-level configuration.

pub mod change_kind;
pub mod change_message;
pub mod connection_options;
pub mod reactive_response;

pub use change_kind::ChangeKind;
pub use change_message::ChangeMessage;
pub use connection_options::ConnectionOptions;
pub use reactive_response::{CreateSubscriptionResult, ReactiveResponse};
