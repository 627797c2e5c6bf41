//! Chat transports and message dispatch.
//!
//! Provides the [`Channel`] trait, the Telegram long-polling adapter, and the
//! [`Dispatcher`] that turns inbound chat messages into session operations.
//!
//! # Main types
//!
//! - [`Channel`]: Trait for delivering messages on a platform.
//! - [`TelegramChannel`]: Telegram Bot API adapter.
//! - [`Command`]: Parsed form of an inbound message.
//! - [`Dispatcher`]: Routes commands to the [`chatrelay_session::SessionManager`].

/// Core channel trait and message types.
pub mod channel;
/// Inbound command parsing.
pub mod command;
/// Command routing and reply rendering.
pub mod dispatcher;
/// Telegram channel integration.
pub mod telegram;

pub use channel::{Channel, ChannelEvent, ChannelMessage};
pub use command::Command;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use telegram::TelegramChannel;
