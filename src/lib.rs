//! Reader for Xiaomi LYWSD03MMC temperature and humidity sensors.
//!
//! The protocol side (decoders, start time inference, history replay) only
//! talks to a [`transport::Transport`]; [`ble`] and [`hub`] plug it into
//! `btleplug`.

pub mod battery;
pub mod ble;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod decode;
pub mod error;
pub mod history;
pub mod hub;
pub mod identity;
pub mod message;
#[cfg(test)]
mod mock;
pub mod session;
pub mod sink;
pub mod transport;

pub use error::{DecodeError, Error, Result};
