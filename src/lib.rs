//#![warn(missing_docs)]

#![cfg_attr(not(feature = "std"), no_std)]
extern crate alloc;

pub mod timestamp;

pub mod hash;

pub mod suite;

pub mod prefix;

pub mod matching;

pub mod packet;

pub mod codec;

pub mod tables;

pub mod face;

pub mod platform;

pub mod config;

pub mod error;

#[macro_use]
pub mod relay;

mod ageing;
mod forwarder;
mod transmit;

pub use config::RelayConfig;
pub use error::RelayError;
pub use face::{FaceAddress, FaceFlags};
pub use platform::{Platform, TimerEvent};
pub use prefix::Prefix;
pub use relay::Relay;
pub use suite::Suite;
pub use tables::{FaceToken, FibDestination};
