use alloc::string::String;

use crate::{
    codec::{DecodeError, EncodeError},
    prefix::PrefixError,
    suite::Suite,
};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("bad name: {0}")]
    Prefix(#[from] PrefixError),
    #[error("content store is full of static entries")]
    CacheFull,
    #[error("transmit queue of interface {0} is full")]
    QueueFull(usize),
    #[error("no such face")]
    NoSuchFace,
    #[error("the local face has no transmit queue")]
    LocalFace,
    #[error("no such interface: {0}")]
    NoSuchInterface(usize),
    #[error("interface table is full")]
    TooManyInterfaces,
    #[error("prefix is {prefix}, rule is for {rule}")]
    SuiteMismatch { prefix: Suite, rule: Suite },
    #[error("suite {0} is not supported")]
    Unsupported(Suite),
    #[error("platform could not arm a timer")]
    TimerUnavailable,
    #[cfg(feature = "std")]
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad configuration: {0}")]
    Config(String),
}
