//! Error types for typemq.

use std::io;

use thiserror::Error;

/// Main error type for typemq.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),
}

/// MQTT protocol errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid remaining length encoding")]
    InvalidRemainingLength,

    #[error("Incomplete packet: need {needed} bytes, have {have}")]
    IncompletePacket { needed: usize, have: usize },

    #[error("Invalid protocol name: expected 'MQTT', got '{0}'")]
    InvalidProtocolName(String),

    #[error("Invalid connect flags: {0:#04x}")]
    InvalidConnectFlags(u8),

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Packet of {size} bytes exceeds limit of {limit}")]
    PacketTooLarge { size: usize, limit: usize },

    #[error("First packet must be CONNECT")]
    FirstPacketNotConnect,
}

pub type Result<T> = std::result::Result<T, Error>;
