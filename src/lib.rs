//! typemq - a schema-aware MQTT 3.1.1 broker.
//!
//! QoS 0 pub/sub over a single-threaded mio event loop, with a Protobuf-like
//! schema registry, topic-to-type bindings, and a service discovery channel
//! on reserved `$SYS` topics.

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod packet;
pub mod proto;
pub mod registry;
pub mod server;
pub mod session;
pub mod subscription;

pub use error::{Error, ProtocolError, Result};
