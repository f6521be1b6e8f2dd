//! OSC transport: wire codec plus UDP sender and receiver.

pub mod codec;
pub mod receiver;
pub mod sender;

pub use codec::{Channel, Codec, WireMessage, DEFAULT_NAMESPACE};
pub use receiver::{Receiver, ReceiverConfig, DEFAULT_TIMEOUT_TICKS};
pub use sender::{Sender, DEFAULT_HEARTBEAT_SECS};
