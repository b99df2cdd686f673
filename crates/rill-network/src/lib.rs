//! # rill-network — command-framed TCP gossip protocol.
//!
//! A deliberately simple peer model: no handshake beyond `version`, no
//! encryption, no heartbeats. Each connection carries exactly one message;
//! [`node::NodeState`] dispatches the nine protocol steps and the mining
//! loop that reacts to them.

pub mod error;
pub mod node;
pub mod protocol;

pub use error::NetworkError;
pub use node::NodeState;
pub use protocol::Message;
