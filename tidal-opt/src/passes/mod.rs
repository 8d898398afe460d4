//! Passes implemented in this library.
mod handshake_to_firrtl;

pub use handshake_to_firrtl::HandshakeToFirrtl;
