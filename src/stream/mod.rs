//! Server-Sent Events streaming: connection loop, frames and the HTTP
//! endpoint.

pub mod connection;
pub mod frames;
pub mod handler;

pub use connection::{ConnectionHandler, ConnectionState, FrameSender};
pub use frames::StreamFrame;
