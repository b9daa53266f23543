//! This module exports a minimal message-passing API, encapsulated by the
//! `Communicator` trait. Implementors write `send`, `recv`, and
//! `requeue_recv` for a given transport; an in-process group over channels
//! and a pure-Rust TCP transport are included.
//!

mod backoff;
pub mod comm;
pub mod local;
pub mod tcp;

pub use comm::Communicator;
pub use local::LocalCommunicator;
pub use tcp::TcpCommunicator;
