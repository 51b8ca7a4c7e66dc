//! gRPC control surface
//!
//! This module provides:
//! - The `BpfRecorder` service implementation served on a unix socket
//! - `dial` for clients talking to a running recorder

pub mod client;
pub mod server;

// Include the generated proto code
pub mod api {
    tonic::include_proto!("bpfrecorder");
}

pub use client::{dial, DialError};
pub use server::{prepare_socket, serve, RecorderService};
