//! HTTP Request Pipeline over a Kernel-Mode Listener
//!
//! The listener owns connections, TLS, and HTTP/1.x parsing. This crate receives the raw
//! request blobs it produces, exposes them as [`Request`]s, and turns [`Response`] writes into
//! listener send calls with the correct body framing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use khttp::{Options, Server, native::MemoryTransport};
//!
//! # async fn app() -> Result<(), khttp::Error> {
//! let server = Server::new(Arc::new(MemoryTransport::new()), Options::default());
//! server
//!     .serve(|mut ctx| async move {
//!         let _ = ctx.response_mut().body().write(b"Hello World!").await;
//!         ctx
//!     })
//!     .await
//! # }
//! ```
//!
//! [`Request`]: request::Request
//! [`Response`]: response::Response
#![warn(missing_debug_implementations)]

mod log;

pub mod http;
pub mod headers;
pub mod uri;
pub mod native;
pub mod cancel;
pub mod io;
pub mod request;
pub mod response;
pub mod context;

mod error;
mod options;
mod server;

#[cfg(test)]
mod harness;

pub use error::{Error, UsageError};
pub use options::{AuthenticationChallenge, Options};
pub use server::Server;
pub use context::RequestContext;
pub use io::{Readable, Writable};
