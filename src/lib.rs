#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Allowed pedantic lints for existing codebase compatibility
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::uninlined_format_args)]
//! # Warren — asynchronous message-queue client
//!
//! A client library for message-queue servers with per-message
//! time-to-live and visibility-delay attributes. Operations are submitted
//! to a pluggable [`Backend`] (named at build time; `"memory"` and
//! `"http"` ship in-tree) and results come back through handler slots
//! registered on the [`Client`] — a message handler, queue- and
//! account-list handlers, a log handler, and a completion handler fired
//! exactly once per accepted command.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warren::{Client, ClientOptions, MessageAttributes};
//!
//! # #[tokio::main]
//! # async fn main() -> warren::Result<()> {
//! let mut client = Client::builder()
//!     .backend("memory")
//!     .options(ClientOptions::AUTOPROCESS)
//!     .build()?;
//!
//! client.on_message(|message| {
//!     println!("{}: {} bytes", message.id, message.body.len());
//! });
//! client.on_complete(|| println!("complete"));
//!
//! // Store a message that stays invisible to batch readers for a minute.
//! let attrs = MessageAttributes::new().with_ttl(300).with_hide(60);
//! client
//!     .create_message("acct", "jobs", "m1", b"payload".to_vec())
//!     .attributes(&attrs)
//!     .await?;
//!
//! // Fetch it by id; with AUTOPROCESS set the handlers have already
//! // fired when this call returns.
//! client.get_message("acct", "jobs", "m1").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Without [`ClientOptions::AUTOPROCESS`], submissions queue up and
//! nothing is delivered until [`Client::process`] drains the backend.

pub mod allocator;
pub mod attributes;
pub mod backend;
pub mod client;
pub mod command;
pub mod delivery;
pub mod errors;
pub mod filters;
pub mod message;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use allocator::{AllocationError, Allocator, DefaultAllocator, QuotaAllocator};
pub use attributes::{AttributeSet, AttributesId, ChargedAttributes, MessageAttributes};
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use backend::HttpBackend;
pub use backend::{Backend, BackendConfig, BackendFactory, BackendRegistry, MemoryBackend};
pub use client::{
    Client, ClientBuilder, ClientOptions, CreateRequest, QueryRequest, UpdateRequest,
};
pub use command::Command;
pub use delivery::{Delivery, Verbosity};
pub use errors::{Result, WarrenError};
pub use filters::MessageFilters;
pub use message::Message;

/// The wire-protocol version the HTTP backend speaks.
pub const PROTOCOL_VERSION: &str = "v1.0";
