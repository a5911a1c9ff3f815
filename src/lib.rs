//! Blockstream: streaming content reconstruction.
//!
//! Consumes a push stream of incremental frames (text chunks, reasoning,
//! tool invocations and their results, completion and error signals) and
//! rebuilds an ordered sequence of content blocks. Handles reconnects with
//! exponential backoff, pairs tool results with invocations in either
//! arrival order, and coalesces bursts of changes into one published update
//! per tick.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use blockstream::prelude::*;
//!
//! # async fn example() -> blockstream::error::Result<()> {
//! let config = EngineConfig::builder()
//!     .base_url("http://localhost:8080/api".to_string())
//!     .build();
//! let transport = SseTransport::from_config(&config)?;
//! let engine = StreamEngine::new(config, Arc::new(transport));
//!
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! engine
//!     .start(StreamTarget::new("msg-1").in_conversation("conv-7"), move |done| {
//!         let _ = tx.send(done);
//!     })
//!     .await?;
//!
//! if let Ok(done) = rx.await {
//!     println!("{} blocks, error = {}", done.blocks.len(), done.is_error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod scheduler;
pub mod session;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{BlockstreamError, Result};
