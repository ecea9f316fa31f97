//! dlqtail: A library for tailing segmented dead letter queues.
//!
//! This library provides components for reading length-prefixed,
//! CRC-checked records out of an append-only segment directory in strict
//! order, persisting a resume cursor, and following the live segment as it
//! grows, with at-least-once delivery to a pluggable consumer.
//!
//! # Example
//!
//! ```ignore
//! use dlqtail::{DlqTailer, TailerConfig, error::TailerError};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TailerError> {
//!     let mut tailer = DlqTailer::new(TailerConfig::new("/var/lib/dlq/main"));
//!     tailer.register().await?;
//!
//!     let (tx, mut rx) = mpsc::channel(64);
//!     let stop = tailer.stop_handle();
//!     tokio::spawn(async move {
//!         while let Some(entry) = rx.recv().await {
//!             println!("{}", entry.reason);
//!         }
//!         stop.stop();
//!     });
//!
//!     let mut consumer = tx;
//!     tailer.run(&mut consumer).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod consumer;
pub mod entry;
pub mod error;
pub mod filter;
pub mod reclaim;
pub mod segment;
pub mod signal;
pub mod sincedb;
pub mod tailer;
pub mod trace;
pub mod watch;

// Re-export main types
pub use config::TailerConfig;
pub use consumer::EntryConsumer;
pub use entry::DlqEntry;
pub use error::TailerError;
pub use signal::shutdown_signal;
pub use sincedb::Cursor;
pub use tailer::{DlqTailer, StopHandle, TailerState};
pub use trace::init_tracing;
