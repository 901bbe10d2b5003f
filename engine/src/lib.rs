//! # docsort engine - durable batch document mover
//!
//! A headless library that moves batches of documents into named destination
//! folders without ever losing a file. Designed as the foundation for multiple
//! front ends (the `docsort` CLI, automation).
//!
//! ## Overview
//!
//! The engine provides:
//! - Lazy enumeration of source documents
//! - Streaming copies with retry and backoff, collision-free target names
//! - A backup-then-delete protocol that keeps originals until a batch settles
//! - A FIFO job queue drained by one background worker
//! - Durable job history with crash recovery
//! - Progress and completion events decoupled from any UI technology
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use engine::{
//!     enumerate_documents, CancelToken, JobEvent, JobQueue, JobStore, MoveEngine, MoveOptions,
//!     QueueOptions,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cancel = CancelToken::new();
//! let documents: Vec<_> =
//!     enumerate_documents(Path::new("C:\\scans"), true, Some("pdf"), &cancel).collect();
//!
//! let store = Arc::new(JobStore::new("jobs.json"));
//! let queue = Arc::new(JobQueue::new(
//!     MoveEngine::new(MoveOptions::default()),
//!     store,
//!     QueueOptions::default(),
//! ));
//! let events = queue.subscribe();
//! let worker = queue.start_processing(cancel.clone());
//!
//! let job = queue.enqueue_job("Invoices", Path::new("D:\\archive"), &documents)?;
//! for event in events.iter() {
//!     if let JobEvent::Completed(done) = event {
//!         if done.id == job.id {
//!             println!("{} moved, {} failed", done.successful_file_count(), done.failed_file_count());
//!             break;
//!         }
//!     }
//! }
//!
//! cancel.cancel();
//! worker.join().ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (Job, JobFile, JobError, batch results)
//! - **error**: Error types and handling
//! - **fs_ops**: Low-level filesystem operations
//! - **mover**: Batch mover with retry and backup
//! - **queue**: Job queue and background worker
//! - **store**: Durable job history
//! - **classify**: Failure classification
//! - **progress**: Progress sink and job events
//! - **cancel**: Cooperative cancellation
//! - **settings**: Persisted user settings
//! - **catalog**: Scan snapshots

pub mod cancel;
pub mod catalog;
pub mod classify;
pub mod error;
pub mod fs_ops;
pub mod model;
pub mod mover;
pub mod progress;
pub mod queue;
pub mod settings;
pub mod store;

// Re-export main types and functions
pub use cancel::CancelToken;
pub use catalog::{CatalogEntry, CatalogStore};
pub use classify::classify_error;
pub use error::{EngineError, Result};
pub use fs_ops::{enumerate_documents, FileCopier, StreamCopier};
pub use model::{
    DocumentInfo, Job, JobError, JobErrorKind, JobFile, JobStatus, MoveBatchResult, MoveFailure,
};
pub use mover::{MoveEngine, MoveOptions};
pub use progress::{DetailedMoveProgress, JobEvent, JobProgress, ProgressSink};
pub use queue::{JobQueue, QueueOptions};
pub use settings::Settings;
pub use store::JobStore;
