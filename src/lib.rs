//! # sme-indexer
//!
//! Queue-driven indexer that turns NFT marketplace transactions into
//! normalized secondary market events and publishes them to a stream.
//!
//! Work arrives as routine invocations on queues. The worker runtime
//! executes each invocation under a time budget, and the indexing
//! routines fetch transactions, parse them with the marketplace parser
//! that owns the program, drop already-published events and write the
//! rest to the output stream.
//!
//! ## Architecture
//!
//! ```text
//! Queues (memory, PostgreSQL)
//!     │
//!     ├── WorkerRuntime (worker/)
//!     ├── QueueRouter (queue/)
//!     │
//!     ├── RoutineRegistry + executor (routine/)
//!     ├── collection_scan, sme_indexer (indexer/)
//!     │
//!     ├── ChainClient (chain/)
//!     ├── ParserRegistry (parser/)
//!     │
//!     ├── DedupePublishStage (stream/)
//!     └── StreamPublisher ──► output stream
//! ```

pub mod api;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod indexer;
pub mod notify;
pub mod parser;
pub mod persistence;
pub mod queue;
pub mod routine;
pub mod stream;
pub mod worker;
