//! Indexer routines.
//!
//! - [`CollectionScanRoutine`] (`collection_scan`): enumerates a collection
//!   and fans out follow-up invocations.
//! - [`AssetIndexRoutine`] (`asset_index`): lists the recent transactions of
//!   a chunk of assets and enqueues them for `sme_indexer`.
//! - [`TransactionBatchRoutine`] (`sme_indexer`): turns a batch of
//!   transaction signatures into published secondary market events.

pub mod asset_index;
pub mod collection_scan;
pub mod transaction_batch;

pub use asset_index::{AssetIndexParams, AssetIndexRoutine};
pub use collection_scan::{CollectionScanParams, CollectionScanRoutine};
pub use transaction_batch::{TransactionBatchParams, TransactionBatchRoutine};
