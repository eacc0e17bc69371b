//! Domain layer: the canonical secondary market event and its identity.
//!
//! This module contains the chain and marketplace identifiers, the
//! [`SecondaryMarketEvent`] value type every parser produces, and the
//! [`DedupeIdentity`] used to collapse duplicate deliveries.

pub mod identity;
pub mod market;
pub mod sme_event;

pub use identity::DedupeIdentity;
pub use market::{BlockchainId, MarketId};
pub use sme_event::{EventType, SecondaryMarketEvent};
