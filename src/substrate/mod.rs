// src/substrate/mod.rs

//! In-process stand-in for the durable execution substrate.
//!
//! The orchestrator relies on a handful of substrate guarantees; this module
//! provides just those:
//! - [`side_effect`]: record-once values that replay identically (the
//!   deterministic random used by the batch veto).
//! - [`checkpoint`]: persisting the continuation handed from one lifetime to
//!   the next.
//! - [`identity`]: deterministic child identities within a lineage.

pub mod checkpoint;
pub mod identity;
pub mod side_effect;

pub use checkpoint::{CheckpointStore, Continuation, FileCheckpointStore, MemoryCheckpointStore};
pub use identity::LineageId;
pub use side_effect::{DeterministicRandom, FixedRandom, RandomSource, SideEffectLog, ThreadRandom};
