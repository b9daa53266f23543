//! Patchsync is the communication layer of a structured adaptive mesh
//! refinement (AMR) code. A hierarchy is made of levels of rectangular
//! patches, each patch owned by one rank of a distributed program. This
//! crate computes which patches need each other's data (connectors, and the
//! overlaps between pairs of patches), and moves that data in rounds: ghost
//! fills on a level, fills of a fine level from a coarser one, and sums of
//! values shared between patches (such as nodes on patch boundaries).
//!
//! Data movement is deterministic: every rank combines contributions in the
//! same order, whatever order the messages arrive in.

pub mod box_container;
pub mod config;
pub mod connector;
pub mod connector_width;
pub mod error;
pub mod hierarchy;
pub mod identifiers;
pub mod index_space;
pub mod message;
pub mod node_sum;
pub mod operators;
pub mod overlap;
pub mod patch;
pub mod patch_data;
pub mod patch_level;
pub mod refine_schedule;
pub mod schedule;
pub mod transaction;
pub mod variable;

pub use error::Error;
