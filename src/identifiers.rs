//! Small ordered identifiers for boxes, blocks, and periodic images.
//!
//! The reserved values (`INVALID`, `ZERO`) are associated constants; they are
//! never mutated and need no initialization.

use core::fmt;
use serde::{Deserialize, Serialize};




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]


/**
 * Identifies which logical block of a multiblock domain a box belongs to.
 */
pub struct BlockId(u32);




// ============================================================================
impl BlockId {
    pub const INVALID: Self = Self(u32::MAX);
    pub const ZERO: Self = Self(0);

    pub fn new(value: u32) -> Self {
        Self(value)
    }


    pub fn value(self) -> u32 {
        self.0
    }


    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}




// ============================================================================
impl Default for BlockId {
    fn default() -> Self {
        Self::ZERO
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]


/**
 * Identifies which periodic image of a box is meant. `ZERO` is the box
 * itself (no shift).
 */
pub struct PeriodicId(u32);




// ============================================================================
impl PeriodicId {
    pub const INVALID: Self = Self(u32::MAX);
    pub const ZERO: Self = Self(0);

    pub fn new(value: u32) -> Self {
        Self(value)
    }


    pub fn value(self) -> u32 {
        self.0
    }


    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}




// ============================================================================
impl Default for PeriodicId {
    fn default() -> Self {
        Self::ZERO
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]


/**
 * Rank-local box number. Negative values mean "not yet assigned".
 */
pub struct LocalId(i32);




// ============================================================================
impl LocalId {
    pub const INVALID: Self = Self(-1);

    pub fn new(value: i32) -> Self {
        Self(value)
    }


    pub fn value(self) -> i32 {
        self.0
    }


    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}




// ============================================================================
impl Default for LocalId {
    fn default() -> Self {
        Self::INVALID
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]


/**
 * Globally unique name of a box on a level: the owner rank, the owner's
 * local id, and the periodic image. Ordering is by owner first, so boxes
 * sort into per-rank runs.
 */
pub struct BoxId {
    pub owner: usize,
    pub local_id: LocalId,
    pub periodic_id: PeriodicId,
}




// ============================================================================
impl BoxId {
    pub fn new(owner: usize, local_id: LocalId) -> Self {
        Self {
            owner,
            local_id,
            periodic_id: PeriodicId::ZERO,
        }
    }


    /**
     * Return the id of a periodic image of this box.
     */
    pub fn with_periodic_id(self, periodic_id: PeriodicId) -> Self {
        Self { periodic_id, ..self }
    }


    /**
     * Return the id of the real box this one is an image of.
     */
    pub fn real(self) -> Self {
        self.with_periodic_id(PeriodicId::ZERO)
    }


    pub fn is_periodic_image(self) -> bool {
        self.periodic_id != PeriodicId::ZERO
    }


    pub fn is_valid(self) -> bool {
        self.local_id.is_valid() && self.periodic_id.is_valid()
    }
}




// ============================================================================
impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.local_id.0)?;
        if self.is_periodic_image() {
            write!(f, "@{}", self.periodic_id.0)?;
        }
        Ok(())
    }
}
