use std::error;
use std::fmt;
use std::io;

use crate::overlap::Centering;




#[derive(Debug)]


/**
 * Error to represent violated preconditions in geometry, overlap,
 * transaction, and operator calls, and failures of the message transport.
 * None of these are recoverable locally: a distributed round is either
 * completed on every rank or the caller aborts.
 */
pub enum Error {
    DimensionMismatch { expected: usize, found: usize },
    UnsupportedDimension(usize),
    InvalidIdentifier(String),
    InvalidOverlapType { expected: Centering, found: Centering },
    InvalidPatchDataType { component: usize, found: Centering },
    InvalidItem { item_id: usize, num_items: usize },
    MissingPatch(String),
    MissingComponent { component: usize },
    MissingConnector { base: usize, head: usize },
    IndexOutOfRange(String),
    OverlappingBoxes(String),
    ProperNesting { level: usize },
    Communication(String),
    Codec(String),
    Config(String),
    Io(io::Error),
}




// ============================================================================
impl Error {

    /**
     * Return `Ok` if the two dimensions agree, and `DimensionMismatch`
     * otherwise.
     */
    pub fn check_dim(expected: usize, found: usize) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(Error::DimensionMismatch { expected, found })
        }
    }
}




// ============================================================================
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;

        match self {
            DimensionMismatch { expected, found } => write!(fmt, "dimension mismatch: expected {}, found {}", expected, found),
            UnsupportedDimension(d) => write!(fmt, "dimension {} not supported (must be 1, 2, or 3)", d),
            InvalidIdentifier(id) => write!(fmt, "invalid identifier: {}", id),
            InvalidOverlapType { expected, found } => write!(fmt, "expected a {:?} overlap, found a {:?} overlap", expected, found),
            InvalidPatchDataType { component, found } => write!(fmt, "component {} has unexpected centering {:?}", component, found),
            InvalidItem { item_id, num_items } => write!(fmt, "item id {} out of range ({} items)", item_id, num_items),
            MissingPatch(id) => write!(fmt, "no local patch with id {}", id),
            MissingComponent { component } => write!(fmt, "patch data component {} is not allocated", component),
            MissingConnector { base, head } => write!(fmt, "no connector from level {} to level {}", base, head),
            IndexOutOfRange(msg) => write!(fmt, "index out of range: {}", msg),
            OverlappingBoxes(msg) => write!(fmt, "boxes on a level overlap: {}", msg),
            ProperNesting { level } => write!(fmt, "level {} is not properly nested in level {}", level, level.saturating_sub(1)),
            Communication(msg) => write!(fmt, "communication failure: {}", msg),
            Codec(msg) => write!(fmt, "message codec failure: {}", msg),
            Config(msg) => write!(fmt, "invalid configuration: {}", msg),
            Io(e) => write!(fmt, "i/o error: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
