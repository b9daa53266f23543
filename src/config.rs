use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connector_width::TagBufferWidthRequestor;
use crate::error::Error;
use crate::index_space::{Dimension, IndexSpace, IntVector};
use crate::operators::ExecutionPath;




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * Static description of a patch hierarchy: the level-0 domain, the
 * refinement ratio of each level to the next coarser one, and which axes
 * are periodic. A ratio list shorter than `max_levels - 1` applies its last
 * entry to the remaining levels.
 */
pub struct HierarchyConfig {
    pub dim: usize,
    pub domain_lower: Vec<i64>,
    pub domain_upper: Vec<i64>,
    pub max_levels: usize,
    pub ratios: Vec<Vec<i64>>,
    pub periodic: Vec<bool>,
    pub check_proper_nesting: bool,
}




// ============================================================================
impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            dim: 2,
            domain_lower: vec![0, 0],
            domain_upper: vec![16, 16],
            max_levels: 2,
            ratios: vec![vec![2, 2]],
            periodic: vec![false, false],
            check_proper_nesting: true,
        }
    }
}




// ============================================================================
impl HierarchyConfig {


    /**
     * Check the configuration is internally consistent, and return its
     * dimension.
     */
    pub fn validate(&self) -> Result<Dimension, Error> {
        let dim = Dimension::new(self.dim)?;

        Error::check_dim(self.dim, self.domain_lower.len())?;
        Error::check_dim(self.dim, self.domain_upper.len())?;
        Error::check_dim(self.dim, self.periodic.len())?;

        if self.max_levels == 0 {
            return Err(Error::Config("max_levels must be at least 1".to_string()))
        }
        if self.max_levels > 1 && self.ratios.is_empty() {
            return Err(Error::Config("a refinement ratio is required for more than one level".to_string()))
        }
        for ratio in &self.ratios {
            Error::check_dim(self.dim, ratio.len())?;

            if ratio.iter().any(|&r| r < 1) {
                return Err(Error::Config(format!("refinement ratio {:?} must be positive", ratio)))
            }
        }
        if self.domain().map_or(true, |d| d.is_empty()) {
            return Err(Error::Config("the domain must not be empty".to_string()))
        }
        Ok(dim)
    }


    pub fn domain(&self) -> Result<IndexSpace, Error> {
        IndexSpace::new(IntVector::from_slice(&self.domain_lower)?, IntVector::from_slice(&self.domain_upper)?)
    }


    /**
     * Return the ratio of level `ln` to level `ln - 1`; level 0 has ratio
     * one.
     */
    pub fn ratio_to_coarser(&self, ln: usize) -> Result<IntVector, Error> {
        let dim = Dimension::new(self.dim)?;

        if ln == 0 {
            return Ok(IntVector::one(dim))
        }
        match self.ratios.get(ln - 1).or_else(|| self.ratios.last()) {
            Some(r) => IntVector::from_slice(r),
            None => Err(Error::Config(format!("no refinement ratio for level {}", ln))),
        }
    }


    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        ciborium::de::from_reader(reader).map_err(|e| Error::Config(format!("{:?}", e)))
    }


    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), Error> {
        ciborium::ser::into_writer(self, writer).map_err(|e| Error::Config(format!("{:?}", e)))
    }


    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }


    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }
}




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * Run-time settings for communication schedules and the kernels they
 * invoke.
 */
pub struct ScheduleConfig {
    pub execution_path: ExecutionPath,
    pub tag_buffer: Vec<i64>,
}




// ============================================================================
impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            execution_path: ExecutionPath::default(),
            tag_buffer: vec![1],
        }
    }
}




// ============================================================================
impl ScheduleConfig {

    pub fn validate(&self) -> Result<(), Error> {
        if self.tag_buffer.iter().any(|&b| b < 0) {
            return Err(Error::Config(format!("tag buffer {:?} must be non-negative", self.tag_buffer)))
        }
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        ciborium::de::from_reader(reader).map_err(|e| Error::Config(format!("{:?}", e)))
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), Error> {
        ciborium::ser::into_writer(self, writer).map_err(|e| Error::Config(format!("{:?}", e)))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config = Self::from_reader(BufReader::new(File::open(path)?))?;
        config.validate()?;
        Ok(config)
    }

    /**
     * A connector width requestor asking for this config's tag buffer on
     * each level.
     */
    pub fn tag_buffer_requestor(&self) -> TagBufferWidthRequestor {
        let mut requestor = TagBufferWidthRequestor::new();
        requestor.set_tag_buffer(self.tag_buffer.clone());
        requestor
    }
}
