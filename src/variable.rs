//! Registration records for named fields, and the per-patch layout of
//! allocated components.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::index_space::{Dimension, IndexSpace, IntVector};
use crate::overlap::{BoxGeometry, Centering};




#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]


/**
 * How values arriving across a patch boundary combine with the values
 * already at the destination.
 */
pub enum CombineMode {
    Copy,
    Sum,
}




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * Metadata of a named field: where its values live, how many components
 * each value has, and how it is combined and interpolated in time.
 */
pub struct Variable {
    name: String,
    centering: Centering,
    depth: usize,
    combine: CombineMode,
    time_interpolate: bool,
}




// ============================================================================
impl Variable {
    pub fn new(name: &str, centering: Centering, depth: usize) -> Self {
        assert!(depth > 0, "variable {} must have positive depth", name);
        Self {
            name: name.to_string(),
            centering,
            depth,
            combine: CombineMode::Copy,
            time_interpolate: false,
        }
    }


    pub fn with_combine(self, combine: CombineMode) -> Self {
        Self { combine, ..self }
    }


    pub fn with_time_interpolation(self, time_interpolate: bool) -> Self {
        Self { time_interpolate, ..self }
    }


    pub fn name(&self) -> &str {
        &self.name
    }


    pub fn centering(&self) -> Centering {
        self.centering
    }


    pub fn depth(&self) -> usize {
        self.depth
    }


    pub fn combine(&self) -> CombineMode {
        self.combine
    }


    pub fn time_interpolate(&self) -> bool {
        self.time_interpolate
    }
}




#[derive(Clone, Debug)]


/**
 * One registered patch data component: a variable plus the ghost width it
 * is allocated with.
 */
pub struct ComponentInfo {
    pub name: String,
    pub variable: Arc<Variable>,
    pub ghosts: IntVector,
}




#[derive(Clone, Debug)]


/**
 * The layout of patch data components shared by every patch of a
 * hierarchy. Component ids are indexes into this table.
 */
pub struct PatchDescriptor {
    dim: Dimension,
    components: Vec<ComponentInfo>,
}




// ============================================================================
impl PatchDescriptor {
    pub fn new(dim: Dimension) -> Self {
        Self {
            dim,
            components: Vec::new(),
        }
    }


    pub fn dim(&self) -> Dimension {
        self.dim
    }


    pub fn len(&self) -> usize {
        self.components.len()
    }


    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }


    /**
     * Register a new component and return its id. Boundary-only
     * centerings are always registered without ghosts.
     */
    pub fn register(&mut self, name: &str, variable: Arc<Variable>, ghosts: IntVector) -> Result<usize, Error> {
        self.dim.check(ghosts.dim())?;

        let ghosts = if variable.centering().is_boundary_only() {
            IntVector::zero(self.dim)
        } else {
            ghosts
        };
        self.components.push(ComponentInfo {
            name: name.to_string(),
            variable,
            ghosts,
        });
        Ok(self.components.len() - 1)
    }


    pub fn component(&self, id: usize) -> Result<&ComponentInfo, Error> {
        self.components
            .get(id)
            .ok_or(Error::MissingComponent { component: id })
    }


    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.name == name)
    }


    /**
     * Return the geometry of a component on a patch with the given cell
     * index space. Remote patches are described this way without any of
     * their data being present.
     */
    pub fn geometry(&self, id: usize, space: &IndexSpace) -> Result<BoxGeometry, Error> {
        let info = self.component(id)?;
        BoxGeometry::new(info.variable.centering(), *space, info.ghosts)
    }


    /**
     * Return the pointwise maximum ghost width over all components.
     */
    pub fn max_ghost_width(&self) -> IntVector {
        self.components
            .iter()
            .fold(IntVector::zero(self.dim), |w, c| w.pointwise_max(&c.ghosts).unwrap_or(w))
    }
}




#[derive(Clone, Debug, Default, PartialEq, Eq)]


/**
 * A set of component ids, used to select which components an operation
 * touches.
 */
pub struct ComponentSelector {
    flags: Vec<bool>,
}




// ============================================================================
impl ComponentSelector {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn set(&mut self, id: usize) {
        if self.flags.len() <= id {
            self.flags.resize(id + 1, false)
        }
        self.flags[id] = true
    }


    pub fn clear(&mut self, id: usize) {
        if let Some(flag) = self.flags.get_mut(id) {
            *flag = false
        }
    }


    pub fn is_set(&self, id: usize) -> bool {
        self.flags.get(id).copied().unwrap_or(false)
    }


    /**
     * Return the selected ids in increasing order.
     */
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .map(|(id, _)| id)
    }
}




// ============================================================================
impl core::iter::FromIterator<usize> for ComponentSelector {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut selector = Self::new();
        for id in iter {
            selector.set(id)
        }
        selector
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn boundary_components_never_have_ghosts() {
        let dim = Dimension::new(2).unwrap();
        let mut descriptor = PatchDescriptor::new(dim);
        let onode = Arc::new(Variable::new("onode", Centering::Outernode, 1).with_combine(CombineMode::Sum));
        let cell = Arc::new(Variable::new("rho", Centering::Cell, 1));
        let a = descriptor.register("onode", onode, IntVector::uniform(dim, 2)).unwrap();
        let b = descriptor.register("rho", cell, IntVector::uniform(dim, 2)).unwrap();
        assert_eq!(descriptor.component(a).unwrap().ghosts, IntVector::zero(dim));
        assert_eq!(descriptor.component(b).unwrap().ghosts, IntVector::uniform(dim, 2));
        assert_eq!(descriptor.max_ghost_width(), IntVector::uniform(dim, 2));
        assert_eq!(descriptor.lookup("rho"), Some(b));
        assert!(matches!(descriptor.component(9), Err(Error::MissingComponent { component: 9 })));
    }

    #[test]
    fn selector_iterates_set_ids() {
        let mut selector: ComponentSelector = vec![4, 1].into_iter().collect();
        selector.clear(4);
        selector.set(2);
        assert_eq!(selector.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(!selector.is_set(100));
    }
}
