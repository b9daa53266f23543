//! Summation of node values shared by neighboring patches.
//!
//! Nodes on the boundary of a patch may coincide with nodes of other
//! patches (including periodic images and the patch itself). After a sum,
//! every copy of such a node holds the total of all the copies' values
//! before the sum.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::connector_width::{ConnectorWidthRequestor, ConnectorWidths};
use crate::error::Error;
use crate::hierarchy::PatchHierarchy;
use crate::index_space::IntVector;
use crate::message::Communicator;
use crate::overlap::Centering;
use crate::patch::Patch;
use crate::patch_level::PatchLevel;
use crate::schedule::{Schedule, ScheduleBuilder};
use crate::transaction::{RefineItem, SumTransactionFactory};
use crate::variable::{CombineMode, ComponentSelector, Variable};




#[derive(Clone, Copy, Debug, Default)]


/**
 * Asks for same-level connectors one cell wide on every level, enough to
 * find every patch sharing a boundary node.
 */
pub struct NodeSumWidthRequestor;




// ============================================================================
impl ConnectorWidthRequestor for NodeSumWidthRequestor {
    fn compute_required_connector_widths(&self, hierarchy: &PatchHierarchy) -> ConnectorWidths {
        ConnectorWidths {
            self_widths: vec![IntVector::one(hierarchy.dim())],
            fine_widths: vec![],
        }
    }
}




#[derive(Clone, Copy, Debug)]
struct SumComponents {
    node: usize,
    src: usize,
    dst: usize,
}




/**
 * Sums node-centered data across patch boundaries on one level at a time.
 * Each registered node component gets a pair of outernode scratch
 * components: values are copied into the source scratch, summed into the
 * destination scratch by a schedule, and copied back.
 */
pub struct PatchBoundaryNodeSum {
    name: String,
    components: Vec<SumComponents>,
    schedules: BTreeMap<usize, Schedule>,
}




// ============================================================================
impl PatchBoundaryNodeSum {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            components: Vec::new(),
            schedules: BTreeMap::new(),
        }
    }


    pub fn name(&self) -> &str {
        &self.name
    }


    /**
     * Add a node-centered component to the sum. Its scratch components are
     * registered on the hierarchy, along with the connector widths the sum
     * needs. Schedules set up before this call are discarded.
     */
    pub fn register_sum(&mut self, hierarchy: &mut PatchHierarchy, node: usize) -> Result<(), Error> {
        let info = hierarchy.descriptor().component(node)?.clone();

        if info.variable.centering() != Centering::Node {
            return Err(Error::InvalidPatchDataType { component: node, found: info.variable.centering() })
        }
        if self.components.is_empty() {
            hierarchy.register_connector_width_requestor(Arc::new(NodeSumWidthRequestor))?;
        }
        let scratch = Arc::new(
            Variable::new(&format!("{}::{}::onode", self.name, info.name), Centering::Outernode, info.variable.depth())
                .with_combine(CombineMode::Sum));
        let zero = IntVector::zero(hierarchy.dim());
        let src = hierarchy.register_component(&format!("{}::{}::src", self.name, info.name), Arc::clone(&scratch), zero)?;
        let dst = hierarchy.register_component(&format!("{}::{}::dst", self.name, info.name), scratch, zero)?;

        self.components.push(SumComponents { node, src, dst });
        self.schedules.clear();
        Ok(())
    }


    fn scratch(&self) -> ComponentSelector {
        self.components.iter().flat_map(|c| vec![c.src, c.dst]).collect()
    }


    /**
     * Build the sum schedule for level `ln`. The level must exist, and be
     * rebuilt after the level is remade.
     */
    pub fn setup_sum(&mut self, hierarchy: &PatchHierarchy, ln: usize) -> Result<(), Error> {
        if self.components.is_empty() {
            return Err(Error::Config(format!("{}: no components registered", self.name)))
        }
        let level = hierarchy.level(ln)?;
        let connector = hierarchy.connector(ln, ln)?;
        let items = self.components.iter().map(|c| RefineItem::new(c.dst, c.src)).collect();
        let dst_scratch = self.components.iter().map(|c| c.dst).collect();

        let schedule = ScheduleBuilder::same_level(level, items, Arc::new(SumTransactionFactory))
            .overwrite_interior(true)
            .scratch_components(dst_scratch)
            .build(connector, connector)?;

        debug!("{}: sum schedule for level {} ready", self.name, ln);
        self.schedules.insert(ln, schedule);
        Ok(())
    }


    /**
     * Replace every boundary node value of the registered components on
     * `level` with the sum over all patches sharing that node.
     */
    pub fn compute_sum<C: Communicator + ?Sized>(&self, comm: &C, level: &mut PatchLevel) -> Result<(), Error> {
        let ln = level.level_number();
        let schedule = self
            .schedules
            .get(&ln)
            .ok_or_else(|| Error::Config(format!("{}: sum is not set up for level {}", self.name, ln)))?;
        let scratch = self.scratch();
        level.allocate(&scratch)?;

        for patch in level.patches_mut() {
            for c in &self.components {
                copy_node_to_outernode(patch, c)?;
            }
        }
        schedule.execute(comm, level)?;

        for patch in level.patches_mut() {
            for c in &self.components {
                copy_outernode_to_node(patch, c)?;
            }
        }
        level.deallocate(&scratch);
        Ok(())
    }
}




fn copy_node_to_outernode(patch: &mut Patch, c: &SumComponents) -> Result<(), Error> {
    let (onode, node) = patch.data_pair_mut(c.src, c.node)?;
    let nodes = node.array(0);

    for k in 0..onode.num_arrays() {
        let array = onode.array_mut(k);
        let space = *array.space();

        for index in space.iter() {
            for d in 0..array.depth() {
                *array.try_get_mut(&index, d)? = nodes.try_get(&index, d)?
            }
        }
    }
    Ok(())
}




fn copy_outernode_to_node(patch: &mut Patch, c: &SumComponents) -> Result<(), Error> {
    let (node, onode) = patch.data_pair_mut(c.node, c.dst)?;
    let nodes = node.array_mut(0);

    for k in 0..onode.num_arrays() {
        let array = onode.array(k);

        for index in array.space().iter() {
            for d in 0..array.depth() {
                *nodes.try_get_mut(&index, d)? = array.try_get(&index, d)?
            }
        }
    }
    Ok(())
}
