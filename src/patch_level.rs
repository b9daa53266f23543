use std::collections::BTreeMap;
use std::sync::Arc;

use crate::box_container::PatchBox;
use crate::error::Error;
use crate::identifiers::BoxId;
use crate::index_space::{Dimension, IndexSpace, IntVector};
use crate::patch::Patch;
use crate::variable::{ComponentSelector, PatchDescriptor};




/**
 * One resolution level of a patch hierarchy. Every rank knows the complete
 * set of boxes on the level (with their owners), but holds patches, and
 * therefore field data, only for the boxes it owns.
 */
pub struct PatchLevel {
    level_number: usize,
    rank: usize,
    boxes: BTreeMap<BoxId, PatchBox>,
    patches: BTreeMap<BoxId, Patch>,
    descriptor: Arc<PatchDescriptor>,
    ratio_to_level_zero: IntVector,
    ratio_to_coarser: IntVector,
    periodic_shift: Option<IntVector>,
}




// ============================================================================
impl PatchLevel {


    /**
     * Build a level from boxes with owners. Boxes must have valid, unique
     * ids and be pairwise disjoint. Patches are created for the boxes owned
     * by `rank`; no data is allocated yet.
     */
    pub fn new(
        level_number: usize,
        rank: usize,
        boxes: Vec<PatchBox>,
        descriptor: Arc<PatchDescriptor>,
        ratio_to_level_zero: IntVector,
        ratio_to_coarser: IntVector) -> Result<Self, Error>
    {
        let level = Self::new_unchecked(level_number, rank, boxes, descriptor, ratio_to_level_zero, ratio_to_coarser)?;
        level.check_disjoint()?;
        Ok(level)
    }


    /**
     * Build a level whose boxes may overlap one another. Used for scratch
     * levels (e.g. coarsened fine boxes grown by an interpolation stencil).
     */
    pub(crate) fn new_unchecked(
        level_number: usize,
        rank: usize,
        boxes: Vec<PatchBox>,
        descriptor: Arc<PatchDescriptor>,
        ratio_to_level_zero: IntVector,
        ratio_to_coarser: IntVector) -> Result<Self, Error>
    {
        let dim = descriptor.dim();
        dim.check(ratio_to_level_zero.dim())?;
        dim.check(ratio_to_coarser.dim())?;

        let mut table = BTreeMap::new();
        let mut patches = BTreeMap::new();

        for b in boxes {
            dim.check(b.dim())?;
            b.check_valid()?;

            if b.id().is_periodic_image() || table.contains_key(&b.id()) {
                return Err(Error::InvalidIdentifier(format!("duplicate or image box {} on level {}", b.id(), level_number)))
            }
            if b.owner() == rank {
                patches.insert(b.id(), Patch::new(b, level_number));
            }
            table.insert(b.id(), b);
        }

        Ok(Self {
            level_number,
            rank,
            boxes: table,
            patches,
            descriptor,
            ratio_to_level_zero,
            ratio_to_coarser,
            periodic_shift: None,
        })
    }


    /**
     * Declare the level periodic: the shift is the domain extent (in this
     * level's index space) on periodic axes, and zero on the others.
     */
    pub fn with_periodic_shift(self, shift: IntVector) -> Result<Self, Error> {
        self.dim().check(shift.dim())?;
        Ok(Self { periodic_shift: Some(shift), ..self })
    }


    fn check_disjoint(&self) -> Result<(), Error> {
        let boxes: Vec<_> = self.boxes.values().collect();

        for (n, a) in boxes.iter().enumerate() {
            for b in &boxes[n + 1..] {
                if a.space().intersects(b.space())? {
                    return Err(Error::OverlappingBoxes(format!("{} and {} on level {}", a.id(), b.id(), self.level_number)))
                }
            }
        }
        Ok(())
    }


    pub fn dim(&self) -> Dimension {
        self.descriptor.dim()
    }


    pub fn level_number(&self) -> usize {
        self.level_number
    }


    pub fn rank(&self) -> usize {
        self.rank
    }


    pub fn descriptor(&self) -> &Arc<PatchDescriptor> {
        &self.descriptor
    }


    /**
     * Replace the descriptor after components were appended to it. Ids of
     * existing components must be unchanged.
     */
    pub(crate) fn set_descriptor(&mut self, descriptor: Arc<PatchDescriptor>) {
        self.descriptor = descriptor
    }


    pub fn ratio_to_level_zero(&self) -> &IntVector {
        &self.ratio_to_level_zero
    }


    pub fn ratio_to_coarser(&self) -> &IntVector {
        &self.ratio_to_coarser
    }


    pub fn periodic_shift(&self) -> Option<&IntVector> {
        self.periodic_shift.as_ref()
    }


    /**
     * Return every box on the level (all ranks), ordered by id.
     */
    pub fn boxes(&self) -> impl Iterator<Item = &PatchBox> {
        self.boxes.values()
    }


    pub fn num_boxes(&self) -> usize {
        self.boxes.len()
    }


    /**
     * Return the boxes owned by this rank.
     */
    pub fn local_boxes(&self) -> impl Iterator<Item = &PatchBox> {
        self.patches.values().map(Patch::patch_box)
    }


    pub fn find_box(&self, id: &BoxId) -> Option<&PatchBox> {
        self.boxes.get(&id.real())
    }


    pub fn patch(&self, id: &BoxId) -> Result<&Patch, Error> {
        self.patches.get(id).ok_or_else(|| Error::MissingPatch(id.to_string()))
    }


    pub fn patch_mut(&mut self, id: &BoxId) -> Result<&mut Patch, Error> {
        self.patches.get_mut(id).ok_or_else(|| Error::MissingPatch(id.to_string()))
    }


    pub fn patches(&self) -> impl Iterator<Item = &Patch> {
        self.patches.values()
    }


    pub fn patches_mut(&mut self) -> impl Iterator<Item = &mut Patch> {
        self.patches.values_mut()
    }


    /**
     * Allocate the selected components on every local patch.
     */
    pub fn allocate(&mut self, selector: &ComponentSelector) -> Result<(), Error> {
        let descriptor = Arc::clone(&self.descriptor);

        for patch in self.patches.values_mut() {
            patch.allocate_selected(&descriptor, selector)?
        }
        Ok(())
    }


    pub fn deallocate(&mut self, selector: &ComponentSelector) {
        for patch in self.patches.values_mut() {
            for component in selector.iter() {
                patch.deallocate(component)
            }
        }
    }


    /**
     * Stamp the selected components on every local patch with a simulation
     * time.
     */
    pub fn set_time(&mut self, selector: &ComponentSelector, time: f64) -> Result<(), Error> {
        for patch in self.patches.values_mut() {
            for component in selector.iter() {
                patch.data_mut(component)?.set_time(time)
            }
        }
        Ok(())
    }


    /**
     * Return the smallest index space containing every box of the level.
     */
    pub fn bounding_box(&self) -> IndexSpace {
        let dim = self.dim();
        let mut boxes = self.boxes.values().map(|b| *b.space()).filter(|s| !s.is_empty());

        let first = match boxes.next() {
            Some(first) => first,
            None => return IndexSpace::empty(dim),
        };
        boxes.fold(first, |acc, b| {
            let lower = acc.lower().pointwise_min(&b.lower()).unwrap_or(acc.lower());
            let upper = acc.upper().pointwise_max(&b.upper()).unwrap_or(acc.upper());
            IndexSpace::new(lower, upper).unwrap_or(acc)
        })
    }


    /**
     * Return the bounding box grown by the largest ghost width of any
     * component: every index that any patch data on the level can hold.
     */
    pub fn full_box(&self) -> IndexSpace {
        let bounding = self.bounding_box();
        bounding.grow(&self.descriptor.max_ghost_width()).unwrap_or(bounding)
    }


    /**
     * Build a scratch level whose boxes are this level's boxes coarsened by
     * `ratio` and grown by `growth`, with the same ids and owners. The
     * scratch boxes may overlap.
     */
    pub fn coarsened(&self, ratio: &IntVector, growth: &IntVector) -> Result<PatchLevel, Error> {
        let mut boxes = Vec::with_capacity(self.boxes.len());

        for b in self.boxes.values() {
            let space = b.space().coarsen(ratio)?.grow(growth)?;
            boxes.push(PatchBox::with_id(space, b.id(), b.block()));
        }
        let ratio_to_level_zero = self.ratio_to_level_zero.floor_div(ratio)?;
        let mut level = Self::new_unchecked(
            self.level_number,
            self.rank,
            boxes,
            Arc::clone(&self.descriptor),
            ratio_to_level_zero,
            IntVector::one(self.dim()))?;

        if let Some(shift) = &self.periodic_shift {
            level.periodic_shift = Some(shift.floor_div(ratio)?);
        }
        Ok(level)
    }
}
