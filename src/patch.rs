use crate::box_container::PatchBox;
use crate::error::Error;
use crate::identifiers::BoxId;
use crate::index_space::IndexSpace;
use crate::patch_data::PatchData;
use crate::variable::{ComponentSelector, PatchDescriptor};




/**
 * A patch is one box of a patch level, on the rank that owns it, together
 * with the field data allocated on it. Patch data lives in a slot table
 * indexed by component id; a slot keeps its storage from one communication
 * round to the next, until it is deallocated or the patch is dropped at
 * regrid.
 */
pub struct Patch {
    patch_box: PatchBox,
    level_number: usize,
    data: Vec<Option<PatchData>>,
}




// ============================================================================
impl Patch {


    pub fn new(patch_box: PatchBox, level_number: usize) -> Self {
        Self { patch_box, level_number, data: Vec::new() }
    }


    pub fn patch_box(&self) -> &PatchBox {
        &self.patch_box
    }


    pub fn id(&self) -> BoxId {
        self.patch_box.id()
    }


    pub fn space(&self) -> &IndexSpace {
        self.patch_box.space()
    }


    pub fn level_number(&self) -> usize {
        self.level_number
    }


    /**
     * Allocate storage for a component, laid out as the descriptor says. An
     * existing allocation is kept as-is.
     */
    pub fn allocate(&mut self, descriptor: &PatchDescriptor, component: usize) -> Result<(), Error> {
        let info = descriptor.component(component)?;
        descriptor.dim().check(self.space().dim())?;

        if self.data.len() <= component {
            self.data.resize_with(component + 1, || None)
        }
        if self.data[component].is_none() {
            let geometry = descriptor.geometry(component, self.space())?;
            self.data[component] = Some(PatchData::new(geometry, info.variable.depth()));
        }
        Ok(())
    }


    pub fn allocate_selected(&mut self, descriptor: &PatchDescriptor, selector: &ComponentSelector) -> Result<(), Error> {
        for component in selector.iter() {
            self.allocate(descriptor, component)?
        }
        Ok(())
    }


    pub fn deallocate(&mut self, component: usize) {
        if let Some(slot) = self.data.get_mut(component) {
            *slot = None
        }
    }


    pub fn is_allocated(&self, component: usize) -> bool {
        self.data.get(component).map_or(false, Option::is_some)
    }


    pub fn data(&self, component: usize) -> Result<&PatchData, Error> {
        self.data
            .get(component)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingComponent { component })
    }


    pub fn data_mut(&mut self, component: usize) -> Result<&mut PatchData, Error> {
        self.data
            .get_mut(component)
            .and_then(Option::as_mut)
            .ok_or(Error::MissingComponent { component })
    }


    /**
     * Replace the data of a component with the given one, e.g. data
     * generated by `PatchData::from_function`.
     */
    pub fn set_data(&mut self, component: usize, data: PatchData) -> Result<(), Error> {
        self.space().dim().check(data.geometry().dim())?;

        if self.data.len() <= component {
            self.data.resize_with(component + 1, || None)
        }
        self.data[component] = Some(data);
        Ok(())
    }


    /**
     * Return mutable access to two distinct components at once, e.g. a
     * source and a scratch component of the same patch.
     */
    pub fn data_pair_mut(&mut self, a: usize, b: usize) -> Result<(&mut PatchData, &PatchData), Error> {
        assert!(a != b, "data_pair_mut requires distinct components");

        if a.max(b) >= self.data.len() {
            return Err(Error::MissingComponent { component: a.max(b) })
        }

        if a < b {
            let (lo, hi) = self.data.split_at_mut(b);
            let x = lo[a].as_mut().ok_or(Error::MissingComponent { component: a })?;
            let y = hi.first().and_then(Option::as_ref).ok_or(Error::MissingComponent { component: b })?;
            Ok((x, y))
        } else {
            let (lo, hi) = self.data.split_at_mut(a);
            let y = lo[b].as_ref().ok_or(Error::MissingComponent { component: b })?;
            let x = hi.first_mut().and_then(Option::as_mut).ok_or(Error::MissingComponent { component: a })?;
            Ok((x, y))
        }
    }
}
