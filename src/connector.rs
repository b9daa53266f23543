//! Neighbor relationships between the boxes of two patch levels (or of one
//! level and itself), used to decide which pairs of patches exchange data.
//!
//! A connector from a _base_ level to a _head_ level records, for every
//! base box owned by this rank, the head boxes lying within `width` base
//! cells of it. Periodic images of head boxes are included, tagged with a
//! non-zero `PeriodicId` and the shift that produced them.

use std::collections::BTreeMap;

use log::debug;

use crate::box_container::PatchBox;
use crate::error::Error;
use crate::identifiers::{BoxId, PeriodicId};
use crate::index_space::{IndexSpace, IntVector};
use crate::patch_level::PatchLevel;




#[derive(Clone, Copy, Debug, PartialEq)]


/**
 * A head box near some base box. For a periodic image, `shift` is the
 * offset (in head index space) from the real head box to the image.
 */
pub struct Neighbor {
    pub patch_box: PatchBox,
    pub shift: IntVector,
}




// ============================================================================
impl Neighbor {
    pub fn id(&self) -> BoxId {
        self.patch_box.id()
    }


    pub fn owner(&self) -> usize {
        self.patch_box.owner()
    }
}




#[derive(Clone, Copy, Debug, PartialEq)]


/**
 * How the index spaces of the base and head levels relate.
 */
enum Scaling {
    Same,
    HeadFiner(IntVector),
    HeadCoarser(IntVector),
}




// ============================================================================
impl Scaling {
    fn between(base: &PatchLevel, head: &PatchLevel) -> Result<Self, Error> {
        let b = base.ratio_to_level_zero();
        let h = head.ratio_to_level_zero();

        if b == h {
            Ok(Scaling::Same)
        } else if h.all_ge(b)? {
            Ok(Scaling::HeadFiner(h.floor_div(b)?))
        } else {
            Ok(Scaling::HeadCoarser(b.floor_div(h)?))
        }
    }


    /**
     * Map a base index space into the head index space.
     */
    fn to_head(&self, space: &IndexSpace) -> Result<IndexSpace, Error> {
        match self {
            Scaling::Same => Ok(*space),
            Scaling::HeadFiner(r) => space.refine(r),
            Scaling::HeadCoarser(r) => space.coarsen(r),
        }
    }


    /**
     * Convert a width in base cells to the smallest width in head cells
     * that covers it.
     */
    fn width_to_head(&self, width: &IntVector) -> Result<IntVector, Error> {
        match self {
            Scaling::Same => Ok(*width),
            Scaling::HeadFiner(r) => Ok(*width * *r),
            Scaling::HeadCoarser(r) => width.ceil_div(r),
        }
    }
}




/**
 * Return every periodic image offset for a level with the given periodic
 * shift: the product over periodic axes of {0, -1, +1} multiples of the
 * shift. The zero offset comes first and gets `PeriodicId::ZERO`.
 */
pub fn periodic_images(shift: Option<&IntVector>, dim: crate::index_space::Dimension) -> Vec<(PeriodicId, IntVector)> {
    let mut offsets = vec![IntVector::zero(dim)];

    if let Some(shift) = shift {
        for a in dim.axes().filter(|&a| shift[a] != 0) {
            let mut next = Vec::with_capacity(offsets.len() * 3);
            for m in &[0, -1, 1] {
                for o in &offsets {
                    let mut v = *o;
                    v[a] = m * shift[a];
                    next.push(v);
                }
            }
            offsets = next;
        }
    }
    offsets
        .into_iter()
        .enumerate()
        .map(|(n, o)| (PeriodicId::new(n as u32), o))
        .collect()
}




#[derive(Clone, Debug)]


/**
 * A persistent neighbor relationship from the local boxes of a base level
 * to the boxes of a head level.
 */
pub struct Connector {
    base_level: usize,
    head_level: usize,
    width: IntVector,
    neighbors: BTreeMap<BoxId, Vec<Neighbor>>,
}




// ============================================================================
impl Connector {
    /**
     * Find, for each local base box grown by `width` (base cells), every
     * head box or periodic image of one that intersects it. A box on the
     * same level is not its own neighbor, but its periodic images can be.
     */
    pub fn build(base: &PatchLevel, head: &PatchLevel, width: &IntVector) -> Result<Self, Error> {
        base.dim().check(head.dim())?;
        base.dim().check(width.dim())?;

        let scaling = Scaling::between(base, head)?;
        let images = periodic_images(head.periodic_shift(), head.dim());
        let same_level = base.level_number() == head.level_number();
        let mut neighbors = BTreeMap::new();

        for b in base.local_boxes() {
            let grown = scaling.to_head(&b.space().grow(width)?)?;
            let mut found = Vec::new();

            for h in head.boxes() {
                for (periodic_id, shift) in &images {
                    if same_level && h.id() == b.id() && *periodic_id == PeriodicId::ZERO {
                        continue;
                    }
                    let space = h.space().shift(shift)?;
                    if space.intersects(&grown)? {
                        let id = h.id().with_periodic_id(*periodic_id);
                        found.push(Neighbor {
                            patch_box: PatchBox::with_id(space, id, h.block()),
                            shift: *shift,
                        });
                    }
                }
            }
            neighbors.insert(b.id(), found);
        }

        let connector = Self {
            base_level: base.level_number(),
            head_level: head.level_number(),
            width: *width,
            neighbors,
        };
        debug!(
            "built connector {} -> {} at width {:?}: {} relationships",
            connector.base_level,
            connector.head_level,
            width.as_slice(),
            connector.num_relationships());
        Ok(connector)
    }


    /**
     * Build the connector in the opposite direction. The width is
     * converted to the head index space, rounding up, so every
     * relationship of this connector appears reversed in the result.
     */
    pub fn transpose(&self, base: &PatchLevel, head: &PatchLevel) -> Result<Self, Error> {
        let scaling = Scaling::between(base, head)?;
        Self::build(head, base, &scaling.width_to_head(&self.width)?)
    }


    /**
     * Check that this connector describes the given levels as they are
     * now: the level numbers match, every local base box has an entry, and
     * every neighbor is a current head box at its recorded shift.
     */
    pub fn check_current(&self, base: &PatchLevel, head: &PatchLevel) -> Result<(), Error> {
        let stale = || Error::MissingConnector { base: base.level_number(), head: head.level_number() };

        if self.base_level != base.level_number() || self.head_level != head.level_number() {
            return Err(stale())
        }
        let mut num_local = 0;

        for b in base.local_boxes() {
            num_local += 1;
            for n in self.neighbors.get(&b.id()).ok_or_else(stale)? {
                let h = head.find_box(&n.id().real()).ok_or_else(stale)?;

                if h.space().shift(&n.shift)? != *n.patch_box.space() {
                    return Err(stale())
                }
            }
        }
        if self.neighbors.len() != num_local {
            return Err(stale())
        }
        Ok(())
    }


    pub fn base_level(&self) -> usize {
        self.base_level
    }


    pub fn head_level(&self) -> usize {
        self.head_level
    }


    pub fn width(&self) -> &IntVector {
        &self.width
    }


    /**
     * Whether this connector is wide enough for a consumer requiring the
     * given width.
     */
    pub fn covers(&self, width: &IntVector) -> Result<bool, Error> {
        self.width.all_ge(width)
    }


    pub fn neighbors(&self, id: &BoxId) -> &[Neighbor] {
        self.neighbors.get(id).map_or(&[], Vec::as_slice)
    }


    pub fn iter(&self) -> impl Iterator<Item = (&BoxId, &[Neighbor])> {
        self.neighbors.iter().map(|(id, n)| (id, n.as_slice()))
    }


    pub fn num_relationships(&self) -> usize {
        self.neighbors.values().map(Vec::len).sum()
    }
}




#[derive(Debug, Default)]


/**
 * The connectors kept by a hierarchy between regrids, keyed by (base,
 * head) level number. A stored connector is only ever replaced by a wider
 * one.
 */
pub struct ConnectorSet {
    connectors: BTreeMap<(usize, usize), Connector>,
}




// ============================================================================
impl ConnectorSet {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn get(&self, base: usize, head: usize) -> Option<&Connector> {
        self.connectors.get(&(base, head))
    }


    /**
     * Return a connector of at least the given width, reusing the stored
     * one if it is wide enough. Otherwise the connector is rebuilt at the
     * pointwise maximum of the stored and requested widths.
     */
    pub fn find_or_create(&mut self, base: &PatchLevel, head: &PatchLevel, width: &IntVector) -> Result<&Connector, Error> {
        let key = (base.level_number(), head.level_number());

        let build_width = match self.connectors.get(&key) {
            Some(existing) if existing.covers(width)? => None,
            Some(existing) => Some(existing.width().pointwise_max(width)?),
            None => Some(*width),
        };

        if let Some(w) = build_width {
            debug!("connector {:?} needs width {:?}; building", key, w.as_slice());
            self.connectors.insert(key, Connector::build(base, head, &w)?);
        }
        self.connectors
            .get(&key)
            .ok_or(Error::MissingConnector { base: key.0, head: key.1 })
    }


    /**
     * Forget every connector touching a level at or above `level_number`,
     * e.g. when those levels are regridded.
     */
    pub fn remove_from(&mut self, level_number: usize) {
        self.connectors
            .retain(|&(b, h), _| b < level_number && h < level_number)
    }
}
