use serde::{Deserialize, Serialize};
use crate::error::Error;
use crate::identifiers::{BlockId, BoxId, LocalId};
use crate::index_space::{Dimension, IndexSpace};




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]


/**
 * A box on a patch level: a cell index space, annotated with its globally
 * unique id (owner rank, local id, periodic image) and the block it lives in.
 */
pub struct PatchBox {
    space: IndexSpace,
    id: BoxId,
    block: BlockId,
}




// ============================================================================
impl PatchBox {

    pub fn new(space: IndexSpace, owner: usize, local_id: LocalId) -> Self {
        Self {
            space,
            id: BoxId::new(owner, local_id),
            block: BlockId::ZERO,
        }
    }

    pub fn with_id(space: IndexSpace, id: BoxId, block: BlockId) -> Self {
        Self { space, id, block }
    }

    pub fn space(&self) -> &IndexSpace {
        &self.space
    }

    pub fn id(&self) -> BoxId {
        self.id
    }

    pub fn owner(&self) -> usize {
        self.id.owner
    }

    pub fn local_id(&self) -> LocalId {
        self.id.local_id
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn dim(&self) -> Dimension {
        self.space.dim()
    }

    /**
     * Return `InvalidIdentifier` unless the box has a non-negative local id.
     */
    pub fn check_valid(&self) -> Result<(), Error> {
        if self.id.is_valid() {
            Ok(())
        } else {
            Err(Error::InvalidIdentifier(self.id.to_string()))
        }
    }
}




#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]


/**
 * An ordered sequence of index spaces. Insertion order is preserved and no
 * merging or simplification is ever done implicitly.
 */
pub struct BoxContainer {
    boxes: Vec<IndexSpace>,
}




// ============================================================================
impl BoxContainer {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /**
     * Return the total number of indexes covered. The boxes of a container
     * built by the overlap engine are disjoint, so this is the volume.
     */
    pub fn num_indexes(&self) -> usize {
        self.boxes.iter().map(IndexSpace::len).sum()
    }

    /**
     * Append a box. Empty boxes are dropped.
     */
    pub fn push(&mut self, space: IndexSpace) {
        if !space.is_empty() {
            self.boxes.push(space)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexSpace> {
        self.boxes.iter()
    }

    /**
     * Intersect every box with the given one, keeping only non-empty
     * pieces.
     */
    pub fn intersect_boxes(&mut self, space: &IndexSpace) -> Result<(), Error> {
        let mut result = Vec::with_capacity(self.boxes.len());

        for b in &self.boxes {
            let i = b.intersection(space)?;
            if !i.is_empty() {
                result.push(i)
            }
        }
        self.boxes = result;
        Ok(())
    }

    /**
     * Remove the given region from every box. A box may be split into
     * several disjoint pieces.
     */
    pub fn remove_intersections(&mut self, space: &IndexSpace) -> Result<(), Error> {
        let mut result = Vec::with_capacity(self.boxes.len());

        for b in &self.boxes {
            result.extend(b.subtract(space)?)
        }
        self.boxes = result;
        Ok(())
    }

    /**
     * Determine whether the given index space is covered by the union of the
     * boxes.
     */
    pub fn covers(&self, space: &IndexSpace) -> Result<bool, Error> {
        let mut remaining = vec![*space];

        for b in &self.boxes {
            let mut next = Vec::new();
            for r in &remaining {
                next.extend(r.subtract(b)?)
            }
            remaining = next;
        }
        Ok(remaining.is_empty())
    }
}

impl From<Vec<IndexSpace>> for BoxContainer {
    fn from(boxes: Vec<IndexSpace>) -> Self {
        boxes.into_iter().collect()
    }
}

impl core::iter::FromIterator<IndexSpace> for BoxContainer {
    fn from_iter<I: IntoIterator<Item = IndexSpace>>(iter: I) -> Self {
        let mut result = Self::new();

        for space in iter {
            result.push(space)
        }
        result
    }
}

impl<'a> IntoIterator for &'a BoxContainer {
    type Item = &'a IndexSpace;
    type IntoIter = core::slice::Iter<'a, IndexSpace>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::index_space::range2d;

    #[test]
    fn container_preserves_order_and_drops_empties() {
        let mut c = BoxContainer::new();
        c.push(range2d(4..8, 0..4));
        c.push(range2d(0..0, 0..4));
        c.push(range2d(0..4, 0..4));
        assert_eq!(c.len(), 2);
        assert_eq!(c.iter().next().unwrap(), &range2d(4..8, 0..4));
    }

    #[test]
    fn covers_needs_the_union() {
        let c: BoxContainer = vec![range2d(0..4, 0..4), range2d(4..8, 0..4)].into();
        assert!(c.covers(&range2d(2..6, 1..3)).unwrap());
        assert!(!c.covers(&range2d(2..6, 1..5)).unwrap());
    }

    #[test]
    fn invalid_local_id_is_rejected() {
        let b = PatchBox::new(range2d(0..4, 0..4), 0, LocalId::INVALID);
        assert!(matches!(b.check_valid(), Err(Error::InvalidIdentifier(_))));
    }
}
