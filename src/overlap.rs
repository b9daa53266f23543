use serde::{Deserialize, Serialize};
use crate::box_container::BoxContainer;
use crate::error::Error;
use crate::index_space::{Dimension, IndexSpace, IntVector, MAX_DIM};




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]


/**
 * Where within a cell the values of a field live. Cell and node data are
 * stored in one array; face and edge data in one array per axis; outernode
 * and outerface data (values on the patch boundary only) in one array per
 * axis and side.
 */
pub enum Centering {
    Cell,
    Node,
    Face,
    Edge,
    Outernode,
    Outerface,
}




// ============================================================================
impl Centering {


    /**
     * Return the number of arrays data with this centering is stored in.
     */
    pub fn num_arrays(self, dim: Dimension) -> usize {
        match self {
            Centering::Cell | Centering::Node => 1,
            Centering::Face | Centering::Edge => dim.value(),
            Centering::Outernode | Centering::Outerface => 2 * dim.value(),
        }
    }


    /**
     * Whether the data lives only on the boundary layer of a patch. Such
     * data has no ghost region.
     */
    pub fn is_boundary_only(self) -> bool {
        matches!(self, Centering::Outernode | Centering::Outerface)
    }


    /**
     * Whether per-axis arrays are stored with their axes rotated so that the
     * array's own axis comes first. This lets one kernel template serve all
     * face-normal directions.
     */
    pub fn is_rotated(self) -> bool {
        matches!(self, Centering::Face | Centering::Outerface)
    }


    /**
     * Return the axis an array belongs to, or `None` for single-array
     * centerings.
     */
    pub fn array_axis(self, array: usize) -> Option<usize> {
        match self {
            Centering::Cell | Centering::Node => None,
            Centering::Face | Centering::Edge => Some(array),
            Centering::Outernode | Centering::Outerface => Some(array / 2),
        }
    }


    /**
     * Return the index space of the given array, for data defined on the
     * given cell index space. The result is in the array's own coordinates
     * (rotated, for face and outerface data).
     */
    pub fn array_space(self, cells: &IndexSpace, array: usize) -> IndexSpace {
        if cells.is_empty() {
            return IndexSpace::empty(cells.dim())
        }
        match self {
            Centering::Cell => *cells,
            Centering::Node => cells.to_nodes(),
            Centering::Face => cells.grow_upper(array, 1).rotate(array),
            Centering::Edge => {
                let mut space = *cells;
                for b in cells.dim().axes().filter(|&b| b != array) {
                    space = space.grow_upper(b, 1)
                }
                space
            }
            Centering::Outernode => {
                let (axis, side) = (array / 2, array % 2);
                let nodes = cells.to_nodes();
                let layer = if side == 0 { nodes.lower()[axis] } else { nodes.upper()[axis] - 1 };
                let mut space = nodes.slab(axis, layer);
                for b in 0..axis {
                    space = space.grow_lower(b, -1).grow_upper(b, -1)
                }
                space
            }
            Centering::Outerface => {
                let (axis, side) = (array / 2, array % 2);
                let faces = cells.grow_upper(axis, 1);
                let layer = if side == 0 { faces.lower()[axis] } else { faces.upper()[axis] - 1 };
                faces.slab(axis, layer).rotate(axis)
            }
        }
    }


    /**
     * Like `array_space`, but boundary-only centerings return the whole
     * region spanned by the cells (in the array's coordinates) rather than
     * its boundary layer. Used to clip overlaps to a fill region.
     */
    pub fn region_space(self, cells: &IndexSpace, array: usize) -> IndexSpace {
        match self {
            Centering::Outernode => Centering::Node.array_space(cells, 0),
            Centering::Outerface => Centering::Face.array_space(cells, array / 2),
            _ => self.array_space(cells, array),
        }
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]


/**
 * Maps source index space to destination index space: destination axis `i`
 * is source axis `permutation[i]`, followed by a shift. The identity and
 * pure shifts (periodic images) are the common cases; axis permutations
 * arise between blocks of a multiblock domain.
 */
pub struct Transformation {
    permutation: [usize; MAX_DIM],
    offset: IntVector,
}




// ============================================================================
impl Transformation {


    pub fn identity(dim: Dimension) -> Self {
        Self::shift(IntVector::zero(dim))
    }


    pub fn shift(offset: IntVector) -> Self {
        Self { permutation: [0, 1, 2], offset }
    }


    pub fn new(permutation: &[usize], offset: IntVector) -> Result<Self, Error> {
        Error::check_dim(offset.dim().value(), permutation.len())?;
        let mut seen = [false; MAX_DIM];
        let mut perm = [0, 1, 2];

        for (i, &p) in permutation.iter().enumerate() {
            if p >= permutation.len() || seen[p] {
                return Err(Error::InvalidIdentifier(format!("axis permutation {:?}", permutation)))
            }
            seen[p] = true;
            perm[i] = p;
        }
        Ok(Self { permutation: perm, offset })
    }


    pub fn dim(&self) -> Dimension {
        self.offset.dim()
    }


    pub fn offset(&self) -> &IntVector {
        &self.offset
    }


    pub fn is_identity(&self) -> bool {
        self.offset == IntVector::zero(self.dim()) && !self.is_permuted()
    }


    pub fn is_permuted(&self) -> bool {
        self.dim().axes().any(|i| self.permutation[i] != i)
    }


    /**
     * Return the source axis that maps onto the given destination axis.
     */
    pub fn source_axis(&self, dst_axis: usize) -> usize {
        self.permutation[dst_axis]
    }


    /**
     * Compose with an additional shift applied after this transformation.
     */
    pub fn then_shift(&self, offset: &IntVector) -> Self {
        Self { permutation: self.permutation, offset: self.offset + *offset }
    }


    /**
     * Map a source index space (in natural axis order) to the destination.
     */
    pub fn transform_space(&self, space: &IndexSpace) -> Result<IndexSpace, Error> {
        self.dim().check(space.dim())?;

        if space.is_empty() {
            return Ok(IndexSpace::empty(space.dim()))
        }
        let (lo, hi) = (space.lower(), space.upper());
        let mut lower = IntVector::zero(self.dim());
        let mut upper = IntVector::zero(self.dim());

        for i in self.dim().axes() {
            lower[i] = lo[self.permutation[i]] + self.offset[i];
            upper[i] = hi[self.permutation[i]] + self.offset[i];
        }
        IndexSpace::new(lower, upper)
    }


    /**
     * Map a destination index (in natural axis order) back to the source.
     */
    pub fn inverse_index(&self, index: &IntVector) -> IntVector {
        let mut result = IntVector::zero(self.dim());

        for i in self.dim().axes() {
            result[self.permutation[i]] = index[i] - self.offset[i];
        }
        result
    }


    /**
     * Map the index space of a source array to the coordinates of a
     * destination array, undoing and redoing axis rotation if the centering
     * stores its arrays rotated.
     */
    pub fn transform_array_space(
        &self,
        centering: Centering,
        space: &IndexSpace,
        src_axis: usize,
        dst_axis: usize) -> Result<IndexSpace, Error>
    {
        if centering.is_rotated() {
            Ok(self.transform_space(&space.unrotate(src_axis))?.rotate(dst_axis))
        } else {
            self.transform_space(space)
        }
    }


    /**
     * Map an index in a destination array back to the corresponding index
     * in the source array.
     */
    pub fn inverse_array_index(
        &self,
        centering: Centering,
        index: &IntVector,
        dst_axis: usize,
        src_axis: usize) -> IntVector
    {
        if centering.is_rotated() {
            self.inverse_index(&index.unrotate(dst_axis)).rotate(src_axis)
        } else {
            self.inverse_index(index)
        }
    }
}




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * The result of intersecting a destination region with a transformed source
 * region: for each destination array, the ordered disjoint boxes (in that
 * array's coordinates) where source data is to be moved, and the
 * transformation taking source indexes to destination indexes.
 */
pub struct BoxOverlap {
    centering: Centering,
    dst_boxes: Vec<BoxContainer>,
    transformation: Transformation,
}




// ============================================================================
impl BoxOverlap {


    pub fn centering(&self) -> Centering {
        self.centering
    }


    pub fn dim(&self) -> Dimension {
        self.transformation.dim()
    }


    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }


    pub fn num_arrays(&self) -> usize {
        self.dst_boxes.len()
    }


    /**
     * Return the destination boxes for one array.
     */
    pub fn destination_boxes(&self, array: usize) -> &BoxContainer {
        &self.dst_boxes[array]
    }


    /**
     * Return the total number of destination values (per depth component).
     */
    pub fn num_indexes(&self) -> usize {
        self.dst_boxes.iter().map(BoxContainer::num_indexes).sum()
    }


    /**
     * An empty overlap signifies "nothing to transfer".
     */
    pub fn is_empty(&self) -> bool {
        self.dst_boxes.iter().all(BoxContainer::is_empty)
    }


    /**
     * Return this overlap if it has the expected centering, and
     * `InvalidOverlapType` otherwise.
     */
    pub fn expect(&self, centering: Centering) -> Result<&Self, Error> {
        if self.centering == centering {
            Ok(self)
        } else {
            Err(Error::InvalidOverlapType { expected: centering, found: self.centering })
        }
    }


    /**
     * Return this overlap restricted to a fill region, given in destination
     * cell coordinates.
     */
    pub fn clip(&self, fill_box: &IndexSpace) -> Result<Self, Error> {
        self.dim().check(fill_box.dim())?;
        let mut dst_boxes = self.dst_boxes.clone();

        for (array, boxes) in dst_boxes.iter_mut().enumerate() {
            boxes.intersect_boxes(&self.centering.region_space(fill_box, array))?
        }
        Ok(Self { centering: self.centering, dst_boxes, transformation: self.transformation })
    }


    /**
     * Build an overlap directly from destination boxes, e.g. the fill region
     * of a refine operator.
     */
    pub fn from_boxes(centering: Centering, dst_boxes: Vec<BoxContainer>, transformation: Transformation) -> Result<Self, Error> {
        let dim = transformation.dim();
        Error::check_dim(centering.num_arrays(dim), dst_boxes.len())?;

        for b in dst_boxes.iter().flat_map(|c| c.iter()) {
            dim.check(b.dim())?;
        }
        Ok(Self { centering, dst_boxes, transformation })
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]


/**
 * Describes the region where data of one centering exists on one patch: the
 * patch's cell index space and its ghost width.
 */
pub struct BoxGeometry {
    centering: Centering,
    space: IndexSpace,
    ghosts: IntVector,
}




// ============================================================================
impl BoxGeometry {


    pub fn new(centering: Centering, space: IndexSpace, ghosts: IntVector) -> Result<Self, Error> {
        space.dim().check(ghosts.dim())?;

        let ghosts = if centering.is_boundary_only() {
            IntVector::zero(space.dim())
        } else {
            ghosts
        };
        Ok(Self { centering, space, ghosts })
    }


    pub fn centering(&self) -> Centering {
        self.centering
    }


    pub fn dim(&self) -> Dimension {
        self.space.dim()
    }


    pub fn space(&self) -> &IndexSpace {
        &self.space
    }


    pub fn ghosts(&self) -> &IntVector {
        &self.ghosts
    }


    pub fn num_arrays(&self) -> usize {
        self.centering.num_arrays(self.dim())
    }


    /**
     * Return the index space of an array, including the ghost region.
     */
    pub fn array_space(&self, array: usize) -> IndexSpace {
        let ghost_box = self.space.grow(&self.ghosts).unwrap_or(self.space);
        self.centering.array_space(&ghost_box, array)
    }


    /**
     * Return the index space of an array, excluding the ghost region.
     */
    pub fn interior_array_space(&self, array: usize) -> IndexSpace {
        self.centering.array_space(&self.space, array)
    }


    /**
     * Compute where source data lands in this (destination) geometry. Source
     * data is taken from the source patch interior restricted to
     * `src_mask` (in source coordinates), mapped by `transformation`, and
     * clipped to the destination ghost region and to `fill_box` (in
     * destination coordinates). Unless `overwrite_interior` is set, the
     * destination interior is excluded. Boundary-only data decomposes per
     * axis and side, and every destination index appears at most once.
     */
    pub fn calculate_overlap(
        &self,
        src: &BoxGeometry,
        src_mask: &IndexSpace,
        fill_box: &IndexSpace,
        overwrite_interior: bool,
        transformation: &Transformation) -> Result<BoxOverlap, Error>
    {
        let dim = self.dim();
        dim.check(src.dim())?;
        dim.check(src_mask.dim())?;
        dim.check(fill_box.dim())?;
        dim.check(transformation.dim())?;

        if src.centering != self.centering {
            return Err(Error::InvalidOverlapType { expected: self.centering, found: src.centering })
        }

        let centering = self.centering;
        let src_cells = src.space.intersection(src_mask)?;
        let mut dst_boxes = Vec::with_capacity(self.num_arrays());

        for array in 0..self.num_arrays() {
            let dst_region = self.array_space(array).intersection(&centering.region_space(fill_box, array))?;
            let mut boxes = BoxContainer::new();

            for src_array in source_arrays(centering, transformation, array, dim) {
                let dst_axis = centering.array_axis(array).unwrap_or(0);
                let src_axis = centering.array_axis(src_array).unwrap_or(0);
                let src_region = if centering.is_boundary_only() {
                    src.interior_array_space(src_array).intersection(&centering.region_space(src_mask, src_array))?
                } else {
                    centering.array_space(&src_cells, src_array)
                };
                let moved = transformation.transform_array_space(centering, &src_region, src_axis, dst_axis)?;
                boxes.push(moved.intersection(&dst_region)?);
            }

            if !overwrite_interior && !centering.is_boundary_only() {
                boxes.remove_intersections(&self.interior_array_space(array))?;
            }
            dst_boxes.push(boxes);
        }
        Ok(BoxOverlap { centering, dst_boxes, transformation: *transformation })
    }
}




/**
 * Return the source arrays that may feed a destination array. Dense
 * centerings have exactly one; boundary-only centerings search every side
 * (outerface: of the matching axis, outernode: of every axis).
 */
pub(crate) fn source_arrays(
    centering: Centering,
    transformation: &Transformation,
    array: usize,
    dim: Dimension) -> Vec<usize>
{
    match centering {
        Centering::Cell | Centering::Node => vec![0],
        Centering::Face | Centering::Edge => vec![transformation.source_axis(array)],
        Centering::Outerface => {
            let axis = transformation.source_axis(array / 2);
            vec![2 * axis, 2 * axis + 1]
        }
        Centering::Outernode => (0..2 * dim.value()).collect(),
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::index_space::range2d;

    fn iv(values: &[i64]) -> IntVector {
        IntVector::from_slice(values).unwrap()
    }

    fn geometry(centering: Centering, space: IndexSpace, ghosts: i64) -> BoxGeometry {
        BoxGeometry::new(centering, space, IntVector::uniform(space.dim(), ghosts)).unwrap()
    }

    fn everything() -> IndexSpace {
        range2d(-100..100, -100..100)
    }

    #[test]
    fn disjoint_cell_boxes_have_empty_overlap() {
        let dst = geometry(Centering::Cell, range2d(0..4, 0..4), 0);
        let src = geometry(Centering::Cell, range2d(4..8, 0..4), 0);
        let t = Transformation::identity(dst.dim());
        let overlap = dst.calculate_overlap(&src, &everything(), &everything(), true, &t).unwrap();
        assert!(overlap.is_empty());
        assert_eq!(overlap.num_indexes(), 0);
    }

    #[test]
    fn cell_ghost_overlap_excludes_interior() {
        let dst = geometry(Centering::Cell, range2d(0..4, 0..4), 1);
        let src = geometry(Centering::Cell, range2d(4..8, 0..4), 1);
        let t = Transformation::identity(dst.dim());
        let overlap = dst.calculate_overlap(&src, &everything(), &everything(), false, &t).unwrap();
        assert_eq!(overlap.destination_boxes(0).iter().collect::<Vec<_>>(), vec![&range2d(4..5, 0..4)]);
    }

    #[test]
    fn abutting_patches_share_a_node_column() {
        let dst = geometry(Centering::Node, range2d(0..4, 0..4), 0);
        let src = geometry(Centering::Node, range2d(4..8, 0..4), 0);
        let t = Transformation::identity(dst.dim());
        let overlap = dst.calculate_overlap(&src, &everything(), &everything(), true, &t).unwrap();
        assert_eq!(overlap.num_indexes(), 5);
    }

    #[test]
    fn outernode_overlap_counts_each_shared_node_once() {
        let dst = geometry(Centering::Outernode, range2d(0..4, 0..4), 0);
        let src = geometry(Centering::Outernode, range2d(4..8, 0..4), 0);
        let t = Transformation::identity(dst.dim());
        let overlap = dst.calculate_overlap(&src, &everything(), &everything(), true, &t).unwrap();
        assert_eq!(overlap.num_arrays(), 4);
        assert_eq!(overlap.num_indexes(), 5);
        // the shared column x = 4 lives in the upper side array of axis 0
        assert_eq!(overlap.destination_boxes(1).num_indexes(), 5);
    }

    #[test]
    fn outernode_arrays_partition_the_boundary() {
        let cells = IndexSpace::from_ranges(&[0..3, 0..4, 0..5]).unwrap();
        let total: usize = (0..6).map(|k| Centering::Outernode.array_space(&cells, k).len()).sum();
        let nodes = cells.to_nodes();
        assert_eq!(total, nodes.len() - cells.trim_all(0).to_nodes().trim_all(1).len());
    }

    #[test]
    fn face_arrays_are_rotated() {
        let cells = range2d(0..4, 0..2);
        assert_eq!(Centering::Face.array_space(&cells, 0), range2d(0..5, 0..2));
        assert_eq!(Centering::Face.array_space(&cells, 1), range2d(0..3, 0..4));
        assert_eq!(Centering::Outerface.region_space(&cells, 3), range2d(0..3, 0..4));
        assert_eq!(Centering::Outernode.region_space(&cells, 1), range2d(0..5, 0..3));
    }

    #[test]
    fn periodic_shift_moves_source_region() {
        let dst = geometry(Centering::Cell, range2d(0..4, 0..4), 1);
        let src = geometry(Centering::Cell, range2d(12..16, 0..4), 1);
        let t = Transformation::shift(iv(&[-16, 0]));
        let overlap = dst.calculate_overlap(&src, &everything(), &everything(), false, &t).unwrap();
        assert_eq!(overlap.destination_boxes(0).iter().collect::<Vec<_>>(), vec![&range2d(-1..0, 0..4)]);
        assert_eq!(t.inverse_index(&iv(&[-1, 2])), iv(&[15, 2]));
    }

    #[test]
    fn permuted_face_overlap_swaps_arrays() {
        let t = Transformation::new(&[1, 0], iv(&[0, 0])).unwrap();
        let dst = geometry(Centering::Face, range2d(0..4, 0..2), 0);
        let src = geometry(Centering::Face, range2d(0..2, 0..4), 0);
        let overlap = dst.calculate_overlap(&src, &everything(), &everything(), true, &t).unwrap();
        assert_eq!(overlap.destination_boxes(0).num_indexes(), 10);
        assert_eq!(overlap.destination_boxes(1).num_indexes(), 12);
    }

    #[test]
    fn mismatched_centering_and_dimension_are_rejected() {
        let dst = geometry(Centering::Cell, range2d(0..4, 0..4), 0);
        let src = geometry(Centering::Node, range2d(0..4, 0..4), 0);
        let t = Transformation::identity(dst.dim());
        assert!(matches!(
            dst.calculate_overlap(&src, &everything(), &everything(), true, &t),
            Err(Error::InvalidOverlapType { .. })));

        let src = geometry(Centering::Cell, IndexSpace::from_ranges(&[0..4]).unwrap(), 0);
        assert!(matches!(
            dst.calculate_overlap(&src, &everything(), &everything(), true, &t),
            Err(Error::DimensionMismatch { .. })));
    }
}
