use crate::error::Error;
use crate::index_space::{IndexSpace, IntVector};
use crate::overlap::{source_arrays, BoxGeometry, BoxOverlap, Centering};
use crate::variable::CombineMode;




#[derive(Clone, Debug, PartialEq)]


/**
 * A block of field values over one index space. The backing buffer holds
 * `depth` consecutive row-major arrays, one per component.
 */
pub struct ArrayData {
    space: IndexSpace,
    depth: usize,
    data: Vec<f64>,
}




// ============================================================================
impl ArrayData {


    pub fn new(space: IndexSpace, depth: usize) -> Self {
        Self { space, depth, data: vec![0.0; space.len() * depth] }
    }


    pub fn space(&self) -> &IndexSpace {
        &self.space
    }


    pub fn depth(&self) -> usize {
        self.depth
    }


    /**
     * Return the values of one depth component, in row-major order.
     */
    pub fn component(&self, d: usize) -> &[f64] {
        let n = self.space.len();
        &self.data[d * n..(d + 1) * n]
    }


    pub fn component_mut(&mut self, d: usize) -> &mut [f64] {
        let n = self.space.len();
        &mut self.data[d * n..(d + 1) * n]
    }


    /**
     * Return the value at an index and depth component. Like slice
     * indexing, this panics if the index is outside the array; kernels
     * check their regions up front and use it in their inner loops.
     */
    pub fn get(&self, index: &IntVector, d: usize) -> f64 {
        if let Err(e) = self.check_index(index, d) {
            panic!("{}", e)
        }
        self.component(d)[self.space.row_major_offset(index)]
    }


    pub fn get_mut(&mut self, index: &IntVector, d: usize) -> &mut f64 {
        if let Err(e) = self.check_index(index, d) {
            panic!("{}", e)
        }
        let offset = self.space.row_major_offset(index);
        &mut self.component_mut(d)[offset]
    }


    /**
     * Return the value at an index and depth component, or
     * `IndexOutOfRange` if the array does not hold it.
     */
    pub fn try_get(&self, index: &IntVector, d: usize) -> Result<f64, Error> {
        self.check_index(index, d)?;
        Ok(self.component(d)[self.space.row_major_offset(index)])
    }


    pub fn try_get_mut(&mut self, index: &IntVector, d: usize) -> Result<&mut f64, Error> {
        self.check_index(index, d)?;
        let offset = self.space.row_major_offset(index);
        Ok(&mut self.component_mut(d)[offset])
    }


    pub fn fill_all(&mut self, value: f64) {
        for x in &mut self.data {
            *x = value
        }
    }


    fn check_index(&self, index: &IntVector, d: usize) -> Result<(), Error> {
        if !self.space.contains(index)? || d >= self.depth {
            return Err(Error::IndexOutOfRange(format!(
                "index {:?} (depth {}) out of range on array {:?} of depth {}",
                index.as_slice(),
                d,
                self.space,
                self.depth)))
        }
        Ok(())
    }
}




#[derive(Clone, Debug, PartialEq)]


/**
 * The field values of one component on one patch. The data is split into
 * arrays according to its centering (see `Centering::num_arrays`), each
 * covering the patch box plus its ghost region. The simulation time the
 * values correspond to is carried along for time interpolation.
 */
pub struct PatchData {
    geometry: BoxGeometry,
    depth: usize,
    time: f64,
    arrays: Vec<ArrayData>,
}




// ============================================================================
impl PatchData {


    pub fn new(geometry: BoxGeometry, depth: usize) -> Self {
        let arrays = (0..geometry.num_arrays())
            .map(|k| ArrayData::new(geometry.array_space(k), depth))
            .collect();
        Self { geometry, depth, time: 0.0, arrays }
    }


    /**
     * Generate patch data with values defined from a closure of the array
     * number, the index (in that array's coordinates), and the depth
     * component.
     */
    pub fn from_function<F>(geometry: BoxGeometry, depth: usize, f: F) -> Self
    where
        F: Fn(usize, &IntVector, usize) -> f64
    {
        let mut result = Self::new(geometry, depth);

        for (k, array) in result.arrays.iter_mut().enumerate() {
            let space = *array.space();
            for d in 0..depth {
                for (x, index) in array.component_mut(d).iter_mut().zip(space.iter()) {
                    *x = f(k, &index, d)
                }
            }
        }
        result
    }


    pub fn geometry(&self) -> &BoxGeometry {
        &self.geometry
    }


    pub fn centering(&self) -> Centering {
        self.geometry.centering()
    }


    pub fn depth(&self) -> usize {
        self.depth
    }


    pub fn time(&self) -> f64 {
        self.time
    }


    pub fn set_time(&mut self, time: f64) {
        self.time = time
    }


    pub fn num_arrays(&self) -> usize {
        self.arrays.len()
    }


    pub fn array(&self, k: usize) -> &ArrayData {
        &self.arrays[k]
    }


    pub fn array_mut(&mut self, k: usize) -> &mut ArrayData {
        &mut self.arrays[k]
    }


    pub fn fill_all(&mut self, value: f64) {
        for array in &mut self.arrays {
            array.fill_all(value)
        }
    }


    /**
     * Return the value at an index of the natural (unrotated) index space
     * of the given array's axis. Boundary-only data is searched across its
     * arrays. Returns `None` if no array holds the index.
     */
    pub fn value_at(&self, axis: usize, index: &IntVector, d: usize) -> Result<Option<f64>, Error> {
        let centering = self.centering();
        self.geometry.dim().check(index.dim())?;

        for k in 0..self.arrays.len() {
            let searched = match centering.array_axis(k) {
                Some(a) => a == axis || centering == Centering::Outernode,
                None => true,
            };
            let array_axis = centering.array_axis(k).unwrap_or(0);
            let local = if centering.is_rotated() { index.rotate(array_axis) } else { *index };

            if searched && self.arrays[k].space().contains(&local)? {
                return self.arrays[k].try_get(&local, d).map(Some)
            }
        }
        Ok(None)
    }


    /**
     * Append the source values for every destination index of the overlap
     * to `out`. This patch data is the source; the traversal order is array,
     * box, index (row-major), depth component, and is matched by `unpack`.
     */
    pub fn pack(&self, overlap: &BoxOverlap, out: &mut Vec<f64>) -> Result<(), Error> {
        let centering = overlap.expect(self.centering())?.centering();
        let transformation = overlap.transformation();
        let dim = self.geometry.dim();
        dim.check(overlap.dim())?;
        out.reserve(overlap.num_indexes() * self.depth);

        for k in 0..overlap.num_arrays() {
            let dst_axis = centering.array_axis(k).unwrap_or(0);
            let candidates = source_arrays(centering, transformation, k, dim);

            for space in overlap.destination_boxes(k) {
                for index in space.iter() {
                    let (src_array, src_index) = candidates
                        .iter()
                        .map(|&s| {
                            let src_axis = centering.array_axis(s).unwrap_or(0);
                            (s, transformation.inverse_array_index(centering, &index, dst_axis, src_axis))
                        })
                        .find(|(s, i)| matches!(self.arrays[*s].space().contains(i), Ok(true)))
                        .ok_or_else(|| Error::IndexOutOfRange(format!(
                            "{:?} has no source value on {:?}",
                            index.as_slice(),
                            self.geometry.space())))?;

                    for d in 0..self.depth {
                        out.push(self.arrays[src_array].get(&src_index, d))
                    }
                }
            }
        }
        Ok(())
    }


    /**
     * Consume values produced by `pack` for the same overlap, and combine
     * them into this (destination) patch data. Returns the number of values
     * consumed.
     */
    pub fn unpack(&mut self, overlap: &BoxOverlap, values: &[f64], mode: CombineMode) -> Result<usize, Error> {
        overlap.expect(self.centering())?;
        self.geometry.dim().check(overlap.dim())?;

        let needed = overlap.num_indexes() * self.depth;
        if values.len() < needed {
            return Err(Error::Codec(format!("expected {} values, found {}", needed, values.len())))
        }
        let mut source = values.iter();

        for k in 0..overlap.num_arrays() {
            let array = &mut self.arrays[k];

            for space in overlap.destination_boxes(k) {
                if !array.space().contains_space(space)? {
                    return Err(Error::IndexOutOfRange(format!("{:?} not inside {:?}", space, array.space())))
                }
                for index in space.iter() {
                    for d in 0..array.depth() {
                        let value = source.next().copied().unwrap_or(0.0);
                        let x = array.get_mut(&index, d);
                        match mode {
                            CombineMode::Copy => *x = value,
                            CombineMode::Sum => *x += value,
                        }
                    }
                }
            }
        }
        Ok(needed)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::index_space::range2d;
    use crate::overlap::Transformation;

    fn geometry(centering: Centering, space: IndexSpace, ghosts: i64) -> BoxGeometry {
        BoxGeometry::new(centering, space, IntVector::uniform(space.dim(), ghosts)).unwrap()
    }

    #[test]
    fn patch_data_from_function_works() {
        let g = geometry(Centering::Cell, range2d(4..10, 4..10), 1);
        let p = PatchData::from_function(g, 2, |_, i, d| (i[0] + i[1]) as f64 + d as f64 * 100.0);
        let index = IntVector::from_slice(&[5, 5]).unwrap();
        assert_eq!(p.array(0).get(&index, 0), 10.0);
        assert_eq!(p.array(0).get(&index, 1), 110.0);
        assert_eq!(p.array(0).space(), &range2d(3..11, 3..11));
    }

    #[test]
    fn copy_fills_ghosts_from_neighbor() {
        let dst_g = geometry(Centering::Cell, range2d(0..4, 0..4), 1);
        let src_g = geometry(Centering::Cell, range2d(4..8, 0..4), 1);
        let src = PatchData::from_function(src_g, 1, |_, i, _| (10 * i[0] + i[1]) as f64);
        let mut dst = PatchData::new(dst_g, 1);
        let t = Transformation::identity(dst_g.dim());
        let everything = range2d(-100..100, -100..100);
        let overlap = dst_g.calculate_overlap(&src_g, &everything, &everything, false, &t).unwrap();

        let mut stream = Vec::new();
        src.pack(&overlap, &mut stream).unwrap();
        assert_eq!(dst.unpack(&overlap, &stream, CombineMode::Copy).unwrap(), 4);
        assert_eq!(dst.array(0).get(&IntVector::from_slice(&[4, 2]).unwrap(), 0), 42.0);
        assert_eq!(dst.array(0).get(&IntVector::from_slice(&[3, 2]).unwrap(), 0), 0.0);
    }

    #[test]
    fn sum_adds_into_destination() {
        let g = geometry(Centering::Node, range2d(0..2, 0..2), 0);
        let src = PatchData::from_function(g, 1, |_, _, _| 2.5);
        let mut dst = PatchData::from_function(g, 1, |_, _, _| 1.0);
        let t = Transformation::identity(g.dim());
        let overlap = g.calculate_overlap(&g, g.space(), &range2d(-9..9, -9..9), true, &t).unwrap();

        let mut stream = Vec::new();
        src.pack(&overlap, &mut stream).unwrap();
        dst.unpack(&overlap, &stream, CombineMode::Sum).unwrap();
        assert!(dst.array(0).component(0).iter().all(|&x| x == 3.5));
    }

    #[test]
    fn unpack_rejects_wrong_overlap_type() {
        let cell = geometry(Centering::Cell, range2d(0..2, 0..2), 0);
        let node = geometry(Centering::Node, range2d(0..2, 0..2), 0);
        let t = Transformation::identity(cell.dim());
        let overlap = node.calculate_overlap(&node, node.space(), node.space(), true, &t).unwrap();
        let mut dst = PatchData::new(cell, 1);
        assert!(matches!(
            dst.unpack(&overlap, &[0.0; 9], CombineMode::Copy),
            Err(Error::InvalidOverlapType { .. })));
    }

    #[test]
    fn value_at_searches_outernode_arrays() {
        let g = geometry(Centering::Outernode, range2d(0..4, 0..4), 0);
        let p = PatchData::from_function(g, 1, |k, _, _| k as f64);
        assert_eq!(p.value_at(0, &IntVector::from_slice(&[4, 4]).unwrap(), 0).unwrap(), Some(1.0));
        assert_eq!(p.value_at(0, &IntVector::from_slice(&[2, 0]).unwrap(), 0).unwrap(), Some(2.0));
        assert_eq!(p.value_at(0, &IntVector::from_slice(&[2, 2]).unwrap(), 0).unwrap(), None);
        assert!(p.value_at(0, &IntVector::from_slice(&[2, 2, 2]).unwrap(), 0).is_err());
    }

    #[test]
    fn checked_access_reports_out_of_range() {
        let mut a = ArrayData::new(range2d(0..2, 0..3), 2);
        *a.try_get_mut(&IntVector::from_slice(&[1, 2]).unwrap(), 1).unwrap() = 5.0;
        assert_eq!(a.try_get(&IntVector::from_slice(&[1, 2]).unwrap(), 1).unwrap(), 5.0);
        assert!(matches!(a.try_get(&IntVector::from_slice(&[2, 0]).unwrap(), 0), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(a.try_get(&IntVector::from_slice(&[0, 0]).unwrap(), 2), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(a.try_get(&IntVector::from_slice(&[0]).unwrap(), 0), Err(Error::DimensionMismatch { .. })));
    }
}
