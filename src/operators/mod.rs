//! Spatial operators moving data between levels of different resolution:
//! refine (coarse to fine) and coarsen (fine to coarse).
//!
//! Every kernel here fills a destination array region row by row. Rows are
//! disjoint slices of the destination buffer, so the parallel path hands
//! each row to exactly one rayon task and produces the same values as the
//! scalar path.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::index_space::{IndexSpace, IntVector};
use crate::overlap::{BoxOverlap, Centering};
use crate::patch::Patch;
use crate::patch_data::ArrayData;

pub mod coarsen;
pub mod constant_refine;

pub use coarsen::{CellAverageCoarsen, NodeInjectionCoarsen};
pub use constant_refine::{CellConstantRefine, EdgeConstantRefine, FaceConstantRefine};




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]


/**
 * How a kernel traverses its destination: on the calling thread, or split
 * across the rayon thread pool. The default is `Parallel` when the crate is
 * built with the `parallel` feature.
 */
pub enum ExecutionPath {
    Scalar,
    Parallel,
}




// ============================================================================
impl Default for ExecutionPath {
    fn default() -> Self {
        if cfg!(feature = "parallel") {
            ExecutionPath::Parallel
        } else {
            ExecutionPath::Scalar
        }
    }
}




/**
 * Fills the part of a fine patch described by an overlap, with values
 * derived from a coarse patch.
 */
pub trait RefineOperator: Send + Sync {

    /// The centering of the data this operator works on.
    fn centering(&self) -> Centering;

    /// Coarse cells beyond a fine region that the operator reads.
    fn stencil_width(&self) -> i64;

    fn refine(
        &self,
        fine: &mut Patch,
        coarse: &Patch,
        dst_component: usize,
        src_component: usize,
        fine_overlap: &BoxOverlap,
        ratio: &IntVector) -> Result<(), Error>;
}




/**
 * Fills a region of a coarse patch (given in coarse cells) with values
 * derived from a fine patch.
 */
pub trait CoarsenOperator: Send + Sync {
    fn centering(&self) -> Centering;

    fn coarsen(
        &self,
        coarse: &mut Patch,
        fine: &Patch,
        dst_component: usize,
        src_component: usize,
        coarse_box: &IndexSpace,
        ratio: &IntVector) -> Result<(), Error>;
}




/**
 * Set every value of `array` within `region` to `f(index, depth)`. The
 * region must lie inside the array.
 */
pub(crate) fn fill_region<F>(path: ExecutionPath, array: &mut ArrayData, region: &IndexSpace, f: F) -> Result<(), Error>
where
    F: Fn(&IntVector, usize) -> f64 + Sync
{
    let space = *array.space();

    if region.is_empty() {
        return Ok(())
    }
    if !space.contains_space(region)? {
        return Err(Error::IndexOutOfRange(format!("{:?} not inside {:?}", region, space)))
    }

    let last = space.dim().value() - 1;
    let shape = space.shape();
    let lower = space.lower();
    let row_len = shape[last];

    for d in 0..array.depth() {
        let f = &f;
        let kernel = move |k: usize, row: &mut [f64]| {
            let mut index = lower;
            let mut rem = k;

            for a in (0..last).rev() {
                index[a] = lower[a] + (rem % shape[a]) as i64;
                rem /= shape[a];
            }
            if (0..last).any(|a| !region.range(a).contains(&index[a])) {
                return
            }
            for i in region.range(last) {
                index[last] = i;
                row[(i - lower[last]) as usize] = f(&index, d);
            }
        };
        let values = array.component_mut(d);

        match path {
            ExecutionPath::Scalar => values
                .chunks_mut(row_len)
                .enumerate()
                .for_each(|(k, row)| kernel(k, row)),
            ExecutionPath::Parallel => values
                .par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(k, row)| kernel(k, row)),
        }
    }
    Ok(())
}




/**
 * Return an error unless a patch data component has the expected centering.
 */
pub(crate) fn check_centering(component: usize, found: Centering, expected: Centering) -> Result<(), Error> {
    if found != expected {
        return Err(Error::InvalidPatchDataType { component, found })
    }
    Ok(())
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::index_space::{range2d, Dimension};

    #[test]
    fn region_is_filled_and_nothing_else() {
        let mut array = ArrayData::new(range2d(-2..4, -2..4), 2);
        fill_region(ExecutionPath::Scalar, &mut array, &range2d(-1..1, 0..3), |i, d| (i[0] * 10 + i[1]) as f64 + d as f64).unwrap();
        assert_eq!(array.get(&IntVector::from_slice(&[-1, 2]).unwrap(), 0), -8.0);
        assert_eq!(array.get(&IntVector::from_slice(&[0, 0]).unwrap(), 1), 1.0);
        assert_eq!(array.get(&IntVector::from_slice(&[1, 0]).unwrap(), 0), 0.0);
        assert_eq!(array.get(&IntVector::from_slice(&[-1, -1]).unwrap(), 0), 0.0);
    }

    #[test]
    fn paths_agree() {
        let region = range2d(-3..5, -2..1);
        let mut a = ArrayData::new(range2d(-4..6, -4..6), 1);
        let mut b = a.clone();
        let f = |i: &IntVector, _: usize| (i[0] as f64).sin() * (i[1] as f64 + 0.25);
        fill_region(ExecutionPath::Scalar, &mut a, &region, f).unwrap();
        fill_region(ExecutionPath::Parallel, &mut b, &region, f).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn region_outside_array_is_rejected() {
        let mut array = ArrayData::new(range2d(0..4, 0..4), 1);
        assert!(matches!(
            fill_region(ExecutionPath::Scalar, &mut array, &range2d(2..6, 0..4), |_, _| 1.0),
            Err(Error::IndexOutOfRange(_))));
    }

    #[test]
    fn one_dimensional_arrays_are_one_row() {
        let space = IndexSpace::from_ranges(&[-3..3]).unwrap();
        let mut array = ArrayData::new(space, 1);
        fill_region(ExecutionPath::Parallel, &mut array, &space, |i, _| i[0] as f64).unwrap();
        assert_eq!(array.component(0), &[-3.0, -2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(space.dim(), Dimension::new(1).unwrap());
    }
}
