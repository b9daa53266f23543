use crate::error::Error;
use crate::index_space::{floor_div, IntVector};
use crate::overlap::{BoxOverlap, Centering};
use crate::patch::Patch;
use super::{check_centering, fill_region, ExecutionPath, RefineOperator};




/**
 * Copy each coarse value onto every fine index it covers. Works for every
 * centering whose arrays are stored in one (possibly rotated) frame per
 * array: fine index `i` reads coarse index `floor(i / r)` on each axis,
 * with the ratio rotated along with the array.
 */
fn refine_constant(
    centering: Centering,
    path: ExecutionPath,
    fine: &mut Patch,
    coarse: &Patch,
    dst_component: usize,
    src_component: usize,
    fine_overlap: &BoxOverlap,
    ratio: &IntVector) -> Result<(), Error>
{
    let dim = fine.space().dim();
    dim.check(coarse.space().dim())?;
    dim.check(ratio.dim())?;
    fine_overlap.expect(centering)?;

    let cdata = coarse.data(src_component)?;
    let fdata = fine.data_mut(dst_component)?;
    check_centering(src_component, cdata.centering(), centering)?;
    check_centering(dst_component, fdata.centering(), centering)?;
    Error::check_dim(cdata.depth(), fdata.depth())?;

    for k in 0..fine_overlap.num_arrays() {
        let r = match centering.array_axis(k) {
            Some(axis) if centering.is_rotated() => ratio.rotate(axis),
            _ => *ratio,
        };
        let carray = cdata.array(k);
        let cspace = *carray.space();

        for fine_box in fine_overlap.destination_boxes(k) {
            let needed = fine_box.coarsen(&r)?;

            if !cspace.contains_space(&needed)? {
                return Err(Error::IndexOutOfRange(format!("coarse data {:?} does not cover {:?}", cspace, needed)))
            }
            fill_region(path, fdata.array_mut(k), fine_box, |index, d| {
                let mut c = *index;
                for a in dim.axes() {
                    c[a] = floor_div(index[a], r[a])
                }
                carray.get(&c, d)
            })?;
        }
    }
    Ok(())
}




macro_rules! constant_refine {
    ($name:ident, $centering:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Default, PartialEq)]
        pub struct $name {
            path: ExecutionPath,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn with_path(path: ExecutionPath) -> Self {
                Self { path }
            }

            pub fn path(&self) -> ExecutionPath {
                self.path
            }
        }

        impl RefineOperator for $name {
            fn centering(&self) -> Centering {
                $centering
            }

            fn stencil_width(&self) -> i64 {
                0
            }

            fn refine(
                &self,
                fine: &mut Patch,
                coarse: &Patch,
                dst_component: usize,
                src_component: usize,
                fine_overlap: &BoxOverlap,
                ratio: &IntVector) -> Result<(), Error>
            {
                refine_constant($centering, self.path, fine, coarse, dst_component, src_component, fine_overlap, ratio)
            }
        }
    };
}

constant_refine!(CellConstantRefine, Centering::Cell, "Piecewise-constant refinement of cell data.");
constant_refine!(FaceConstantRefine, Centering::Face, "Piecewise-constant refinement of face data. Fine faces between coarse faces take the value of the coarse face below them.");
constant_refine!(EdgeConstantRefine, Centering::Edge, "Piecewise-constant refinement of edge data.");




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use super::*;
    use crate::box_container::{BoxContainer, PatchBox};
    use crate::identifiers::LocalId;
    use crate::index_space::{range2d, Dimension, IndexSpace};
    use crate::overlap::Transformation;
    use crate::patch_data::PatchData;
    use crate::variable::{PatchDescriptor, Variable};

    fn dim() -> Dimension {
        Dimension::new(2).unwrap()
    }

    fn iv(x: i64, y: i64) -> IntVector {
        IntVector::from_slice(&[x, y]).unwrap()
    }

    fn patch(space: IndexSpace, centering: Centering, ghosts: i64, f: impl Fn(usize, &IntVector, usize) -> f64) -> Patch {
        let mut descriptor = PatchDescriptor::new(dim());
        descriptor.register("u", Arc::new(Variable::new("u", centering, 1)), IntVector::uniform(dim(), ghosts)).unwrap();
        let mut patch = Patch::new(PatchBox::new(space, 0, LocalId::new(0)), 0);
        let geometry = descriptor.geometry(0, &space).unwrap();
        patch.set_data(0, PatchData::from_function(geometry, 1, f)).unwrap();
        patch
    }

    fn overlap(centering: Centering, boxes: Vec<IndexSpace>) -> BoxOverlap {
        let containers = boxes.into_iter().map(|b| BoxContainer::from(vec![b])).collect();
        BoxOverlap::from_boxes(centering, containers, Transformation::identity(dim())).unwrap()
    }

    fn coarse_value(_: usize, i: &IntVector, _: usize) -> f64 {
        (i[0] * 100 + i[1]) as f64 + 0.5
    }

    #[test]
    fn cell_refine_copies_covering_coarse_value() {
        let coarse = patch(range2d(-4..4, -4..4), Centering::Cell, 1, coarse_value);
        let mut fine = patch(range2d(-8..8, -8..8), Centering::Cell, 1, |_, _, _| 0.0);
        let region = range2d(-9..9, -9..9);

        CellConstantRefine::new()
            .refine(&mut fine, &coarse, 0, 0, &overlap(Centering::Cell, vec![region]), &iv(2, 2))
            .unwrap();

        let data = fine.data(0).unwrap();
        assert_eq!(data.array(0).get(&iv(-1, -3), 0), coarse_value(0, &iv(-1, -2), 0));
        assert_eq!(data.array(0).get(&iv(-9, 8), 0), coarse_value(0, &iv(-5, 4), 0));
        assert_eq!(data.array(0).get(&iv(3, 0), 0), coarse_value(0, &iv(1, 0), 0));
    }

    #[test]
    fn scalar_and_parallel_paths_are_identical() {
        let coarse = patch(range2d(-4..4, -4..4), Centering::Face, 1, |k, i, _| (k as f64 + 1.0) * coarse_value(0, i, 0));
        let boxes = vec![range2d(-8..9, -8..8).rotate(0), range2d(-8..8, -8..9).rotate(1)];
        let mut a = patch(range2d(-8..8, -8..8), Centering::Face, 0, |_, _, _| 0.0);
        let mut b = patch(range2d(-8..8, -8..8), Centering::Face, 0, |_, _, _| 0.0);

        FaceConstantRefine::with_path(ExecutionPath::Scalar)
            .refine(&mut a, &coarse, 0, 0, &overlap(Centering::Face, boxes.clone()), &iv(2, 2))
            .unwrap();
        FaceConstantRefine::with_path(ExecutionPath::Parallel)
            .refine(&mut b, &coarse, 0, 0, &overlap(Centering::Face, boxes), &iv(2, 2))
            .unwrap();

        assert_eq!(a.data(0).unwrap(), b.data(0).unwrap());
    }

    #[test]
    fn face_refine_uses_rotated_ratio() {
        let coarse = patch(range2d(0..4, 0..2), Centering::Face, 0, |k, i, _| (k * 1000) as f64 + coarse_value(0, i, 0));
        let mut fine = patch(range2d(0..8, 0..6), Centering::Face, 0, |_, _, _| 0.0);
        let boxes = vec![range2d(0..9, 0..4).rotate(0), range2d(0..8, 0..5).rotate(1)];

        FaceConstantRefine::new()
            .refine(&mut fine, &coarse, 0, 0, &overlap(Centering::Face, boxes), &iv(2, 2))
            .unwrap();

        let data = fine.data(0).unwrap();
        // x faces are stored (i, j); y faces are stored (j, i)
        assert_eq!(data.array(0).get(&iv(5, 3), 0), coarse_value(0, &iv(2, 1), 0));
        assert_eq!(data.array(1).get(&iv(3, 7), 0), 1000.0 + coarse_value(0, &iv(1, 3), 0));
    }

    #[test]
    fn wrong_overlap_kind_is_rejected() {
        let coarse = patch(range2d(0..4, 0..4), Centering::Cell, 0, coarse_value);
        let mut fine = patch(range2d(0..8, 0..8), Centering::Cell, 0, |_, _, _| 0.0);
        let result = CellConstantRefine::new().refine(
            &mut fine,
            &coarse,
            0,
            0,
            &overlap(Centering::Node, vec![range2d(0..9, 0..9)]),
            &iv(2, 2));
        assert!(matches!(result, Err(Error::InvalidOverlapType { .. })));
    }

    #[test]
    fn insufficient_coarse_data_is_rejected() {
        let coarse = patch(range2d(0..2, 0..2), Centering::Cell, 0, coarse_value);
        let mut fine = patch(range2d(0..8, 0..8), Centering::Cell, 0, |_, _, _| 0.0);
        let result = CellConstantRefine::new().refine(
            &mut fine,
            &coarse,
            0,
            0,
            &overlap(Centering::Cell, vec![range2d(0..8, 0..8)]),
            &iv(2, 2));
        assert!(matches!(result, Err(Error::IndexOutOfRange(_))));
    }
}
