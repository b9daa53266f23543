use crate::error::Error;
use crate::index_space::{IndexSpace, IntVector};
use crate::overlap::Centering;
use crate::patch::Patch;
use super::{check_centering, fill_region, CoarsenOperator, ExecutionPath};




/**
 * Sets each coarse cell to the mean of the fine cells it covers.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CellAverageCoarsen {
    path: ExecutionPath,
}




// ============================================================================
impl CellAverageCoarsen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(path: ExecutionPath) -> Self {
        Self { path }
    }
}




// ============================================================================
impl CoarsenOperator for CellAverageCoarsen {

    fn centering(&self) -> Centering {
        Centering::Cell
    }

    fn coarsen(
        &self,
        coarse: &mut Patch,
        fine: &Patch,
        dst_component: usize,
        src_component: usize,
        coarse_box: &IndexSpace,
        ratio: &IntVector) -> Result<(), Error>
    {
        let (fdata, cdata) = component_pair(coarse, fine, dst_component, src_component, Centering::Cell, ratio)?;
        let farray = fdata.array(0);

        if !farray.space().contains_space(&coarse_box.refine(ratio)?)? {
            return Err(Error::IndexOutOfRange(format!("fine data {:?} does not cover {:?}", farray.space(), coarse_box)))
        }

        let dim = ratio.dim();
        let block = IndexSpace::new(IntVector::zero(dim), *ratio)?;
        let weight = 1.0 / block.len() as f64;

        fill_region(self.path, cdata.array_mut(0), coarse_box, |c, d| {
            let base = *c * *ratio;
            block.iter().map(|offset| farray.get(&(base + offset), d)).sum::<f64>() * weight
        })
    }
}




/**
 * Sets each coarse node to the value of the fine node at the same position.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeInjectionCoarsen {
    path: ExecutionPath,
}




// ============================================================================
impl NodeInjectionCoarsen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(path: ExecutionPath) -> Self {
        Self { path }
    }
}




// ============================================================================
impl CoarsenOperator for NodeInjectionCoarsen {

    fn centering(&self) -> Centering {
        Centering::Node
    }

    fn coarsen(
        &self,
        coarse: &mut Patch,
        fine: &Patch,
        dst_component: usize,
        src_component: usize,
        coarse_box: &IndexSpace,
        ratio: &IntVector) -> Result<(), Error>
    {
        let (fdata, cdata) = component_pair(coarse, fine, dst_component, src_component, Centering::Node, ratio)?;
        let farray = fdata.array(0);
        let nodes = coarse_box.to_nodes();

        if !farray.space().contains_space(&coarse_box.refine(ratio)?.to_nodes())? {
            return Err(Error::IndexOutOfRange(format!("fine data {:?} does not cover {:?}", farray.space(), coarse_box)))
        }
        fill_region(self.path, cdata.array_mut(0), &nodes, |c, d| farray.get(&(*c * *ratio), d))
    }
}




fn component_pair<'a>(
    coarse: &'a mut Patch,
    fine: &'a Patch,
    dst_component: usize,
    src_component: usize,
    centering: Centering,
    ratio: &IntVector) -> Result<(&'a crate::patch_data::PatchData, &'a mut crate::patch_data::PatchData), Error>
{
    let dim = coarse.space().dim();
    dim.check(fine.space().dim())?;
    dim.check(ratio.dim())?;

    let fdata = fine.data(src_component)?;
    let cdata = coarse.data_mut(dst_component)?;
    check_centering(src_component, fdata.centering(), centering)?;
    check_centering(dst_component, cdata.centering(), centering)?;
    Error::check_dim(cdata.depth(), fdata.depth())?;
    Ok((fdata, cdata))
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use super::*;
    use crate::box_container::PatchBox;
    use crate::identifiers::LocalId;
    use crate::index_space::{range2d, Dimension};
    use crate::patch_data::PatchData;
    use crate::variable::{PatchDescriptor, Variable};

    fn dim() -> Dimension {
        Dimension::new(2).unwrap()
    }

    fn iv(x: i64, y: i64) -> IntVector {
        IntVector::from_slice(&[x, y]).unwrap()
    }

    fn patch(space: IndexSpace, centering: Centering, f: impl Fn(usize, &IntVector, usize) -> f64) -> Patch {
        let mut descriptor = PatchDescriptor::new(dim());
        descriptor.register("u", Arc::new(Variable::new("u", centering, 1)), IntVector::zero(dim())).unwrap();
        let mut patch = Patch::new(PatchBox::new(space, 0, LocalId::new(0)), 0);
        let geometry = descriptor.geometry(0, &space).unwrap();
        patch.set_data(0, PatchData::from_function(geometry, 1, f)).unwrap();
        patch
    }

    #[test]
    fn cell_average_of_linear_data_is_the_center_value() {
        let fine = patch(range2d(-4..4, -4..4), Centering::Cell, |_, i, _| (2 * i[0] + 3 * i[1]) as f64);
        let mut coarse = patch(range2d(-2..2, -2..2), Centering::Cell, |_, _, _| 0.0);

        CellAverageCoarsen::new()
            .coarsen(&mut coarse, &fine, 0, 0, &range2d(-2..2, -2..2), &iv(2, 2))
            .unwrap();

        let data = coarse.data(0).unwrap();
        assert_eq!(data.array(0).get(&iv(-1, 0), 0), 2.0 * -1.5 + 3.0 * 0.5);
        assert_eq!(data.array(0).get(&iv(1, 1), 0), 2.0 * 2.5 + 3.0 * 2.5);
    }

    #[test]
    fn node_injection_takes_coincident_nodes() {
        let fine = patch(range2d(0..4, 0..4), Centering::Node, |_, i, _| (i[0] * 10 + i[1]) as f64);
        let mut coarse = patch(range2d(0..2, 0..2), Centering::Node, |_, _, _| -1.0);

        NodeInjectionCoarsen::with_path(ExecutionPath::Parallel)
            .coarsen(&mut coarse, &fine, 0, 0, &range2d(0..2, 0..2), &iv(2, 2))
            .unwrap();

        let data = coarse.data(0).unwrap();
        assert_eq!(data.array(0).get(&iv(2, 1), 0), 42.0);
        assert_eq!(data.array(0).get(&iv(0, 0), 0), 0.0);
    }

    #[test]
    fn mismatched_data_is_rejected() {
        let fine = patch(range2d(0..4, 0..4), Centering::Cell, |_, _, _| 0.0);
        let mut coarse = patch(range2d(0..2, 0..2), Centering::Cell, |_, _, _| 0.0);
        let result = NodeInjectionCoarsen::new().coarsen(&mut coarse, &fine, 0, 0, &range2d(0..2, 0..2), &iv(2, 2));
        assert!(matches!(result, Err(Error::InvalidPatchDataType { component: 0, found: Centering::Cell })));

        let result = CellAverageCoarsen::new().coarsen(&mut coarse, &fine, 0, 0, &range2d(0..3, 0..2), &iv(2, 2));
        assert!(matches!(result, Err(Error::IndexOutOfRange(_))));
    }
}
