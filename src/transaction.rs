//! Transactions are the units of data movement of a communication round:
//! one source patch, one destination patch, one overlap, and one item of a
//! refine item list naming the components involved. Factories decide how
//! arriving values combine with the destination.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::box_container::PatchBox;
use crate::error::Error;
use crate::identifiers::BoxId;
use crate::index_space::IndexSpace;
use crate::overlap::BoxOverlap;
use crate::patch_level::PatchLevel;
use crate::variable::{CombineMode, ComponentSelector};




#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]


/**
 * How a transaction's source values are produced and combined into the
 * destination.
 */
pub enum CombinePolicy {
    /// Overwrite the destination with the source.
    Copy,
    /// Add the source into the destination.
    Sum,
    /// Overwrite the destination with a linear interpolation in time
    /// between an old and a new source.
    Interpolate,
}




// ============================================================================
impl CombinePolicy {
    pub fn mode(self) -> CombineMode {
        match self {
            CombinePolicy::Sum => CombineMode::Sum,
            CombinePolicy::Copy | CombinePolicy::Interpolate => CombineMode::Copy,
        }
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq)]


/**
 * The components one item of a communication round moves: `src` on the
 * source patch into `dst` on the destination patch. For time
 * interpolation, `src_told` and `src_tnew` hold the source at two times.
 */
pub struct RefineItem {
    pub dst: usize,
    pub src: usize,
    pub src_told: Option<usize>,
    pub src_tnew: Option<usize>,
}




// ============================================================================
impl RefineItem {
    pub fn new(dst: usize, src: usize) -> Self {
        Self { dst, src, src_told: None, src_tnew: None }
    }


    pub fn with_time_interpolation(self, src_told: usize, src_tnew: usize) -> Self {
        Self { src_told: Some(src_told), src_tnew: Some(src_tnew), ..self }
    }
}




#[derive(Clone, Debug)]


/**
 * One unit of data movement. A transaction holds no field data: the
 * levels are supplied when it is packed and unpacked.
 */
pub struct Transaction {
    dst_box: PatchBox,
    src_box: PatchBox,
    overlap: BoxOverlap,
    items: Arc<Vec<RefineItem>>,
    item_id: usize,
    policy: CombinePolicy,
    depth: usize,
    fill_time: f64,
}




// ============================================================================
impl Transaction {
    #[allow(clippy::too_many_arguments)]
    fn new(
        dst_level: &PatchLevel,
        src_level: &PatchLevel,
        overlap: &BoxOverlap,
        dst_box: &PatchBox,
        src_box: &PatchBox,
        items: &Arc<Vec<RefineItem>>,
        item_id: usize,
        fill_box: &IndexSpace,
        policy: CombinePolicy,
    ) -> Result<Self, Error> {
        dst_box.check_valid()?;
        src_box.check_valid()?;

        let dim = dst_level.dim();
        dim.check(src_level.dim())?;
        dim.check(dst_box.dim())?;
        dim.check(src_box.dim())?;
        dim.check(overlap.dim())?;

        let item = items.get(item_id).ok_or(Error::InvalidItem { item_id, num_items: items.len() })?;
        let info = dst_level.descriptor().component(item.dst)?;
        let src_info = src_level.descriptor().component(item.src)?;
        overlap.expect(info.variable.centering())?;
        overlap.expect(src_info.variable.centering())?;
        Error::check_dim(info.variable.depth(), src_info.variable.depth())?;

        for source in item.src_told.iter().chain(item.src_tnew.iter()) {
            Error::check_dim(info.variable.depth(), src_level.descriptor().component(*source)?.variable.depth())?;
        }

        Ok(Self {
            dst_box: *dst_box,
            src_box: *src_box,
            overlap: overlap.clip(fill_box)?,
            items: Arc::clone(items),
            item_id,
            policy,
            depth: info.variable.depth(),
            fill_time: 0.0,
        })
    }


    pub fn dst_box(&self) -> &PatchBox {
        &self.dst_box
    }


    pub fn src_box(&self) -> &PatchBox {
        &self.src_box
    }


    pub fn overlap(&self) -> &BoxOverlap {
        &self.overlap
    }


    pub fn item_id(&self) -> usize {
        self.item_id
    }


    pub fn item(&self) -> &RefineItem {
        &self.items[self.item_id]
    }


    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }


    pub fn source_rank(&self) -> usize {
        self.src_box.owner()
    }


    pub fn destination_rank(&self) -> usize {
        self.dst_box.owner()
    }


    /**
     * The order transactions are combined in: destination, then source
     * (including its periodic image), then item.
     */
    pub fn key(&self) -> (BoxId, BoxId, usize) {
        (self.dst_box.id(), self.src_box.id(), self.item_id)
    }


    /**
     * Number of values this transaction moves.
     */
    pub fn message_size(&self) -> usize {
        self.overlap.num_indexes() * self.depth
    }


    pub fn set_fill_time(&mut self, time: f64) {
        self.fill_time = time
    }


    /**
     * Append the values to be moved, read from the source patch on
     * `src_level`, to `stream`.
     */
    pub fn pack_stream(&self, src_level: &PatchLevel, stream: &mut Vec<f64>) -> Result<(), Error> {
        let patch = src_level.patch(&self.src_box.id().real())?;
        let item = self.item();

        match (self.policy, item.src_told, item.src_tnew) {
            (CombinePolicy::Interpolate, Some(told), Some(tnew)) => {
                let old = patch.data(told)?;
                let new = patch.data(tnew)?;
                let mut a = Vec::new();
                let mut b = Vec::new();
                old.pack(&self.overlap, &mut a)?;
                new.pack(&self.overlap, &mut b)?;

                let dt = new.time() - old.time();
                let alpha = if dt == 0.0 { 0.0 } else { (self.fill_time - old.time()) / dt };
                stream.extend(a.iter().zip(&b).map(|(x, y)| x + alpha * (y - x)));
                Ok(())
            }
            _ => patch.data(item.src)?.pack(&self.overlap, stream),
        }
    }


    /**
     * Combine values produced by `pack_stream` into the destination patch
     * on `dst_level`. Returns the number of values consumed.
     */
    pub fn unpack_stream(&self, dst_level: &mut PatchLevel, values: &[f64]) -> Result<usize, Error> {
        let dst = self.item().dst;
        dst_level
            .patch_mut(&self.dst_box.id())?
            .data_mut(dst)?
            .unpack(&self.overlap, values, self.policy.mode())
    }


    /**
     * Move data between two levels on this rank, without any encoding.
     */
    pub fn copy_local_data(&self, dst_level: &mut PatchLevel, src_level: &PatchLevel) -> Result<(), Error> {
        let mut buffer = Vec::with_capacity(self.message_size());
        self.pack_stream(src_level, &mut buffer)?;
        self.unpack_stream(dst_level, &buffer)?;
        Ok(())
    }


    /**
     * Move data between two patches of the same level on this rank.
     */
    pub fn copy_local_data_within(&self, level: &mut PatchLevel) -> Result<(), Error> {
        let mut buffer = Vec::with_capacity(self.message_size());
        self.pack_stream(level, &mut buffer)?;
        self.unpack_stream(level, &buffer)?;
        Ok(())
    }
}




/**
 * Creates the transactions of a communication round, with a combination
 * policy particular to the factory.
 */
pub trait TransactionFactory: Send + Sync {
    /**
     * The policy of transactions made by this factory.
     */
    fn policy(&self, use_time_interpolation: bool) -> CombinePolicy;

    /**
     * Create a transaction moving item `item_id` from `src_box` on
     * `src_level` to `dst_box` on `dst_level`, over the overlap clipped to
     * `fill_box`.
     */
    #[allow(clippy::too_many_arguments)]
    fn allocate(
        &self,
        dst_level: &PatchLevel,
        src_level: &PatchLevel,
        overlap: &BoxOverlap,
        dst_box: &PatchBox,
        src_box: &PatchBox,
        items: &Arc<Vec<RefineItem>>,
        item_id: usize,
        fill_box: &IndexSpace,
        use_time_interpolation: bool,
    ) -> Result<Transaction, Error> {
        Transaction::new(
            dst_level,
            src_level,
            overlap,
            dst_box,
            src_box,
            items,
            item_id,
            fill_box,
            self.policy(use_time_interpolation))
    }


    /**
     * Same as `allocate` with the fill box set to the destination level's
     * full box and no time interpolation.
     */
    #[allow(clippy::too_many_arguments)]
    fn allocate_default(
        &self,
        dst_level: &PatchLevel,
        src_level: &PatchLevel,
        overlap: &BoxOverlap,
        dst_box: &PatchBox,
        src_box: &PatchBox,
        items: &Arc<Vec<RefineItem>>,
        item_id: usize,
    ) -> Result<Transaction, Error> {
        let fill_box = dst_level.full_box();
        self.allocate(dst_level, src_level, overlap, dst_box, src_box, items, item_id, &fill_box, false)
    }


    /**
     * Prepare destination components before any transaction of a round
     * executes.
     */
    fn preprocess_scratch_space(&self, _level: &mut PatchLevel, _time: f64, _selector: &ComponentSelector) -> Result<(), Error> {
        Ok(())
    }
}




#[derive(Clone, Copy, Debug, Default)]


/**
 * Makes overwriting transactions, or time-interpolating ones when asked.
 */
pub struct StandardTransactionFactory;




// ============================================================================
impl TransactionFactory for StandardTransactionFactory {
    fn policy(&self, use_time_interpolation: bool) -> CombinePolicy {
        if use_time_interpolation {
            CombinePolicy::Interpolate
        } else {
            CombinePolicy::Copy
        }
    }
}




#[derive(Clone, Copy, Debug, Default)]


/**
 * Makes transactions that add their values into the destination. Values
 * shared by several patches end up as the sum of every contribution;
 * callers wanting an average divide afterwards.
 */
pub struct SumTransactionFactory;




// ============================================================================
impl TransactionFactory for SumTransactionFactory {
    fn policy(&self, _use_time_interpolation: bool) -> CombinePolicy {
        CombinePolicy::Sum
    }


    /**
     * Zero every selected component on every local patch. Only
     * boundary-only (outernode, outerface) components can be summed.
     */
    fn preprocess_scratch_space(&self, level: &mut PatchLevel, time: f64, selector: &ComponentSelector) -> Result<(), Error> {
        for patch in level.patches_mut() {
            for component in selector.iter() {
                let data = patch.data_mut(component)?;

                if !data.centering().is_boundary_only() {
                    return Err(Error::InvalidPatchDataType { component, found: data.centering() })
                }
                data.fill_all(0.0);
                data.set_time(time);
            }
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::identifiers::LocalId;
    use crate::index_space::{range2d, Dimension, IntVector};
    use crate::overlap::{Centering, Transformation};
    use crate::variable::{PatchDescriptor, Variable};

    fn dim() -> Dimension {
        Dimension::new(2).unwrap()
    }

    fn iv(x: i64, y: i64) -> IntVector {
        IntVector::from_slice(&[x, y]).unwrap()
    }

    /// Four 4x4 patches around the node (4, 4), with an outernode source
    /// (component 0), an outernode destination (1), and a cell field (2).
    fn level() -> PatchLevel {
        let mut descriptor = PatchDescriptor::new(dim());
        let onode = Arc::new(Variable::new("onode", Centering::Outernode, 1).with_combine(CombineMode::Sum));
        descriptor.register("src", Arc::clone(&onode), IntVector::zero(dim())).unwrap();
        descriptor.register("dst", onode, IntVector::zero(dim())).unwrap();
        descriptor.register("rho", Arc::new(Variable::new("rho", Centering::Cell, 1)), IntVector::one(dim())).unwrap();

        let spaces = [range2d(0..4, 0..4), range2d(4..8, 0..4), range2d(0..4, 4..8), range2d(4..8, 4..8)];
        let boxes = spaces
            .iter()
            .enumerate()
            .map(|(n, s)| PatchBox::new(*s, 0, LocalId::new(n as i32)))
            .collect();
        let mut level = PatchLevel::new(0, 0, boxes, Arc::new(descriptor), iv(1, 1), iv(1, 1)).unwrap();
        level.allocate(&(0..3).collect()).unwrap();
        level
    }

    fn items() -> Arc<Vec<RefineItem>> {
        Arc::new(vec![RefineItem::new(1, 0), RefineItem::new(2, 2)])
    }

    fn sum_transactions(level: &PatchLevel) -> Vec<Transaction> {
        let boxes: Vec<_> = level.boxes().copied().collect();
        let items = items();
        let t = Transformation::identity(dim());
        let mut result = Vec::new();

        for dst in &boxes {
            for src in &boxes {
                let dst_g = level.descriptor().geometry(1, dst.space()).unwrap();
                let src_g = level.descriptor().geometry(0, src.space()).unwrap();
                let everything = range2d(-9..17, -9..17);
                let overlap = dst_g.calculate_overlap(&src_g, &everything, &everything, true, &t).unwrap();
                result.push(SumTransactionFactory.allocate_default(level, level, &overlap, dst, src, &items, 0).unwrap());
            }
        }
        result
    }

    fn corner_value(level: &PatchLevel, n: i32) -> f64 {
        let patch = level.patch(&BoxId::new(0, LocalId::new(n))).unwrap();
        patch.data(1).unwrap().value_at(0, &iv(4, 4), 0).unwrap().unwrap()
    }

    #[test]
    fn preprocess_zero_fills_boundary_components() {
        let mut level = level();
        for patch in level.patches_mut() {
            patch.data_mut(1).unwrap().fill_all(9.0);
        }
        let selector: ComponentSelector = std::iter::once(1).collect();
        SumTransactionFactory.preprocess_scratch_space(&mut level, 2.0, &selector).unwrap();

        for patch in level.patches() {
            let data = patch.data(1).unwrap();
            assert!((0..data.num_arrays()).all(|k| data.array(k).component(0).iter().all(|&x| x == 0.0)));
            assert_eq!(data.time(), 2.0);
        }
        let cells: ComponentSelector = std::iter::once(2).collect();
        assert!(matches!(
            SumTransactionFactory.preprocess_scratch_space(&mut level, 0.0, &cells),
            Err(Error::InvalidPatchDataType { component: 2, found: Centering::Cell })));
    }

    #[test]
    fn sum_is_independent_of_execution_order() {
        let values = [3.0, 5.0, 0.5, 1.25];
        let mut results = Vec::new();

        for rotation in 0..4 {
            let mut level = level();
            for (n, v) in values.iter().enumerate() {
                level.patch_mut(&BoxId::new(0, LocalId::new(n as i32))).unwrap().data_mut(0).unwrap().fill_all(*v);
            }
            SumTransactionFactory.preprocess_scratch_space(&mut level, 0.0, &std::iter::once(1).collect()).unwrap();

            let mut transactions = sum_transactions(&level);
            transactions.rotate_left(rotation * 3);
            if rotation % 2 == 1 {
                transactions.reverse();
            }
            for t in &transactions {
                t.copy_local_data_within(&mut level).unwrap();
            }
            results.push((0..4).map(|n| corner_value(&level, n)).collect::<Vec<_>>());
        }
        for r in &results {
            assert_eq!(r, &vec![9.75; 4]);
        }
    }

    #[test]
    fn empty_overlap_is_a_no_op() {
        let mut level = level();
        let boxes: Vec<_> = level.boxes().copied().collect();
        let dst_g = level.descriptor().geometry(2, boxes[0].space()).unwrap();
        let src_g = level.descriptor().geometry(2, boxes[3].space()).unwrap();
        let t = Transformation::identity(dim());
        let overlap = dst_g.calculate_overlap(&src_g, &range2d(6..8, 6..8), &range2d(-9..17, -9..17), false, &t).unwrap();
        assert!(overlap.is_empty());

        level.patch_mut(&boxes[0].id()).unwrap().data_mut(2).unwrap().fill_all(1.0);
        let before = level.patch(&boxes[0].id()).unwrap().data(2).unwrap().clone();
        let transaction = StandardTransactionFactory.allocate_default(&level, &level, &overlap, &boxes[0], &boxes[3], &items(), 1).unwrap();
        assert_eq!(transaction.message_size(), 0);
        transaction.copy_local_data_within(&mut level).unwrap();
        assert_eq!(level.patch(&boxes[0].id()).unwrap().data(2).unwrap(), &before);
    }

    #[test]
    fn allocate_checks_preconditions() {
        let level = level();
        let boxes: Vec<_> = level.boxes().copied().collect();
        let g = level.descriptor().geometry(2, boxes[0].space()).unwrap();
        let overlap = g.calculate_overlap(&g, g.space(), g.space(), true, &Transformation::identity(dim())).unwrap();
        let unassigned = PatchBox::new(*boxes[0].space(), 0, LocalId::INVALID);

        assert!(matches!(
            StandardTransactionFactory.allocate_default(&level, &level, &overlap, &unassigned, &boxes[0], &items(), 1),
            Err(Error::InvalidIdentifier(_))));
        assert!(matches!(
            StandardTransactionFactory.allocate_default(&level, &level, &overlap, &boxes[0], &boxes[0], &items(), 5),
            Err(Error::InvalidItem { item_id: 5, num_items: 2 })));
        assert!(matches!(
            StandardTransactionFactory.allocate_default(&level, &level, &overlap, &boxes[0], &boxes[0], &items(), 0),
            Err(Error::InvalidOverlapType { .. })));

        let line = PatchBox::new(IndexSpace::from_ranges(&[0..4]).unwrap(), 0, LocalId::new(0));
        assert!(matches!(
            StandardTransactionFactory.allocate_default(&level, &level, &overlap, &line, &boxes[0], &items(), 1),
            Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn source_depth_must_match_destination() {
        let mut descriptor = PatchDescriptor::new(dim());
        descriptor.register("dst", Arc::new(Variable::new("dst", Centering::Cell, 1)), IntVector::one(dim())).unwrap();
        descriptor.register("src", Arc::new(Variable::new("src", Centering::Cell, 2)), IntVector::zero(dim())).unwrap();
        let boxes = vec![
            PatchBox::new(range2d(0..2, 0..1), 0, LocalId::new(0)),
            PatchBox::new(range2d(2..4, 0..1), 0, LocalId::new(1)),
        ];
        let level = PatchLevel::new(0, 0, boxes.clone(), Arc::new(descriptor), iv(1, 1), iv(1, 1)).unwrap();

        let shift = Transformation::shift(iv(-2, 0));
        let dst_g = level.descriptor().geometry(0, boxes[0].space()).unwrap();
        let src_g = level.descriptor().geometry(1, boxes[1].space()).unwrap();
        let everything = range2d(-9..17, -9..17);
        let overlap = dst_g.calculate_overlap(&src_g, &everything, &everything, true, &shift).unwrap();
        let items = Arc::new(vec![RefineItem::new(0, 1)]);

        assert!(matches!(
            StandardTransactionFactory.allocate_default(&level, &level, &overlap, &boxes[0], &boxes[1], &items, 0),
            Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn default_allocation_matches_explicit_defaults() {
        let level = level();
        let boxes: Vec<_> = level.boxes().copied().collect();
        let dst_g = level.descriptor().geometry(2, boxes[0].space()).unwrap();
        let src_g = level.descriptor().geometry(2, boxes[1].space()).unwrap();
        let everything = range2d(-9..17, -9..17);
        let overlap = dst_g.calculate_overlap(&src_g, &everything, &everything, false, &Transformation::identity(dim())).unwrap();

        let a = StandardTransactionFactory.allocate_default(&level, &level, &overlap, &boxes[0], &boxes[1], &items(), 1).unwrap();
        let b = StandardTransactionFactory.allocate(&level, &level, &overlap, &boxes[0], &boxes[1], &items(), 1, &level.full_box(), false).unwrap();
        assert_eq!(a.overlap(), b.overlap());
        assert_eq!(a.policy(), b.policy());
        assert_eq!(a.message_size(), 4);
    }

    #[test]
    fn interpolation_blends_old_and_new_sources() {
        let mut descriptor = PatchDescriptor::new(dim());
        let var = Arc::new(Variable::new("u", Centering::Cell, 1).with_time_interpolation(true));
        for name in &["dst", "old", "new"] {
            descriptor.register(name, Arc::clone(&var), IntVector::one(dim())).unwrap();
        }
        let boxes = vec![
            PatchBox::new(range2d(0..4, 0..4), 0, LocalId::new(0)),
            PatchBox::new(range2d(4..8, 0..4), 0, LocalId::new(1)),
        ];
        let mut level = PatchLevel::new(0, 0, boxes.clone(), Arc::new(descriptor), iv(1, 1), iv(1, 1)).unwrap();
        level.allocate(&(0..3).collect()).unwrap();
        {
            let patch = level.patch_mut(&boxes[1].id()).unwrap();
            patch.data_mut(1).unwrap().fill_all(2.0);
            patch.data_mut(1).unwrap().set_time(1.0);
            patch.data_mut(2).unwrap().fill_all(4.0);
            patch.data_mut(2).unwrap().set_time(2.0);
        }
        let items = Arc::new(vec![RefineItem::new(0, 1).with_time_interpolation(1, 2)]);
        let dst_g = level.descriptor().geometry(0, boxes[0].space()).unwrap();
        let src_g = level.descriptor().geometry(1, boxes[1].space()).unwrap();
        let everything = range2d(-9..17, -9..17);
        let overlap = dst_g.calculate_overlap(&src_g, &everything, &everything, false, &Transformation::identity(dim())).unwrap();

        let mut t = StandardTransactionFactory.allocate(&level, &level, &overlap, &boxes[0], &boxes[1], &items, 0, &everything, true).unwrap();
        assert_eq!(t.policy(), CombinePolicy::Interpolate);
        t.set_fill_time(1.25);
        t.copy_local_data_within(&mut level).unwrap();
        let value = level.patch(&boxes[0].id()).unwrap().data(0).unwrap().array(0).get(&iv(4, 1), 0);
        assert_eq!(value, 2.5);
    }
}
