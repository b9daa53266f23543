//! Filling a level's data, ghosts included, from the same level where it
//! exists and by refinement of the next coarser level elsewhere.
//!
//! Coarse data is first gathered onto a scratch level: the fine boxes
//! coarsened and grown by what the refine stencil reads, owned by the same
//! ranks as the fine boxes. The refine operators then run on each fine
//! patch with no further communication. Finally a same-level copy
//! overwrites everything that fine data exists for.

use std::sync::Arc;

use log::debug;

use crate::box_container::BoxContainer;
use crate::connector::Connector;
use crate::connector_width::RefineScheduleWidthRequestor;
use crate::error::Error;
use crate::hierarchy::PatchHierarchy;
use crate::index_space::{IndexSpace, IntVector};
use crate::message::Communicator;
use crate::operators::RefineOperator;
use crate::overlap::{BoxOverlap, Transformation};
use crate::patch::Patch;
use crate::patch_level::PatchLevel;
use crate::schedule::{Schedule, ScheduleBuilder};
use crate::transaction::{RefineItem, StandardTransactionFactory};
use crate::variable::{ComponentSelector, PatchDescriptor};




/**
 * The list of components a refine schedule fills, each with the operator
 * used to interpolate it from coarser data. Components registered without
 * an operator are only copied on the same level.
 */
#[derive(Clone, Default)]
pub struct RefineAlgorithm {
    classes: Vec<(RefineItem, Option<Arc<dyn RefineOperator>>)>,
}




// ============================================================================
impl RefineAlgorithm {


    pub fn new() -> Self {
        Self::default()
    }


    pub fn register_refine(&mut self, item: RefineItem, operator: Option<Arc<dyn RefineOperator>>) {
        self.classes.push((item, operator))
    }


    /**
     * Return the connector widths this algorithm's schedules need on the
     * given hierarchy, to be registered before levels are made.
     */
    pub fn width_requestor(&self, hierarchy: &PatchHierarchy) -> Result<RefineScheduleWidthRequestor, Error> {
        let dim = hierarchy.dim();
        let mut ghosts = IntVector::zero(dim);

        for (item, _) in &self.classes {
            ghosts = ghosts.pointwise_max(&hierarchy.descriptor().component(item.dst)?.ghosts)?;
        }
        RefineScheduleWidthRequestor::new(ghosts, IntVector::uniform(dim, self.stencil_width()))
    }


    fn stencil_width(&self) -> i64 {
        self.classes
            .iter()
            .filter_map(|(_, op)| op.as_ref().map(|op| op.stencil_width()))
            .max()
            .unwrap_or(0)
    }


    fn uses_time_interpolation(&self) -> bool {
        self.classes.iter().any(|(item, _)| item.src_told.is_some() && item.src_tnew.is_some())
    }


    /**
     * Build the schedule filling level `ln` of the hierarchy. Level 0, or
     * an algorithm without operators, only copies on the same level.
     */
    pub fn create_schedule(&self, hierarchy: &PatchHierarchy, ln: usize) -> Result<RefineSchedule, Error> {
        let level = hierarchy.level(ln)?;
        let connector = hierarchy.connector(ln, ln)?;
        let items = self.classes.iter().map(|(item, _)| *item).collect();
        let time_interpolation = self.uses_time_interpolation();

        let same_level = ScheduleBuilder::same_level(level, items, Arc::new(StandardTransactionFactory))
            .overwrite_interior(true)
            .time_interpolation(time_interpolation)
            .build(connector, connector)?;

        let operators: Vec<_> = self
            .classes
            .iter()
            .filter_map(|(item, op)| op.as_ref().map(|op| (*item, Arc::clone(op))))
            .collect();

        let coarse = if ln == 0 || operators.is_empty() {
            None
        } else {
            Some(CoarseFill::new(hierarchy, ln, operators, self.stencil_width(), time_interpolation)?)
        };
        Ok(RefineSchedule { level_number: ln, same_level, coarse })
    }
}




/**
 * Coarse data gathered onto a scratch level shaped like the fine level.
 */
struct CoarseFill {
    scratch: PatchLevel,
    schedule: Schedule,
    selector: ComponentSelector,
    ratio: IntVector,
    domain: IndexSpace,
    operators: Vec<(RefineItem, Arc<dyn RefineOperator>)>,
}




// ============================================================================
impl CoarseFill {


    fn new(
        hierarchy: &PatchHierarchy,
        ln: usize,
        operators: Vec<(RefineItem, Arc<dyn RefineOperator>)>,
        stencil_width: i64,
        time_interpolation: bool) -> Result<Self, Error>
    {
        let fine = hierarchy.level(ln)?;
        let coarse = hierarchy.level(ln - 1)?;
        let dim = hierarchy.dim();
        let ratio = hierarchy.ratio_to_coarser(ln);

        let mut ghosts = IntVector::zero(dim);
        for (item, _) in &operators {
            ghosts = ghosts.pointwise_max(&fine.descriptor().component(item.dst)?.ghosts)?;
        }
        let growth = ghosts.ceil_div(&ratio)? + IntVector::uniform(dim, stencil_width);
        let scratch = fine.coarsened(&ratio, &growth)?;

        let items: Vec<_> = operators
            .iter()
            .map(|(item, _)| RefineItem { dst: item.src, ..*item })
            .collect();
        let selector = items.iter().map(|item| item.dst).collect();

        let width = scratch.descriptor().max_ghost_width();
        let scratch_to_coarse = Connector::build(&scratch, coarse, &width)?;
        let coarse_to_scratch = Connector::build(coarse, &scratch, &width)?;

        let schedule = ScheduleBuilder::new(&scratch, coarse, items, Arc::new(StandardTransactionFactory))
            .overwrite_interior(true)
            .time_interpolation(time_interpolation)
            .build(&scratch_to_coarse, &coarse_to_scratch)?;

        let mut periodic_growth = IntVector::zero(dim);
        if let Some(shift) = hierarchy.periodic_shift(ln)? {
            for a in dim.axes().filter(|&a| shift[a] != 0) {
                periodic_growth[a] = ghosts[a]
            }
        }
        let domain = hierarchy
            .domain()
            .refine(&hierarchy.ratio_to_level_zero(ln))?
            .grow(&periodic_growth)?;

        debug!("level {} coarse fill through {} scratch boxes", ln, scratch.num_boxes());
        Ok(Self { scratch, schedule, selector, ratio, domain, operators })
    }


    /**
     * Gather coarse data onto the scratch level and refine it into `fine`.
     * The scratch data is released whether or not this succeeds.
     */
    fn fill<C: Communicator + ?Sized>(&mut self, comm: &C, fine: &mut PatchLevel, coarse: &PatchLevel, time: f64) -> Result<(), Error> {
        self.scratch.allocate(&self.selector)?;
        let result = self.gather_and_refine(comm, fine, coarse, time);
        self.scratch.deallocate(&self.selector);
        result
    }


    fn gather_and_refine<C: Communicator + ?Sized>(&mut self, comm: &C, fine: &mut PatchLevel, coarse: &PatchLevel, time: f64) -> Result<(), Error> {
        self.schedule.set_fill_time(time);
        self.schedule.execute_between(comm, &mut self.scratch, coarse)?;

        let descriptor = Arc::clone(fine.descriptor());

        for patch in fine.patches_mut() {
            let source = self.scratch.patch(&patch.id())?;

            for (item, operator) in &self.operators {
                let overlap = refine_overlap(&descriptor, patch, item.dst, &self.domain)?;
                operator.refine(patch, source, item.dst, item.src, &overlap, &self.ratio)?;
            }
        }
        Ok(())
    }
}




/**
 * The part of a fine patch's ghost region inside the domain, as an overlap
 * for the refine operators.
 */
fn refine_overlap(descriptor: &PatchDescriptor, patch: &Patch, component: usize, domain: &IndexSpace) -> Result<BoxOverlap, Error> {
    let geometry = descriptor.geometry(component, patch.space())?;
    let centering = geometry.centering();
    let region = patch.space().grow(geometry.ghosts())?.intersection(domain)?;
    let mut containers = Vec::with_capacity(geometry.num_arrays());

    for k in 0..geometry.num_arrays() {
        let mut boxes = BoxContainer::new();
        boxes.push(centering.array_space(&region, k).intersection(&geometry.array_space(k))?);
        boxes.remove_intersections(&geometry.interior_array_space(k))?;
        containers.push(boxes);
    }
    BoxOverlap::from_boxes(centering, containers, Transformation::identity(geometry.dim()))
}




/**
 * Fills one level of a hierarchy for the components of a `RefineAlgorithm`.
 */
pub struct RefineSchedule {
    level_number: usize,
    same_level: Schedule,
    coarse: Option<CoarseFill>,
}




// ============================================================================
impl RefineSchedule {


    pub fn level_number(&self) -> usize {
        self.level_number
    }


    /**
     * Fill the level's components at the given simulation time. Every rank
     * holding the hierarchy must call this together.
     */
    pub fn fill_data<C: Communicator + ?Sized>(&mut self, comm: &C, hierarchy: &mut PatchHierarchy, time: f64) -> Result<(), Error> {
        if let Some(coarse_fill) = &mut self.coarse {
            let (fine, coarse) = hierarchy.level_and_coarser_mut(self.level_number)?;
            coarse_fill.fill(comm, fine, coarse, time)?;
        }
        self.same_level.set_fill_time(time);
        self.same_level.execute(comm, hierarchy.level_mut(self.level_number)?)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::thread;

    use super::*;
    use crate::box_container::PatchBox;
    use crate::config::{HierarchyConfig, ScheduleConfig};
    use crate::identifiers::{BoxId, LocalId};
    use crate::index_space::range2d;
    use crate::message::LocalCommunicator;
    use crate::operators::CellConstantRefine;
    use crate::overlap::Centering;
    use crate::variable::Variable;

    fn iv(x: i64, y: i64) -> IntVector {
        IntVector::from_slice(&[x, y]).unwrap()
    }

    /// Two levels over the 16x16 domain with a cell component `u` (two
    /// ghosts). Coarse cells hold 10 i + j, fine interiors hold 1000, and
    /// fine ghosts hold -1.
    fn setup(rank: usize, coarse: &[(IndexSpace, usize)], fine: &[(IndexSpace, usize)]) -> (PatchHierarchy, RefineSchedule) {
        let path = ScheduleConfig::default().execution_path;
        setup_with(rank, coarse, fine, Arc::new(CellConstantRefine::with_path(path)))
    }

    fn setup_with(
        rank: usize,
        coarse: &[(IndexSpace, usize)],
        fine: &[(IndexSpace, usize)],
        operator: Arc<dyn RefineOperator>) -> (PatchHierarchy, RefineSchedule)
    {
        let mut hierarchy = PatchHierarchy::new(&HierarchyConfig::default(), rank).unwrap();
        let u = hierarchy
            .register_component("u", Arc::new(Variable::new("u", Centering::Cell, 1)), iv(2, 2))
            .unwrap();
        let mut algorithm = RefineAlgorithm::new();
        algorithm.register_refine(RefineItem::new(u, u), Some(operator));
        let requestor = algorithm.width_requestor(&hierarchy).unwrap();
        hierarchy.register_connector_width_requestor(Arc::new(requestor)).unwrap();

        for (ln, spaces) in [coarse, fine].iter().enumerate() {
            let boxes = spaces
                .iter()
                .enumerate()
                .map(|(n, (s, owner))| PatchBox::new(*s, *owner, LocalId::new(n as i32)))
                .collect();
            hierarchy.make_level(ln, boxes).unwrap();

            let level = hierarchy.level_mut(ln).unwrap();
            level.allocate(&std::iter::once(u).collect()).unwrap();
            for patch in level.patches_mut() {
                let interior = *patch.space();
                let array = patch.data_mut(u).unwrap().array_mut(0);
                let space = *array.space();
                for index in space.iter() {
                    *array.get_mut(&index, 0) = match (ln, interior.contains(&index).unwrap()) {
                        (0, true) => (10 * index[0] + index[1]) as f64,
                        (_, true) => 1000.0,
                        _ => -1.0,
                    };
                }
            }
        }
        let schedule = algorithm.create_schedule(&hierarchy, 1).unwrap();
        (hierarchy, schedule)
    }

    fn value(hierarchy: &PatchHierarchy, owner: usize, n: i32, i: i64, j: i64) -> f64 {
        hierarchy
            .level(1)
            .unwrap()
            .patch(&BoxId::new(owner, LocalId::new(n)))
            .unwrap()
            .data(0)
            .unwrap()
            .array(0)
            .get(&iv(i, j), 0)
    }

    #[test]
    fn ghosts_come_from_fine_neighbors_then_coarse_data() {
        let comm = LocalCommunicator::group(1).pop().unwrap();
        let (mut hierarchy, mut schedule) = setup(
            0,
            &[(range2d(0..16, 0..16), 0)],
            &[(range2d(8..16, 8..16), 0), (range2d(16..24, 8..16), 0)]);
        schedule.fill_data(&comm, &mut hierarchy, 0.0).unwrap();

        assert_eq!(value(&hierarchy, 0, 0, 7, 10), 35.0);
        assert_eq!(value(&hierarchy, 0, 0, 6, 17), 38.0);
        assert_eq!(value(&hierarchy, 0, 0, 16, 10), 1000.0);
        assert_eq!(value(&hierarchy, 0, 0, 17, 9), 1000.0);
        assert_eq!(value(&hierarchy, 0, 0, 12, 12), 1000.0);
        assert_eq!(value(&hierarchy, 0, 1, 25, 7), 123.0);
    }

    #[test]
    fn coarse_data_crosses_ranks() {
        let coarse = [(range2d(0..8, 0..16), 0), (range2d(8..16, 0..16), 1)];
        let fine = [(range2d(8..16, 8..16), 1), (range2d(16..24, 8..16), 0)];

        let handles: Vec<_> = LocalCommunicator::group(2)
            .into_iter()
            .map(|comm| thread::spawn(move || {
                let (mut hierarchy, mut schedule) = setup(comm.rank(), &coarse, &fine);
                schedule.fill_data(&comm, &mut hierarchy, 0.0).unwrap();

                if comm.rank() == 1 {
                    vec![value(&hierarchy, 1, 0, 7, 10), value(&hierarchy, 1, 0, 16, 10)]
                } else {
                    vec![value(&hierarchy, 0, 1, 24, 10), value(&hierarchy, 0, 1, 15, 10)]
                }
            }))
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results[0], vec![125.0, 1000.0]);
        assert_eq!(results[1], vec![35.0, 1000.0]);
    }

    struct FailingRefine;

    impl RefineOperator for FailingRefine {
        fn centering(&self) -> Centering {
            Centering::Cell
        }

        fn stencil_width(&self) -> i64 {
            0
        }

        fn refine(&self, _: &mut Patch, _: &Patch, _: usize, _: usize, _: &BoxOverlap, _: &IntVector) -> Result<(), Error> {
            Err(Error::Config("refine failed".to_string()))
        }
    }

    #[test]
    fn failed_refine_releases_scratch() {
        let comm = LocalCommunicator::group(1).pop().unwrap();
        let (mut hierarchy, mut schedule) = setup_with(
            0,
            &[(range2d(0..16, 0..16), 0)],
            &[(range2d(8..16, 8..16), 0)],
            Arc::new(FailingRefine));

        assert!(matches!(schedule.fill_data(&comm, &mut hierarchy, 0.0), Err(Error::Config(_))));
        let coarse = schedule.coarse.as_ref().unwrap();
        assert!(coarse.scratch.patches().count() > 0);
        assert!(coarse.scratch.patches().all(|p| !p.is_allocated(0)));
    }

    #[test]
    fn level_zero_only_copies() {
        let mut hierarchy = PatchHierarchy::new(&HierarchyConfig::default(), 0).unwrap();
        let u = hierarchy
            .register_component("u", Arc::new(Variable::new("u", Centering::Cell, 1)), iv(1, 1))
            .unwrap();
        hierarchy.register_connector_width_requestor(Arc::new(RefineScheduleWidthRequestor::new(iv(1, 1), iv(0, 0)).unwrap())).unwrap();
        hierarchy.make_level(0, vec![PatchBox::new(range2d(0..16, 0..16), 0, LocalId::new(0))]).unwrap();

        let mut algorithm = RefineAlgorithm::new();
        algorithm.register_refine(RefineItem::new(u, u), Some(Arc::new(CellConstantRefine::new())));
        let schedule = algorithm.create_schedule(&hierarchy, 0).unwrap();
        assert!(schedule.coarse.is_none());
        assert_eq!(schedule.level_number(), 0);
    }
}
