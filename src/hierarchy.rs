use std::sync::Arc;

use log::{debug, info};

use crate::box_container::{BoxContainer, PatchBox};
use crate::config::HierarchyConfig;
use crate::connector::{Connector, ConnectorSet};
use crate::connector_width::{ConnectorWidthRequestor, ConnectorWidths};
use crate::error::Error;
use crate::index_space::{Dimension, IndexSpace, IntVector};
use crate::patch_level::PatchLevel;
use crate::variable::{PatchDescriptor, Variable};




/**
 * An ordered stack of patch levels, coarsest first. Each level is related
 * to the next coarser one by an integer refinement ratio per axis. Boxes
 * and owners are supplied from outside (`make_level`); the hierarchy keeps
 * the connectors between its levels wide enough for every registered
 * `ConnectorWidthRequestor`.
 */
pub struct PatchHierarchy {
    dim: Dimension,
    rank: usize,
    domain: IndexSpace,
    max_levels: usize,
    ratios: Vec<IntVector>,
    periodic: Vec<bool>,
    check_proper_nesting: bool,
    descriptor: Arc<PatchDescriptor>,
    levels: Vec<PatchLevel>,
    requestors: Vec<Arc<dyn ConnectorWidthRequestor>>,
    widths: ConnectorWidths,
    connectors: ConnectorSet,
}




// ============================================================================
impl PatchHierarchy {


    /**
     * Create an empty hierarchy as seen from the given rank.
     */
    pub fn new(config: &HierarchyConfig, rank: usize) -> Result<Self, Error> {
        let dim = config.validate()?;
        let ratios = (0..config.max_levels)
            .map(|ln| config.ratio_to_coarser(ln))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dim,
            rank,
            domain: config.domain()?,
            max_levels: config.max_levels,
            ratios,
            periodic: config.periodic.clone(),
            check_proper_nesting: config.check_proper_nesting,
            descriptor: Arc::new(PatchDescriptor::new(dim)),
            levels: Vec::new(),
            requestors: Vec::new(),
            widths: ConnectorWidths::zero(dim, config.max_levels),
            connectors: ConnectorSet::new(),
        })
    }


    pub fn dim(&self) -> Dimension {
        self.dim
    }


    pub fn rank(&self) -> usize {
        self.rank
    }


    pub fn domain(&self) -> &IndexSpace {
        &self.domain
    }


    pub fn max_levels(&self) -> usize {
        self.max_levels
    }


    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }


    pub fn descriptor(&self) -> &Arc<PatchDescriptor> {
        &self.descriptor
    }


    /**
     * Disable the proper nesting check in `make_level`. Only meant for
     * specialized test configurations.
     */
    pub fn allow_unnested_levels(&mut self) {
        self.check_proper_nesting = false
    }


    /**
     * Return the refinement ratio of level `ln` to level `ln - 1`.
     */
    pub fn ratio_to_coarser(&self, ln: usize) -> IntVector {
        self.ratios
            .get(ln)
            .or_else(|| self.ratios.last())
            .copied()
            .unwrap_or_else(|| IntVector::one(self.dim))
    }


    pub fn ratio_to_level_zero(&self, ln: usize) -> IntVector {
        (1..=ln).fold(IntVector::one(self.dim), |r, l| r * self.ratio_to_coarser(l))
    }


    /**
     * Return the shift between periodic images on level `ln`: the domain
     * extent on periodic axes and zero elsewhere. `None` if no axis is
     * periodic.
     */
    pub fn periodic_shift(&self, ln: usize) -> Result<Option<IntVector>, Error> {
        if !self.periodic.iter().any(|&p| p) {
            return Ok(None)
        }
        let domain = self.domain.refine(&self.ratio_to_level_zero(ln))?;
        let mut shift = IntVector::zero(self.dim);

        for a in self.dim.axes().filter(|&a| self.periodic[a]) {
            let r = domain.range(a);
            shift[a] = r.end - r.start;
        }
        Ok(Some(shift))
    }


    /**
     * Register a patch data component and return its id. Levels already
     * present see the new component (unallocated).
     */
    pub fn register_component(&mut self, name: &str, variable: Arc<Variable>, ghosts: IntVector) -> Result<usize, Error> {
        let id = Arc::make_mut(&mut self.descriptor).register(name, variable, ghosts)?;

        for level in &mut self.levels {
            level.set_descriptor(Arc::clone(&self.descriptor))
        }
        Ok(id)
    }


    /**
     * Add a participant in connector width negotiation. Connectors of
     * existing levels are widened if the new request needs it.
     */
    pub fn register_connector_width_requestor(&mut self, requestor: Arc<dyn ConnectorWidthRequestor>) -> Result<(), Error> {
        self.requestors.push(requestor);

        for ln in 0..self.levels.len() {
            self.build_connectors(ln)?
        }
        Ok(())
    }


    /**
     * Combine the widths requested by every registered requestor: the
     * pointwise maximum per level, a short request list applying its last
     * entry to the deeper levels.
     */
    pub fn compute_connector_widths(&self) -> Result<ConnectorWidths, Error> {
        let mut widths = ConnectorWidths::zero(self.dim, self.max_levels);

        for requestor in &self.requestors {
            widths.absorb(&requestor.compute_required_connector_widths(self))?
        }
        Ok(widths)
    }


    /**
     * Return the widths connectors are built at. These only ever grow.
     */
    pub fn connector_widths(&self) -> &ConnectorWidths {
        &self.widths
    }


    /**
     * Create (or replace) level `ln` from boxes with owners. Finer levels
     * are discarded, along with every connector touching level `ln` or
     * finer. Connectors to the level itself and to the next coarser level
     * are then built at the negotiated widths.
     */
    pub fn make_level(&mut self, ln: usize, boxes: Vec<PatchBox>) -> Result<(), Error> {
        if ln > self.levels.len() || ln >= self.max_levels {
            return Err(Error::Config(format!(
                "cannot make level {} with {} levels present (at most {})",
                ln,
                self.levels.len(),
                self.max_levels)))
        }

        let mut level = PatchLevel::new(
            ln,
            self.rank,
            boxes,
            Arc::clone(&self.descriptor),
            self.ratio_to_level_zero(ln),
            self.ratio_to_coarser(ln))?;

        if let Some(shift) = self.periodic_shift(ln)? {
            level = level.with_periodic_shift(shift)?;
        }
        if self.check_proper_nesting {
            self.check_nesting(&level)?;
        }

        info!("making level {} with {} boxes ({} local)", ln, level.num_boxes(), level.local_boxes().count());

        self.levels.truncate(ln);
        self.connectors.remove_from(ln);
        self.levels.push(level);
        self.build_connectors(ln)
    }


    fn check_nesting(&self, level: &PatchLevel) -> Result<(), Error> {
        let ln = level.level_number();

        let (coarse, ratio) = if ln == 0 {
            (BoxContainer::from(vec![self.domain]), IntVector::one(self.dim))
        } else {
            let boxes: BoxContainer = self.levels[ln - 1].boxes().map(|b| *b.space()).collect();
            (boxes, self.ratio_to_coarser(ln))
        };

        for b in level.boxes() {
            if !coarse.covers(&b.space().coarsen(&ratio)?)? {
                debug!("box {} ({:?}) is not nested on level {}", b.id(), b.space(), ln);
                return Err(Error::ProperNesting { level: ln })
            }
        }
        Ok(())
    }


    fn build_connectors(&mut self, ln: usize) -> Result<(), Error> {
        let requested = self.compute_connector_widths()?;
        self.widths.absorb(&requested)?;

        let widths = self.widths.clone();
        let level = &self.levels[ln];
        self.connectors.find_or_create(level, level, &widths.self_widths[ln])?;

        if ln > 0 {
            let coarse = &self.levels[ln - 1];
            let width = widths.fine_widths[ln - 1];
            self.connectors.find_or_create(coarse, level, &width)?;
            self.connectors.find_or_create(level, coarse, &(width * self.ratio_to_coarser(ln)))?;
        }
        Ok(())
    }


    /**
     * Make sure a connector between two levels exists with at least the
     * given width (in base level cells).
     */
    pub fn ensure_connector(&mut self, base: usize, head: usize, width: &IntVector) -> Result<(), Error> {
        let b = self.levels.get(base).ok_or(Error::MissingConnector { base, head })?;
        let h = self.levels.get(head).ok_or(Error::MissingConnector { base, head })?;
        self.connectors.find_or_create(b, h, width)?;
        Ok(())
    }


    pub fn connector(&self, base: usize, head: usize) -> Result<&Connector, Error> {
        self.connectors
            .get(base, head)
            .ok_or(Error::MissingConnector { base, head })
    }


    pub fn level(&self, ln: usize) -> Result<&PatchLevel, Error> {
        self.levels
            .get(ln)
            .ok_or_else(|| Error::Config(format!("level {} does not exist", ln)))
    }


    pub fn level_mut(&mut self, ln: usize) -> Result<&mut PatchLevel, Error> {
        self.levels
            .get_mut(ln)
            .ok_or_else(|| Error::Config(format!("level {} does not exist", ln)))
    }


    /**
     * Return level `ln` for writing together with level `ln - 1` for
     * reading.
     */
    pub fn level_and_coarser_mut(&mut self, ln: usize) -> Result<(&mut PatchLevel, &PatchLevel), Error> {
        if ln == 0 || ln >= self.levels.len() {
            return Err(Error::Config(format!("level {} has no coarser level", ln)))
        }
        let (lo, hi) = self.levels.split_at_mut(ln);
        Ok((&mut hi[0], &lo[ln - 1]))
    }


    pub fn levels(&self) -> impl Iterator<Item = &PatchLevel> {
        self.levels.iter()
    }
}
