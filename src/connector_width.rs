//! Negotiation of connector widths. Any algorithm that walks the hierarchy
//! declares, per level, how far apart two boxes can be and still need to
//! know about each other. The hierarchy combines all declarations before
//! building connectors, so one build satisfies every consumer.

use crate::error::Error;
use crate::hierarchy::PatchHierarchy;
use crate::index_space::{Dimension, IntVector};




#[derive(Clone, Debug, PartialEq)]


/**
 * Per-level connector widths. `self_widths[ln]` is for the connector from
 * level `ln` to itself, in level `ln` cells; `fine_widths[ln]` is for the
 * connector from level `ln` to level `ln + 1`, in level `ln` cells.
 */
pub struct ConnectorWidths {
    pub self_widths: Vec<IntVector>,
    pub fine_widths: Vec<IntVector>,
}




// ============================================================================
impl ConnectorWidths {
    /**
     * All-zero widths for a hierarchy of `max_levels` levels.
     */
    pub fn zero(dim: Dimension, max_levels: usize) -> Self {
        Self {
            self_widths: vec![IntVector::zero(dim); max_levels],
            fine_widths: vec![IntVector::zero(dim); max_levels.saturating_sub(1)],
        }
    }


    /**
     * Raise these widths to the pointwise maximum with a request. A request
     * list shorter than the number of levels has its last entry applied to
     * every remaining level; an empty list requests nothing.
     */
    pub fn absorb(&mut self, request: &ConnectorWidths) -> Result<(), Error> {
        merge(&mut self.self_widths, &request.self_widths)?;
        merge(&mut self.fine_widths, &request.fine_widths)?;
        Ok(())
    }


    /**
     * Whether every width here is at least the corresponding width of
     * another set.
     */
    pub fn covers(&self, other: &ConnectorWidths) -> Result<bool, Error> {
        for (a, b) in self.self_widths.iter().zip(&other.self_widths) {
            if !a.all_ge(b)? {
                return Ok(false)
            }
        }
        for (a, b) in self.fine_widths.iter().zip(&other.fine_widths) {
            if !a.all_ge(b)? {
                return Ok(false)
            }
        }
        Ok(true)
    }
}




fn merge(widths: &mut [IntVector], request: &[IntVector]) -> Result<(), Error> {
    if let Some(last) = request.last() {
        for (ln, w) in widths.iter_mut().enumerate() {
            *w = w.pointwise_max(request.get(ln).unwrap_or(last))?;
        }
    }
    Ok(())
}




/**
 * Implemented by any algorithm consuming a hierarchy to declare the
 * connector widths it needs. Called once per requestor whenever the
 * hierarchy (re)builds its connectors.
 */
pub trait ConnectorWidthRequestor: Send + Sync {
    fn compute_required_connector_widths(&self, hierarchy: &PatchHierarchy) -> ConnectorWidths;
}




#[derive(Clone, Debug, Default)]


/**
 * Widths needed when tagging cells for refinement: tagged cells are
 * buffered by a per-level number of cells, so boxes that close need to be
 * connected on the same level.
 *
 * The self width is the tag buffer alone. A ghost width registered
 * separately for the fine connectors is not folded in here.
 */
pub struct TagBufferWidthRequestor {
    tag_buffer: Vec<i64>,
}




// ============================================================================
impl TagBufferWidthRequestor {
    pub fn new() -> Self {
        Self::default()
    }


    /**
     * Set the tag buffer per level. A short list applies its last entry to
     * deeper levels.
     */
    pub fn set_tag_buffer(&mut self, tag_buffer: Vec<i64>) {
        self.tag_buffer = tag_buffer
    }


    pub fn tag_buffer(&self) -> &[i64] {
        &self.tag_buffer
    }
}




// ============================================================================
impl ConnectorWidthRequestor for TagBufferWidthRequestor {
    fn compute_required_connector_widths(&self, hierarchy: &PatchHierarchy) -> ConnectorWidths {
        let dim = hierarchy.dim();
        let max_levels = hierarchy.max_levels();

        if self.tag_buffer.is_empty() {
            return ConnectorWidths::zero(dim, max_levels)
        }
        let last = self.tag_buffer[self.tag_buffer.len() - 1];

        ConnectorWidths {
            self_widths: (0..max_levels)
                .map(|ln| IntVector::uniform(dim, *self.tag_buffer.get(ln).unwrap_or(&last)))
                .collect(),
            fine_widths: vec![IntVector::zero(dim); max_levels.saturating_sub(1)],
        }
    }
}




#[derive(Clone, Debug)]


/**
 * Widths needed to fill ghost regions: same-level neighbors within the
 * ghost width, and coarse boxes within reach of the fine ghost region plus
 * the interpolation stencil.
 */
pub struct RefineScheduleWidthRequestor {
    ghost_width: IntVector,
    stencil_width: IntVector,
}




// ============================================================================
impl RefineScheduleWidthRequestor {
    pub fn new(ghost_width: IntVector, stencil_width: IntVector) -> Result<Self, Error> {
        ghost_width.dim().check(stencil_width.dim())?;
        Ok(Self { ghost_width, stencil_width })
    }
}




// ============================================================================
impl ConnectorWidthRequestor for RefineScheduleWidthRequestor {
    fn compute_required_connector_widths(&self, hierarchy: &PatchHierarchy) -> ConnectorWidths {
        let max_levels = hierarchy.max_levels();
        let fine_widths = (1..max_levels)
            .map(|fine| {
                let ratio = hierarchy.ratio_to_coarser(fine);
                self.ghost_width.ceil_div(&ratio).unwrap_or(self.ghost_width) + self.stencil_width
            })
            .collect();

        ConnectorWidths {
            self_widths: vec![self.ghost_width; max_levels],
            fine_widths,
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    fn dim() -> Dimension {
        Dimension::new(2).unwrap()
    }

    fn v(x: i64, y: i64) -> IntVector {
        IntVector::from_slice(&[x, y]).unwrap()
    }

    #[test]
    fn combined_width_is_pointwise_max() {
        let mut w = ConnectorWidths::zero(dim(), 3);
        w.absorb(&ConnectorWidths {
            self_widths: vec![v(1, 4), v(2, 0), v(0, 0)],
            fine_widths: vec![v(3, 3), v(1, 1)],
        }).unwrap();
        w.absorb(&ConnectorWidths {
            self_widths: vec![v(2, 1), v(2, 2), v(1, 1)],
            fine_widths: vec![v(0, 5), v(0, 0)],
        }).unwrap();
        assert_eq!(w.self_widths, vec![v(2, 4), v(2, 2), v(1, 1)]);
        assert_eq!(w.fine_widths, vec![v(3, 5), v(1, 1)]);
    }

    #[test]
    fn short_request_replicates_last_entry() {
        let mut w = ConnectorWidths::zero(dim(), 4);
        w.absorb(&ConnectorWidths {
            self_widths: vec![v(1, 1), v(3, 2)],
            fine_widths: vec![],
        }).unwrap();
        assert_eq!(w.self_widths, vec![v(1, 1), v(3, 2), v(3, 2), v(3, 2)]);
        assert_eq!(w.fine_widths, vec![v(0, 0); 3]);
    }

    #[test]
    fn absorb_rejects_dimension_mismatch() {
        let mut w = ConnectorWidths::zero(dim(), 1);
        let request = ConnectorWidths {
            self_widths: vec![IntVector::one(Dimension::new(3).unwrap())],
            fine_widths: vec![],
        };
        assert!(matches!(w.absorb(&request), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn covers_compares_every_level() {
        let small = ConnectorWidths { self_widths: vec![v(1, 1)], fine_widths: vec![] };
        let large = ConnectorWidths { self_widths: vec![v(1, 2)], fine_widths: vec![] };
        assert!(large.covers(&small).unwrap());
        assert!(!small.covers(&large).unwrap());
    }
}
