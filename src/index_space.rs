use core::ops::{Add, Index, IndexMut, Mul, Neg, Range, Sub};
use serde::{Deserialize, Serialize};
use crate::error::Error;




/// The largest number of axes supported by any geometric entity.
pub const MAX_DIM: usize = 3;




/**
 * Return `index / ratio`, rounded toward negative infinity. This is the
 * coarse index covering a fine index, for any sign of the fine index.
 */
pub fn floor_div(index: i64, ratio: i64) -> i64 {
    if index >= 0 {
        index / ratio
    } else {
        (index + 1) / ratio - 1
    }
}




/**
 * Return `width / ratio`, rounded up, for non-negative widths. A halo of
 * `width` fine cells is covered by this many coarse cells.
 */
pub fn ceil_div(width: i64, ratio: i64) -> i64 {
    (width + ratio - 1) / ratio
}




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]


/**
 * The number of axes of an index space: 1, 2, or 3.
 */
pub struct Dimension(u8);




// ============================================================================
impl Dimension {

    pub fn new(value: usize) -> Result<Self, Error> {
        if value == 0 || value > MAX_DIM {
            Err(Error::UnsupportedDimension(value))
        } else {
            Ok(Self(value as u8))
        }
    }

    pub fn value(self) -> usize {
        self.0 as usize
    }

    /**
     * Return the range of axis numbers, `0..dim`.
     */
    pub fn axes(self) -> Range<usize> {
        0..self.value()
    }

    /**
     * Return `DimensionMismatch` unless the other dimension is equal to this
     * one.
     */
    pub fn check(self, other: Dimension) -> Result<(), Error> {
        Error::check_dim(self.value(), other.value())
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]


/**
 * A vector of integers, one per axis. Used for indexes, ghost and connector
 * widths, refinement ratios, and shifts. Components beyond the dimension are
 * always zero.
 */
pub struct IntVector {
    dim: Dimension,
    data: [i64; MAX_DIM],
}




// ============================================================================
impl IntVector {

    pub fn zero(dim: Dimension) -> Self {
        Self::uniform(dim, 0)
    }

    pub fn one(dim: Dimension) -> Self {
        Self::uniform(dim, 1)
    }

    pub fn uniform(dim: Dimension, value: i64) -> Self {
        let mut data = [0; MAX_DIM];
        for x in &mut data[..dim.value()] {
            *x = value
        }
        Self { dim, data }
    }

    /**
     * Build a vector from a slice; the dimension is the length of the slice.
     */
    pub fn from_slice(values: &[i64]) -> Result<Self, Error> {
        let dim = Dimension::new(values.len())?;
        let mut data = [0; MAX_DIM];
        data[..values.len()].copy_from_slice(values);
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> Dimension {
        self.dim
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.data[..self.dim.value()]
    }

    /**
     * Pointwise maximum of two vectors.
     */
    pub fn pointwise_max(&self, other: &Self) -> Result<Self, Error> {
        self.zip_with(other, i64::max)
    }

    /**
     * Pointwise minimum of two vectors.
     */
    pub fn pointwise_min(&self, other: &Self) -> Result<Self, Error> {
        self.zip_with(other, i64::min)
    }

    /**
     * Determine whether every component of this vector is at least the
     * corresponding component of the other.
     */
    pub fn all_ge(&self, other: &Self) -> Result<bool, Error> {
        self.dim.check(other.dim)?;
        Ok(self.dim.axes().all(|a| self.data[a] >= other.data[a]))
    }

    pub fn all_positive(&self) -> bool {
        self.as_slice().iter().all(|&x| x > 0)
    }

    pub fn floor_div(&self, ratio: &Self) -> Result<Self, Error> {
        self.zip_with(ratio, floor_div)
    }

    pub fn ceil_div(&self, ratio: &Self) -> Result<Self, Error> {
        self.zip_with(ratio, ceil_div)
    }

    /**
     * Return a copy with axes rotated so that the given axis comes first:
     * component `i` of the result is component `(axis + i) % dim` of this
     * one.
     */
    pub fn rotate(&self, axis: usize) -> Self {
        let d = self.dim.value();
        let mut data = [0; MAX_DIM];
        for i in 0..d {
            data[i] = self.data[(axis + i) % d];
        }
        Self { dim: self.dim, data }
    }

    /**
     * Invert `rotate` for the same axis.
     */
    pub fn unrotate(&self, axis: usize) -> Self {
        let d = self.dim.value();
        let mut data = [0; MAX_DIM];
        for i in 0..d {
            data[(axis + i) % d] = self.data[i];
        }
        Self { dim: self.dim, data }
    }

    fn zip_with<F: Fn(i64, i64) -> i64>(&self, other: &Self, f: F) -> Result<Self, Error> {
        self.dim.check(other.dim)?;
        let mut data = [0; MAX_DIM];
        for a in self.dim.axes() {
            data[a] = f(self.data[a], other.data[a])
        }
        Ok(Self { dim: self.dim, data })
    }

    fn zip_or_panic<F: Fn(i64, i64) -> i64>(&self, other: &Self, f: F) -> Self {
        match self.zip_with(other, f) {
            Ok(v) => v,
            Err(e) => panic!("{}", e),
        }
    }
}




// ============================================================================
impl Index<usize> for IntVector {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        &self.as_slice()[axis]
    }
}

impl IndexMut<usize> for IntVector {
    fn index_mut(&mut self, axis: usize) -> &mut i64 {
        let d = self.dim.value();
        &mut self.data[..d][axis]
    }
}

impl Add for IntVector {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.zip_or_panic(&other, |a, b| a + b)
    }
}

impl Sub for IntVector {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.zip_or_panic(&other, |a, b| a - b)
    }
}

impl Mul for IntVector {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        self.zip_or_panic(&other, |a, b| a * b)
    }
}

impl Neg for IntVector {
    type Output = Self;

    fn neg(self) -> Self {
        Self::zero(self.dim) - self
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]


/**
 * Represents a rectangular region in a discrete index space of 1, 2, or 3
 * dimensions. The lower bound is inclusive and the upper bound is exclusive
 * on each axis. An index space may be empty.
 */
pub struct IndexSpace {
    dim: Dimension,
    lower: [i64; MAX_DIM],
    upper: [i64; MAX_DIM],
}




// ============================================================================
impl IndexSpace {


    pub fn new(lower: IntVector, upper: IntVector) -> Result<Self, Error> {
        lower.dim.check(upper.dim)?;

        assert!(
            lower.dim.axes().all(|a| lower.data[a] <= upper.data[a]),
            "index space has negative volume");

        Ok(Self { dim: lower.dim, lower: lower.data, upper: upper.data })
    }


    /**
     * Build an index space from one range per axis.
     */
    pub fn from_ranges(ranges: &[Range<i64>]) -> Result<Self, Error> {
        let lower: Vec<_> = ranges.iter().map(|r| r.start).collect();
        let upper: Vec<_> = ranges.iter().map(|r| r.end).collect();
        Self::new(IntVector::from_slice(&lower)?, IntVector::from_slice(&upper)?)
    }


    /**
     * Return an empty index space of the given dimension.
     */
    pub fn empty(dim: Dimension) -> Self {
        Self { dim, lower: [0; MAX_DIM], upper: [0; MAX_DIM] }
    }


    pub fn dim(&self) -> Dimension {
        self.dim
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn lower(&self) -> IntVector {
        IntVector { dim: self.dim, data: self.lower }
    }


    /**
     * Return the maximum index (exclusive).
     */
    pub fn upper(&self) -> IntVector {
        IntVector { dim: self.dim, data: self.upper }
    }


    pub fn range(&self, axis: usize) -> Range<i64> {
        self.lower[axis]..self.upper[axis]
    }


    /**
     * Return the number of indexes on each axis. Axes beyond the dimension
     * have extent 1.
     */
    pub fn shape(&self) -> [usize; MAX_DIM] {
        let mut shape = [1; MAX_DIM];
        for a in self.dim.axes() {
            shape[a] = (self.upper[a] - self.lower[a]).max(0) as usize;
        }
        shape
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }


    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    /**
     * Determine whether this index space contains the given index. An index
     * of another dimension is a `DimensionMismatch`.
     */
    pub fn contains(&self, index: &IntVector) -> Result<bool, Error> {
        self.dim.check(index.dim)?;
        Ok(self.dim.axes().all(|a| self.range(a).contains(&index.data[a])))
    }


    /**
     * Determine whether another index space is a subset of this one. The
     * empty set is a subset of everything.
     */
    pub fn contains_space(&self, other: &Self) -> Result<bool, Error> {
        self.dim.check(other.dim)?;
        Ok(other.is_empty() || self.dim.axes().all(|a| {
            other.lower[a] >= self.lower[a] && other.upper[a] <= self.upper[a]
        }))
    }


    /**
     * Return the intersection of two index spaces. Disjoint spaces yield an
     * empty one.
     */
    pub fn intersection(&self, other: &Self) -> Result<Self, Error> {
        self.dim.check(other.dim)?;
        let mut result = *self;

        for a in self.dim.axes() {
            result.lower[a] = self.lower[a].max(other.lower[a]);
            result.upper[a] = self.upper[a].min(other.upper[a]).max(result.lower[a]);
        }
        Ok(result)
    }


    pub fn intersects(&self, other: &Self) -> Result<bool, Error> {
        Ok(!self.intersection(other)?.is_empty())
    }


    /**
     * Expand this index space by the given number of elements on both sides
     * of each axis. Negative widths shrink it.
     */
    pub fn grow(&self, width: &IntVector) -> Result<Self, Error> {
        self.dim.check(width.dim)?;
        let mut result = *self;

        for a in self.dim.axes() {
            result.lower[a] -= width.data[a];
            result.upper[a] = (self.upper[a] + width.data[a]).max(result.lower[a]);
        }
        Ok(result)
    }


    /**
     * Expand this index space by the given number of elements on each axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        let mut result = *self;

        for a in self.dim.axes() {
            result.lower[a] -= delta;
            result.upper[a] = (self.upper[a] + delta).max(result.lower[a]);
        }
        result
    }


    /**
     * Trim this index space by the given number of elements on each axis.
     */
    pub fn trim_all(&self, delta: i64) -> Self {
        self.extend_all(-delta)
    }


    /**
     * Move just the upper bound on the given axis.
     */
    pub fn grow_upper(&self, axis: usize, delta: i64) -> Self {
        let mut result = *self;
        result.upper[axis] = (self.upper[axis] + delta).max(self.lower[axis]);
        result
    }


    /**
     * Move just the lower bound on the given axis.
     */
    pub fn grow_lower(&self, axis: usize, delta: i64) -> Self {
        let mut result = *self;
        result.lower[axis] = (self.lower[axis] - delta).min(self.upper[axis]);
        result
    }


    /**
     * Collapse the given axis to the single layer at `index`.
     */
    pub fn slab(&self, axis: usize, index: i64) -> Self {
        let mut result = *self;
        result.lower[axis] = index;
        result.upper[axis] = index + 1;
        result
    }


    /**
     * Map the index space to a finer level: each index becomes `ratio`
     * indexes along each axis.
     */
    pub fn refine(&self, ratio: &IntVector) -> Result<Self, Error> {
        self.dim.check(ratio.dim)?;
        let mut result = *self;

        for a in self.dim.axes() {
            result.lower[a] = self.lower[a] * ratio.data[a];
            result.upper[a] = self.upper[a] * ratio.data[a];
        }
        Ok(result)
    }


    /**
     * Map the index space to a coarser level. The result is the smallest
     * coarse index space covering every index of this one.
     */
    pub fn coarsen(&self, ratio: &IntVector) -> Result<Self, Error> {
        self.dim.check(ratio.dim)?;

        if self.is_empty() {
            return Ok(Self::empty(self.dim))
        }
        let mut result = *self;

        for a in self.dim.axes() {
            result.lower[a] = floor_div(self.lower[a], ratio.data[a]);
            result.upper[a] = floor_div(self.upper[a] - 1, ratio.data[a]) + 1;
        }
        Ok(result)
    }


    /**
     * Translate the index space by the given offset.
     */
    pub fn shift(&self, offset: &IntVector) -> Result<Self, Error> {
        self.dim.check(offset.dim)?;
        let mut result = *self;

        for a in self.dim.axes() {
            result.lower[a] += offset.data[a];
            result.upper[a] += offset.data[a];
        }
        Ok(result)
    }


    /**
     * Rotate the axes so that the given axis comes first (see
     * `IntVector::rotate`).
     */
    pub fn rotate(&self, axis: usize) -> Self {
        Self {
            dim: self.dim,
            lower: self.lower().rotate(axis).data,
            upper: self.upper().rotate(axis).data,
        }
    }


    /**
     * Invert `rotate` for the same axis.
     */
    pub fn unrotate(&self, axis: usize) -> Self {
        Self {
            dim: self.dim,
            lower: self.lower().unrotate(axis).data,
            upper: self.upper().unrotate(axis).data,
        }
    }


    /**
     * Return the node index space of a cell index space: one more index on
     * each axis.
     */
    pub fn to_nodes(&self) -> Self {
        if self.is_empty() {
            return *self
        }
        let mut result = *self;

        for a in self.dim.axes() {
            result.upper[a] += 1;
        }
        result
    }


    /**
     * Return the parts of this index space not covered by the other one, as
     * disjoint index spaces.
     */
    pub fn subtract(&self, other: &Self) -> Result<Vec<Self>, Error> {
        let overlap = self.intersection(other)?;

        if overlap.is_empty() {
            return Ok(if self.is_empty() { vec![] } else { vec![*self] })
        }
        let mut pieces = Vec::new();
        let mut rest = *self;

        for a in self.dim.axes() {
            if rest.lower[a] < overlap.lower[a] {
                let mut piece = rest;
                piece.upper[a] = overlap.lower[a];
                pieces.push(piece);
                rest.lower[a] = overlap.lower[a];
            }
            if rest.upper[a] > overlap.upper[a] {
                let mut piece = rest;
                piece.lower[a] = overlap.upper[a];
                pieces.push(piece);
                rest.upper[a] = overlap.upper[a];
            }
        }
        Ok(pieces)
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: &IntVector) -> usize {
        let shape = self.shape();
        let mut offset = 0;

        for a in self.dim.axes() {
            offset = offset * shape[a] + (index.data[a] - self.lower[a]) as usize;
        }
        offset
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = IntVector> {
        let space = *self;
        (0..space.len()).map(move |k| space.index_at(k))
    }


    fn index_at(&self, mut k: usize) -> IntVector {
        let shape = self.shape();
        let mut data = [0; MAX_DIM];

        for a in self.dim.axes().rev() {
            data[a] = self.lower[a] + (k % shape[a]) as i64;
            k /= shape[a];
        }
        IntVector { dim: self.dim, data }
    }
}




/**
 * Less imposing factory function to construct a 2D index space.
 */
pub fn range2d(di: Range<i64>, dj: Range<i64>) -> IndexSpace {
    match IndexSpace::from_ranges(&[di, dj]) {
        Ok(space) => space,
        Err(e) => panic!("{}", e),
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    fn iv(values: &[i64]) -> IntVector {
        IntVector::from_slice(values).unwrap()
    }

    #[test]
    fn floor_div_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(5, 2), 2);
        assert_eq!(floor_div(4, 2), 2);
        assert_eq!(floor_div(-1, 2), -1);
        assert_eq!(floor_div(-2, 2), -1);
        assert_eq!(floor_div(-3, 2), -2);
        assert_eq!(floor_div(-4, 4), -1);
        assert_eq!(floor_div(-5, 4), -2);
    }

    #[test]
    fn dimension_rejects_zero_and_four() {
        assert!(Dimension::new(0).is_err());
        assert!(Dimension::new(4).is_err());
        assert_eq!(Dimension::new(3).unwrap().value(), 3);
    }

    #[test]
    fn int_vector_max_and_rotation() {
        assert_eq!(iv(&[1, 4, 2]).pointwise_max(&iv(&[3, 0, 2])).unwrap(), iv(&[3, 4, 2]));
        assert!(iv(&[1, 4]).pointwise_max(&iv(&[3, 0, 2])).is_err());
        assert_eq!(iv(&[1, 4]).pointwise_max(&iv(&[3, 0])).unwrap(), iv(&[3, 4]));
        assert_eq!(iv(&[1, 4]).pointwise_min(&iv(&[3, 0])).unwrap(), iv(&[1, 0]));
        assert_eq!(iv(&[1, 2, 3]).rotate(1), iv(&[2, 3, 1]));
        assert_eq!(iv(&[1, 2, 3]).rotate(2).unrotate(2), iv(&[1, 2, 3]));
    }

    #[test]
    fn index_space_has_correct_length() {
        let space = range2d(0..10, 5..8);
        assert_eq!(space.len(), 30);
        assert_eq!(space.iter().count(), 30);
        assert_eq!(space.iter().next().unwrap(), iv(&[0, 5]));
        assert_eq!(space.iter().nth(1).unwrap(), iv(&[0, 6]));
    }

    #[test]
    fn row_major_offset_agrees_with_iteration() {
        let space = IndexSpace::from_ranges(&[-2..1, 3..5, 0..4]).unwrap();
        for (k, index) in space.iter().enumerate() {
            assert_eq!(space.row_major_offset(&index), k);
        }
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = range2d(0..4, 0..4);
        let b = range2d(4..8, 0..4);
        assert!(a.intersection(&b).unwrap().is_empty());
        assert!(!a.intersects(&b).unwrap());
        assert!(a.extend_all(1).intersects(&b).unwrap());
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let a = range2d(0..4, 0..4);
        let b = IndexSpace::from_ranges(&[0..4, 0..4, 0..4]).unwrap();
        assert!(matches!(a.intersection(&b), Err(Error::DimensionMismatch { .. })));
        assert!(matches!(a.grow(&iv(&[1])), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn coarsen_covers_negative_indexes() {
        let fine = range2d(-3..5, -4..4);
        let coarse = fine.coarsen(&iv(&[2, 2])).unwrap();
        assert_eq!(coarse, range2d(-2..3, -2..2));
        assert!(coarse.refine(&iv(&[2, 2])).unwrap().contains_space(&fine).unwrap());
    }

    #[test]
    fn subtract_yields_disjoint_cover() {
        let a = range2d(0..6, 0..6);
        let b = range2d(2..4, 2..4);
        let pieces = a.subtract(&b).unwrap();
        assert_eq!(pieces.iter().map(|p| p.len()).sum::<usize>(), 32);
        for (n, p) in pieces.iter().enumerate() {
            assert!(!p.intersects(&b).unwrap());
            for q in &pieces[n + 1..] {
                assert!(!p.intersects(q).unwrap());
            }
        }
    }
}
