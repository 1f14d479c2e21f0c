//! The slice planner: turns a logical N-dimensional view over an image
//! HDU (or a row range over a bintable HDU) into the list of byte ranges
//! to read from the original file.
//!
//! Dimensions are addressed slow-to-fast. Only the fastest axis is
//! contiguous in the file, so every combination of positions on the
//! partially covered slower axes contributes one contiguous range; the
//! combinations are enumerated lexicographically, slowest axis outermost,
//! which is also the order the output buffer must be assembled in.

use std::ops::Range;

use crate::error::Error;
use crate::hdu::{Hdu, HduKind};

/// One per-axis view specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Half-open `[start, stop)` with a step. Only unit steps are in
    /// scope; anything else is rejected at planning time.
    Slice { start: u64, stop: u64, step: u64 },
    /// A scalar index, equivalent to `Slice { k, k + 1, 1 }`.
    At(u64),
}

impl View {
    pub fn slice(start: u64, stop: u64) -> Self {
        View::Slice {
            start,
            stop,
            step: 1,
        }
    }

    pub fn slice_with_step(start: u64, stop: u64, step: u64) -> Self {
        View::Slice { start, stop, step }
    }

    pub fn at(index: u64) -> Self {
        View::At(index)
    }

    /// Validate against the axis extent and normalize to `[start, stop)`.
    fn bounds(&self, axis: usize, len: u64) -> Result<(u64, u64), Error> {
        match *self {
            View::Slice { step, .. } if step != 1 => Err(Error::BadSlice(format!(
                "axis {axis}: step {step} is out of scope, only unit steps are supported"
            ))),
            View::Slice { start, stop, .. } => {
                if start > stop || stop > len {
                    Err(Error::BadSlice(format!(
                        "axis {axis}: [{start}, {stop}) does not fit in 0..{len}"
                    )))
                } else {
                    Ok((start, stop))
                }
            }
            View::At(k) => {
                if k >= len {
                    Err(Error::BadSlice(format!(
                        "axis {axis}: index {k} is out of bounds for length {len}"
                    )))
                } else {
                    Ok((k, k + 1))
                }
            }
        }
    }
}

/// The byte ranges of an image cutout, in assembly order, plus the
/// logical output shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CutoutPlan {
    ranges: Vec<Range<u64>>,
    pub shape: Vec<u64>,
}

impl CutoutPlan {
    /// Ranges in lexicographic slow-to-fast enumeration order.
    pub fn ranges(&self) -> &[Range<u64>] {
        &self.ranges
    }

    /// Same coverage with adjacent ranges merged. Concatenating the
    /// bytes of either list yields identical output; merging only cuts
    /// the request count.
    pub fn coalesced(&self) -> Vec<Range<u64>> {
        coalesce(&self.ranges)
    }

    /// Total payload size in bytes.
    pub fn byte_len(&self) -> u64 {
        self.ranges.iter().map(|r| r.end - r.start).sum()
    }
}

/// The single byte range of a bintable row cutout.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPlan {
    pub range: Range<u64>,
    /// The `NAXIS2` value of the output table.
    pub rows: u64,
}

/// Plan an image cutout over `hdu`. One view per axis, slow-to-fast;
/// missing trailing dimensions are not allowed.
pub fn plan_image(hdu: &Hdu, views: &[View]) -> Result<CutoutPlan, Error> {
    if hdu.kind == HduKind::BinTable {
        return Err(Error::BadSlice(
            "N-dimensional views do not apply to a binary table, use a row range".to_owned(),
        ));
    }
    let shape = &hdu.layout.shape;
    if shape.is_empty() {
        return Err(Error::BadSlice("HDU carries no data".to_owned()));
    }
    if views.len() != shape.len() {
        return Err(Error::BadSlice(format!(
            "{} views over {} axes",
            views.len(),
            shape.len()
        )));
    }

    let bounds = views
        .iter()
        .zip(shape)
        .enumerate()
        .map(|(axis, (view, len))| view.bounds(axis, *len))
        .collect::<Result<Vec<_>, _>>()?;
    let out_shape: Vec<u64> = bounds.iter().map(|(start, stop)| stop - start).collect();

    if out_shape.contains(&0) {
        return Ok(CutoutPlan {
            ranges: Vec::new(),
            shape: out_shape,
        });
    }

    let n = bounds.len();
    let strides = &hdu.layout.strides;

    // A view over a fully covered axis keeps the faster axes contiguous,
    // so the maximal suffix of full axes folds into the trailing unit of
    // every range instead of being enumerated.
    let mut p = n;
    while p > 0 && bounds[p - 1] == (0, shape[p - 1]) {
        p -= 1;
    }
    let (outer, unit) = if p == 0 {
        // Every axis fully covered: the whole data unit in one range.
        (&bounds[..0], 0..hdu.layout.data_size())
    } else if p == n {
        // No full suffix: the partial trailing axis closes each range.
        let (t0, t1) = bounds[n - 1];
        (&bounds[..n - 1], t0 * strides[n - 1]..t1 * strides[n - 1])
    } else {
        (&bounds[..p], 0..shape[p] * strides[p])
    };

    let count = outer
        .iter()
        .map(|(start, stop)| (stop - start) as usize)
        .product();
    let mut ranges = Vec::with_capacity(count);

    // Multi-index odometer over the enumerated axes, in place of one
    // nested loop per axis; slowest axis outermost.
    let mut idx: Vec<u64> = outer.iter().map(|(start, _)| *start).collect();
    'emit: loop {
        let base: u64 = hdu.data_offset
            + idx
                .iter()
                .zip(strides.iter())
                .map(|(i, stride)| i * stride)
                .sum::<u64>();
        ranges.push(base + unit.start..base + unit.end);

        let mut axis = outer.len();
        loop {
            if axis == 0 {
                break 'emit;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < outer[axis].1 {
                continue 'emit;
            }
            idx[axis] = outer[axis].0;
        }
    }

    Ok(CutoutPlan {
        ranges,
        shape: out_shape,
    })
}

/// Plan a row cutout over a bintable HDU: exactly one view selecting
/// `[r0, r1)`, one contiguous byte range out.
pub fn plan_rows(hdu: &Hdu, rows: View) -> Result<RowPlan, Error> {
    if hdu.kind != HduKind::BinTable {
        return Err(Error::BadSlice(
            "row ranges only apply to a binary table HDU".to_owned(),
        ));
    }
    let (r0, r1) = rows.bounds(0, hdu.layout.shape[0])?;
    let row_stride = hdu.layout.strides[0];
    Ok(RowPlan {
        range: hdu.data_offset + r0 * row_stride..hdu.data_offset + r1 * row_stride,
        rows: r1 - r0,
    })
}

/// Merge adjacent ranges (`previous.end == next.start`).
pub fn coalesce(ranges: &[Range<u64>]) -> Vec<Range<u64>> {
    let mut merged: Vec<Range<u64>> = Vec::new();
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.end == range.start => last.end = range.end,
            _ => merged.push(range.clone()),
        }
    }
    merged
}
