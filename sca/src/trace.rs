//! Traces and trace sets.

use std::ops::{Index, Range};
use std::slice::SliceIndex;

use curve::AffinePoint;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::TraceError;

/// The operation a sample was leaked by: node `node` of the formula run at
/// plan step `step`, lane `lane` of the leakage function.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleOrigin {
    pub step: u32,
    pub node: u32,
    pub lane: u32,
}

impl SampleOrigin {
    pub fn new(step: u32, node: u32, lane: u32) -> Self {
        Self { step, node, lane }
    }

    /// The `(step, node)` position, ignoring the lane.
    pub fn position(&self) -> (u32, u32) {
        (self.step, self.node)
    }
}

/// One recorded or simulated execution. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    samples: Vec<f64>,
    origins: Vec<SampleOrigin>,
    input: Option<AffinePoint>,
    scalar: Option<BigUint>,
}

impl Trace {
    pub fn new(samples: Vec<f64>, origins: Vec<SampleOrigin>) -> Result<Self, TraceError> {
        if samples.len() != origins.len() {
            return Err(TraceError::OriginCount {
                samples: samples.len(),
                origins: origins.len(),
            });
        }
        Ok(Self {
            samples,
            origins,
            input: None,
            scalar: None,
        })
    }

    /// Attaches the public input point.
    pub fn with_input(mut self, input: AffinePoint) -> Self {
        self.input = Some(input);
        self
    }

    /// Attaches the ground-truth scalar, for auditing attack results.
    pub fn with_scalar(mut self, scalar: BigUint) -> Self {
        self.scalar = Some(scalar);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn origins(&self) -> &[SampleOrigin] {
        &self.origins
    }

    pub fn get(&self, index: usize) -> Option<(f64, SampleOrigin)> {
        Some((*self.samples.get(index)?, self.origins[index]))
    }

    pub fn input(&self) -> Option<&AffinePoint> {
        self.input.as_ref()
    }

    pub fn scalar(&self) -> Option<&BigUint> {
        self.scalar.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, SampleOrigin)> + '_ {
        self.samples.iter().copied().zip(self.origins.iter().copied())
    }

    /// Copies samples `range` into a new trace, keeping input and scalar.
    pub fn window(&self, range: Range<usize>) -> Result<Trace, TraceError> {
        if range.start > range.end || range.end > self.len() {
            return Err(TraceError::Window {
                start: range.start,
                end: range.end,
                len: self.len(),
            });
        }
        Ok(Trace {
            samples: self.samples[range.clone()].to_vec(),
            origins: self.origins[range].to_vec(),
            input: self.input.clone(),
            scalar: self.scalar.clone(),
        })
    }

    /// Resamples to `len` samples by linear interpolation. Every new sample
    /// takes the origin of the nearest source sample.
    pub fn resample(&self, len: usize) -> Result<Trace, TraceError> {
        if len == 0 || self.is_empty() {
            return Err(TraceError::EmptyResample);
        }
        let last = self.len() - 1;
        let scale = if len == 1 { 0.0 } else { last as f64 / (len - 1) as f64 };
        let mut samples = Vec::with_capacity(len);
        let mut origins = Vec::with_capacity(len);
        for i in 0..len {
            let x = i as f64 * scale;
            let lo = (x.floor() as usize).min(last);
            let hi = (lo + 1).min(last);
            let t = x - lo as f64;
            samples.push(self.samples[lo] * (1.0 - t) + self.samples[hi] * t);
            origins.push(self.origins[(x.round() as usize).min(last)]);
        }
        Ok(Trace {
            samples,
            origins,
            input: self.input.clone(),
            scalar: self.scalar.clone(),
        })
    }

    /// Whether `other` has the same sample count and origin sequence.
    pub fn is_compatible(&self, other: &Trace) -> bool {
        self.incompatibility(other).is_none()
    }

    fn incompatibility(&self, other: &Trace) -> Option<&'static str> {
        if self.len() != other.len() {
            Some("sample counts differ")
        } else if self.origins != other.origins {
            Some("sample origins differ")
        } else {
            None
        }
    }
}

impl<I: SliceIndex<[f64]>> Index<I> for Trace {
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.samples[index]
    }
}

/// An ordered collection of traces.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSet {
    traces: Vec<Trace>,
}

impl TraceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Trace> {
        self.traces.get(index)
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }

    /// Checks every trace against the first.
    pub fn check_compatible(&self) -> Result<(), TraceError> {
        let Some(first) = self.traces.first() else {
            return Ok(());
        };
        for (index, trace) in self.traces.iter().enumerate().skip(1) {
            if let Some(reason) = first.incompatibility(trace) {
                return Err(TraceError::Incompatible { index, reason });
            }
        }
        Ok(())
    }
}

impl From<Vec<Trace>> for TraceSet {
    fn from(traces: Vec<Trace>) -> Self {
        Self { traces }
    }
}

impl FromIterator<Trace> for TraceSet {
    fn from_iter<T: IntoIterator<Item = Trace>>(iter: T) -> Self {
        Self {
            traces: iter.into_iter().collect(),
        }
    }
}

impl Extend<Trace> for TraceSet {
    fn extend<T: IntoIterator<Item = Trace>>(&mut self, iter: T) {
        self.traces.extend(iter);
    }
}

impl IntoIterator for TraceSet {
    type Item = Trace;
    type IntoIter = std::vec::IntoIter<Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.into_iter()
    }
}

impl<'a> IntoIterator for &'a TraceSet {
    type Item = &'a Trace;
    type IntoIter = std::slice::Iter<'a, Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}
