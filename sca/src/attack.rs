//! Statistical attacks recovering one scalar digit at a time.
//!
//! Every hypothesis fixes the target digit to one candidate value. Together
//! with the known digits this determines the values of some operations of
//! the plan (its influenced positions); those are predicted for every trace
//! by running the plan on the trace's public input, and compared against
//! the samples the traces recorded at the same positions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use engine::{ExecutionEngine, ExecutionPlan, OpEvent, OpObserver};
use num_bigint::BigUint;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::config::AttackConfig;
use crate::error::{AttackError, TraceError};
use crate::leakage::LeakageFunction;
use crate::trace::TraceSet;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Statistic {
    /// Pearson correlation between modeled leakage and samples.
    Correlation,
    /// Difference of sample means, partitioned on a bit of the predicted value.
    DifferenceOfMeans { bit: u32 },
}

impl Statistic {
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Correlation => "correlation",
            Statistic::DifferenceOfMeans { .. } => "difference-of-means",
        }
    }

    /// Fewest traces the statistic is defined on.
    pub fn min_traces(&self) -> usize {
        match self {
            Statistic::Correlation => 3,
            Statistic::DifferenceOfMeans { .. } => 2,
        }
    }
}

/// The candidate values of one target digit, given the known digits.
#[derive(Clone, Debug)]
pub struct HypothesisSpace {
    plan: Arc<ExecutionPlan>,
    target: u32,
    known: BTreeMap<u32, i64>,
    candidates: Vec<i64>,
    positions: Vec<(u32, u32)>,
}

impl HypothesisSpace {
    /// Candidates default to the plan's whole digit alphabet.
    pub fn new(plan: Arc<ExecutionPlan>, target: u32, known: BTreeMap<u32, i64>) -> Result<Self, AttackError> {
        let count = plan.layout().count;
        let alphabet = plan.layout().alphabet();
        if target >= count {
            return Err(AttackError::InvalidTarget { digit: target, count });
        }
        if known.contains_key(&target) {
            return Err(AttackError::TargetKnown { digit: target });
        }
        for (&digit, &value) in &known {
            if digit >= count {
                return Err(AttackError::InvalidTarget { digit, count });
            }
            if !alphabet.contains(&value) {
                return Err(AttackError::InvalidDigit { digit, value });
            }
        }

        let positions = plan
            .dependencies()
            .influenced(&plan, target, |digit| known.contains_key(&digit));
        if positions.is_empty() {
            return Err(AttackError::NoInfluencedPositions { target });
        }
        Ok(Self {
            plan,
            target,
            known,
            candidates: alphabet,
            positions,
        })
    }

    /// Restricts the candidates to `values`, each of which must be a valid digit.
    pub fn with_candidates(mut self, values: impl IntoIterator<Item = i64>) -> Result<Self, AttackError> {
        let alphabet = self.plan.layout().alphabet();
        let mut candidates = Vec::new();
        for value in values {
            if !alphabet.contains(&value) {
                return Err(AttackError::InvalidDigit {
                    digit: self.target,
                    value,
                });
            }
            candidates.push(value);
        }
        candidates.sort_unstable();
        candidates.dedup();
        self.candidates = candidates;
        Ok(self)
    }

    pub fn plan(&self) -> &Arc<ExecutionPlan> {
        &self.plan
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn known(&self) -> &BTreeMap<u32, i64> {
        &self.known
    }

    pub fn candidates(&self) -> &[i64] {
        &self.candidates
    }

    /// Operations whose value the hypotheses determine, as `(step, node)`
    /// pairs in evaluation order.
    pub fn positions(&self) -> &[(u32, u32)] {
        &self.positions
    }

    /// Full digit vector for `candidate`; unknown digits are zero.
    pub fn digits(&self, candidate: i64) -> Vec<i64> {
        let mut digits = vec![0; self.plan.layout().count as usize];
        for (&digit, &value) in &self.known {
            digits[digit as usize] = value;
        }
        digits[self.target as usize] = candidate;
        digits
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HypothesisScore {
    pub value: i64,
    /// Peak absolute statistic over all matched samples.
    pub score: f64,
    /// Sample index of the peak. Ties, including an all-zero statistic, go
    /// to the earliest matched sample.
    pub peak: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedRecovery {
    pub target: u32,
    /// Best first: by score, then earliest peak, then smallest value.
    pub ranking: Vec<HypothesisScore>,
    /// `false` when cancellation left some hypotheses unscored.
    pub complete: bool,
}

impl RankedRecovery {
    pub fn best(&self) -> Option<&HypothesisScore> {
        self.ranking.first()
    }

    /// One-based rank of `value`.
    pub fn rank_of(&self, value: i64) -> Option<usize> {
        self.ranking.iter().position(|h| h.value == value).map(|i| i + 1)
    }
}

/// Collects predicted values at the influenced positions.
struct Predictor<'a> {
    slots: &'a HashMap<(u32, u32), usize>,
    steps: &'a HashSet<u32>,
    values: Vec<Option<BigUint>>,
}

impl OpObserver for Predictor<'_> {
    fn wants(&self, step: u32) -> bool {
        self.steps.contains(&step)
    }

    fn on_op(&mut self, event: OpEvent<'_>) {
        if let Some(&slot) = self.slots.get(&(event.step, event.node)) {
            self.values[slot] = Some(event.value.clone());
        }
    }
}

// Influenced positions that are present in the traces, with the sample
// indices of each lane.
struct Matched {
    positions: Vec<(u32, u32)>,
    samples: Vec<Vec<(u32, usize)>>,
}

#[derive(Debug)]
pub struct AttackEngine {
    engine: Arc<ExecutionEngine>,
    model: LeakageFunction,
    config: AttackConfig,
}

impl AttackEngine {
    /// `model` is the leakage assumed by [`Statistic::Correlation`].
    pub fn new(engine: Arc<ExecutionEngine>, model: LeakageFunction, config: AttackConfig) -> Result<Self, AttackError> {
        model.validate()?;
        Ok(Self { engine, model, config })
    }

    /// Scores every hypothesis of `space` against `traces`. Hypotheses not
    /// yet started when `cancel` fires are left out of the ranking.
    pub fn attack(
        &self,
        traces: &TraceSet,
        space: &HypothesisSpace,
        statistic: Statistic,
        cancel: &CancellationToken,
    ) -> Result<RankedRecovery, AttackError> {
        if traces.len() < statistic.min_traces() {
            return Err(AttackError::InsufficientTraces {
                statistic: statistic.name(),
                required: statistic.min_traces(),
                found: traces.len(),
            });
        }
        traces.check_compatible().map_err(|error| match error {
            TraceError::Incompatible { index, reason } => AttackError::IncompatibleTraces { index, reason },
            _ => AttackError::IncompatibleTraces {
                index: 0,
                reason: "malformed trace",
            },
        })?;
        if let Some(index) = traces.iter().position(|t| t.input().is_none()) {
            return Err(AttackError::MissingInput { index });
        }

        let matched = match_samples(traces, space);
        if matched.positions.is_empty() {
            return Err(AttackError::NoMatchingSamples);
        }

        let score = |&value: &i64| -> Result<Option<HypothesisScore>, AttackError> {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let (score, peak) = self.score(traces, space, &matched, statistic, value)?;
            trace!(target: "sca::attack", target_digit = space.target(), value, score, peak, "scored hypothesis");
            Ok(Some(HypothesisScore { value, score, peak }))
        };
        let scores: Vec<Option<HypothesisScore>> = if self.config.parallel {
            space.candidates().par_iter().map(score).collect::<Result<_, _>>()?
        } else {
            space.candidates().iter().map(score).collect::<Result<_, _>>()?
        };

        let complete = scores.iter().all(Option::is_some);
        let mut ranking: Vec<HypothesisScore> = scores.into_iter().flatten().collect();
        ranking.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.peak.cmp(&b.peak))
                .then(a.value.cmp(&b.value))
        });
        debug!(
            target: "sca::attack",
            plan = %space.plan().id(),
            target_digit = space.target(),
            statistic = statistic.name(),
            traces = traces.len(),
            positions = matched.positions.len(),
            best = ranking.first().map(|h| h.value),
            complete,
            "attack finished"
        );
        Ok(RankedRecovery {
            target: space.target(),
            ranking,
            complete,
        })
    }

    fn score(
        &self,
        traces: &TraceSet,
        space: &HypothesisSpace,
        matched: &Matched,
        statistic: Statistic,
        value: i64,
    ) -> Result<(f64, usize), AttackError> {
        let plan = space.plan();
        let digits = space.digits(value);
        let slots: HashMap<(u32, u32), usize> = matched
            .positions
            .iter()
            .enumerate()
            .map(|(slot, position)| (*position, slot))
            .collect();
        let steps: HashSet<u32> = matched.positions.iter().map(|(step, _)| *step).collect();
        let last = steps.iter().copied().max().unwrap_or(0) as usize;

        // predictions[slot][trace]
        let mut predictions: Vec<Vec<BigUint>> = vec![Vec::with_capacity(traces.len()); slots.len()];
        let mut executed = vec![true; slots.len()];
        for trace in traces {
            let Some(input) = trace.input() else {
                continue;
            };
            let mut predictor = Predictor {
                slots: &slots,
                steps: &steps,
                values: vec![None; slots.len()],
            };
            self.engine
                .observe_prefix(plan, input, &digits, last, &mut predictor)?;
            for (slot, predicted) in predictor.values.into_iter().enumerate() {
                match predicted {
                    Some(v) => predictions[slot].push(v),
                    None => executed[slot] = false,
                }
            }
        }

        let bits = plan.curve().modulus().bits();
        let mut best: Option<(f64, usize)> = None;
        let mut modeled = Vec::new();
        let mut measured = Vec::with_capacity(traces.len());
        for (slot, lanes) in matched.samples.iter().enumerate() {
            // a step this hypothesis skips leaks nothing to compare against
            if !executed[slot] {
                continue;
            }
            for &(lane, index) in lanes {
                measured.clear();
                measured.extend(traces.iter().map(|t| t[index]));
                let stat = match statistic {
                    Statistic::Correlation => {
                        modeled.clear();
                        let mut buffer = Vec::new();
                        for v in &predictions[slot] {
                            buffer.clear();
                            self.model.leak(v, bits, &mut buffer);
                            modeled.push(buffer.get(lane as usize).copied().unwrap_or(0.0));
                        }
                        pearson(&modeled, &measured)
                    }
                    Statistic::DifferenceOfMeans { bit } => {
                        difference_of_means(&predictions[slot], &measured, bit as u64)
                    }
                };
                // undefined statistics carry no evidence
                let s = if stat.is_nan() { 0.0 } else { stat.abs() };
                match best {
                    Some((score, peak)) if s < score || (s == score && index >= peak) => {}
                    _ => best = Some((s, index)),
                }
            }
        }
        Ok(best.unwrap_or((0.0, 0)))
    }
}

fn match_samples(traces: &TraceSet, space: &HypothesisSpace) -> Matched {
    let mut by_position: HashMap<(u32, u32), Vec<(u32, usize)>> = HashMap::new();
    if let Some(first) = traces.get(0) {
        for (index, origin) in first.origins().iter().enumerate() {
            by_position.entry(origin.position()).or_default().push((origin.lane, index));
        }
    }
    let mut matched = Matched {
        positions: Vec::new(),
        samples: Vec::new(),
    };
    for position in space.positions() {
        if let Some(lanes) = by_position.remove(position) {
            matched.positions.push(*position);
            matched.samples.push(lanes);
        }
    }
    matched
}

/// Pearson correlation coefficient; zero when either side is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len()) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x * var_y).sqrt()
}

/// Mean of samples whose predicted value has `bit` set minus the mean of
/// the rest; zero when either partition is empty.
pub fn difference_of_means(predicted: &[BigUint], samples: &[f64], bit: u64) -> f64 {
    let (mut sum1, mut n1, mut sum0, mut n0) = (0.0, 0usize, 0.0, 0usize);
    for (value, sample) in predicted.iter().zip(samples) {
        if value.bit(bit) {
            sum1 += sample;
            n1 += 1;
        } else {
            sum0 += sample;
            n0 += 1;
        }
    }
    if n1 == 0 || n0 == 0 {
        return 0.0;
    }
    sum1 / n1 as f64 - sum0 / n0 as f64
}
