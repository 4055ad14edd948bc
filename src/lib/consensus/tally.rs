//! Per-position, quality-weighted base tally.
//!
//! Each observation of base `b` at quality `q` contributes `ln(1 - e)` to `b` and `ln(e / 3)`
//! to each other base, where `e` folds the sequencing error implied by `q` together with the
//! post-barcode (PCR) error rate. The consensus base is the one with the greatest summed
//! log-likelihood. Its quality is the posterior error combined with the pre-barcode error rate,
//! so it rises with both agreement and depth.

use approx::abs_diff_eq;
use wide::f64x4;

use fgcollapse_dna::{BASES, base_index};

use crate::phred::{
    LogProbability, MAX_PHRED, MIN_PHRED, NO_CALL_BASE, PhredScore, ln_error_prob_two_trials,
    ln_not, ln_prob_to_phred, ln_sum_exp_array, phred_to_ln_error_prob,
};
use crate::read_pair::SourceStrand;

/// Log-likelihoods closer than this are treated as tied.
const TIE_EPSILON: f64 = 1e-9;

/// Above this log-likelihood gap a unanimous call's posterior is indistinguishable from 1.
const UNANIMOUS_GAP: f64 = 23.0;

/// Per-quality likelihood terms, shared by every tally built from the same error rates.
#[derive(Debug, Clone)]
pub struct ErrorModel {
    ln_correct: [LogProbability; MAX_PHRED as usize + 1],
    ln_error_per_alt: [LogProbability; MAX_PHRED as usize + 1],
    ln_error_pre_umi: LogProbability,
}

impl ErrorModel {
    /// Builds the model from Phred-scaled error rates before and after barcode attachment.
    #[must_use]
    pub fn new(error_rate_pre_umi: PhredScore, error_rate_post_umi: PhredScore) -> Self {
        let ln_error_post = phred_to_ln_error_prob(error_rate_post_umi);
        let mut ln_correct = [0.0; MAX_PHRED as usize + 1];
        let mut ln_error_per_alt = [0.0; MAX_PHRED as usize + 1];
        for q in 0..=MAX_PHRED {
            let adjusted = ln_error_prob_two_trials(ln_error_post, phred_to_ln_error_prob(q));
            ln_correct[q as usize] = ln_not(adjusted);
            ln_error_per_alt[q as usize] = adjusted - 3.0_f64.ln();
        }
        Self { ln_correct, ln_error_per_alt, ln_error_pre_umi: phred_to_ln_error_prob(error_rate_pre_umi) }
    }

    /// The highest quality any consensus call can reach under this model.
    #[must_use]
    pub fn max_quality(&self) -> PhredScore {
        ln_prob_to_phred(self.ln_error_pre_umi)
    }
}

/// Accumulates observations at one reference position.
pub struct BaseTally<'m> {
    model: &'m ErrorModel,
    likelihoods: f64x4,
    compensations: f64x4,
    observations: [u32; 4],
    by_source: [[u32; 2]; 4],
}

impl<'m> BaseTally<'m> {
    #[must_use]
    pub fn new(model: &'m ErrorModel) -> Self {
        Self {
            model,
            likelihoods: f64x4::splat(0.0),
            compensations: f64x4::splat(0.0),
            observations: [0; 4],
            by_source: [[0; 2]; 4],
        }
    }

    /// Clears all observations.
    pub fn reset(&mut self) {
        self.likelihoods = f64x4::splat(0.0);
        self.compensations = f64x4::splat(0.0);
        self.observations = [0; 4];
        self.by_source = [[0; 2]; 4];
    }

    /// Adds one observation. Anything other than A/C/G/T is ignored.
    pub fn add(&mut self, base: u8, qual: PhredScore, source: SourceStrand) {
        let Some(idx) = base_index(base) else { return };
        let q = qual.min(MAX_PHRED) as usize;

        let mut values = [self.model.ln_error_per_alt[q]; 4];
        values[idx] = self.model.ln_correct[q];

        // Kahan summation across all four lanes
        let y = f64x4::from(values) - self.compensations;
        let t = self.likelihoods + y;
        self.compensations = (t - self.likelihoods) - y;
        self.likelihoods = t;

        self.observations[idx] += 1;
        self.by_source[idx][source as usize] += 1;
    }

    /// Number of observations counted.
    #[must_use]
    pub fn contributions(&self) -> u32 {
        self.observations.iter().sum()
    }

    /// Observations of `base`.
    #[must_use]
    pub fn observations_for(&self, base: u8) -> u32 {
        base_index(base).map_or(0, |i| self.observations[i])
    }

    /// Calls the consensus base and its quality.
    ///
    /// Bases whose likelihoods tie are separated by, in order: matching `reference_base`,
    /// more observations from the `favoured` source strand, and A < C < G < T. With no
    /// observations the call is `N` at the minimum quality.
    #[must_use]
    pub fn call(&self, reference_base: Option<u8>, favoured: Option<SourceStrand>) -> (u8, PhredScore) {
        if self.contributions() == 0 {
            return (NO_CALL_BASE, MIN_PHRED);
        }
        let likelihoods = self.likelihoods.to_array();

        let observed: Vec<usize> = (0..4).filter(|&i| self.observations[i] > 0).collect();
        if let [only] = observed[..] {
            let loser = likelihoods[(only + 1) % 4];
            if likelihoods[only] - loser > UNANIMOUS_GAP {
                return (BASES[only], self.model.max_quality());
            }
        }

        let max = likelihoods.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<usize> = (0..4)
            .filter(|&i| abs_diff_eq!(likelihoods[i], max, epsilon = TIE_EPSILON))
            .collect();
        let winner = match tied[..] {
            [single] => single,
            _ => self.break_tie(&tied, reference_base, favoured),
        };

        let ln_posterior = likelihoods[winner] - ln_sum_exp_array(&likelihoods);
        let ln_final_error = ln_error_prob_two_trials(self.model.ln_error_pre_umi, ln_not(ln_posterior));
        (BASES[winner], ln_prob_to_phred(ln_final_error))
    }

    fn break_tie(&self, tied: &[usize], reference_base: Option<u8>, favoured: Option<SourceStrand>) -> usize {
        if let Some(r) = reference_base.and_then(base_index) {
            if tied.contains(&r) {
                return r;
            }
        }
        if let Some(source) = favoured {
            let support = |i: usize| self.by_source[i][source as usize];
            let best = tied.iter().map(|&i| support(i)).max().unwrap_or(0);
            if let Some(leader) = tied.iter().copied().find(|&i| support(i) == best) {
                return leader;
            }
        }
        tied[0]
    }
}
