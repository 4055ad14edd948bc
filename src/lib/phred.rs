//! Phred-scaled quality arithmetic in natural-log space.
//!
//! Consensus votes are accumulated as log-likelihoods; these helpers convert between Phred
//! scores and log error probabilities and combine probabilities without leaving log space.

use std::f64::consts::{LN_2, LN_10};

pub use fgcollapse_dna::{MAX_PHRED, MIN_PHRED, NO_CALL_BASE};

/// ln(4/3)
const LN_FOUR_THIRDS: f64 = 0.287_682_072_451_780_9;

/// Offset added before flooring so that exact Phred values survive the round trip.
const PHRED_PRECISION: f64 = 0.001;

/// A Phred-scaled quality score.
pub type PhredScore = u8;

/// A natural-log probability.
pub type LogProbability = f64;

/// ln(P(error)) for a Phred score.
#[inline]
#[must_use]
pub fn phred_to_ln_error_prob(phred: PhredScore) -> LogProbability {
    -f64::from(phred) * LN_10 / 10.0
}

/// ln(P(correct)) for a Phred score.
#[inline]
#[must_use]
pub fn phred_to_ln_correct_prob(phred: PhredScore) -> LogProbability {
    ln_not(phred_to_ln_error_prob(phred))
}

/// Converts a log error probability to a Phred score in `MIN_PHRED..=MAX_PHRED`.
#[inline]
#[must_use]
pub fn ln_prob_to_phred(ln_prob: LogProbability) -> PhredScore {
    if ln_prob < phred_to_ln_error_prob(MAX_PHRED) {
        return MAX_PHRED;
    }
    let phred = (-10.0 * ln_prob / LN_10 + PHRED_PRECISION).floor();
    phred.clamp(f64::from(MIN_PHRED), f64::from(MAX_PHRED)) as PhredScore
}

#[inline]
fn log1pexp(x: f64) -> f64 {
    if x <= -37.0 {
        x.exp()
    } else if x <= 18.0 {
        x.exp().ln_1p()
    } else if x <= 33.3 {
        x + (-x).exp()
    } else {
        x
    }
}

/// ln(1 - exp(x)).
#[inline]
#[must_use]
pub fn ln_not(x: LogProbability) -> LogProbability {
    if x >= 0.0 {
        f64::NEG_INFINITY
    } else if x >= -LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

fn ln_a_minus_b(a: f64, b: f64) -> f64 {
    if b == f64::NEG_INFINITY {
        a
    } else if (a - b).abs() < f64::EPSILON {
        f64::NEG_INFINITY
    } else {
        a + ln_not(b - a)
    }
}

/// ln(exp(a) + exp(b)).
#[must_use]
pub fn ln_sum_exp(ln_a: LogProbability, ln_b: LogProbability) -> LogProbability {
    if ln_a == f64::NEG_INFINITY {
        return ln_b;
    }
    if ln_b == f64::NEG_INFINITY {
        return ln_a;
    }
    let (low, high) = if ln_b < ln_a { (ln_b, ln_a) } else { (ln_a, ln_b) };
    low + log1pexp(high - low)
}

/// ln of the sum of exp of every value, accumulated from the smallest term.
#[must_use]
pub fn ln_sum_exp_array(values: &[LogProbability]) -> LogProbability {
    let Some((min_index, &min_value)) =
        values.iter().enumerate().min_by(|(_, a), (_, b)| a.total_cmp(b))
    else {
        return f64::NEG_INFINITY;
    };
    if min_value.is_infinite() {
        return min_value;
    }
    values
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != min_index)
        .fold(min_value, |sum, (_, &value)| ln_sum_exp(sum, value))
}

/// Probability that at least one of two independent error processes changed the base,
/// where an error in both can restore the original with probability 1/3:
/// `p1 + p2 - 4/3 * p1 * p2`.
#[must_use]
pub fn ln_error_prob_two_trials(ln_p1: LogProbability, ln_p2: LogProbability) -> LogProbability {
    let (ln_p1, ln_p2) = if ln_p1 < ln_p2 { (ln_p2, ln_p1) } else { (ln_p1, ln_p2) };
    if ln_p1 - ln_p2 >= 6.0 {
        return ln_p1;
    }
    let either = ln_sum_exp(ln_p1, ln_p2);
    let both = LN_FOUR_THIRDS + ln_p1 + ln_p2;
    ln_a_minus_b(either, both)
}
