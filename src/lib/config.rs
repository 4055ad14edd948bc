//! Run configuration.
//!
//! The command line builds a [`CollapseConfig`] and validates it once before any input is
//! read; the pipeline only reads it afterwards.

use crate::barcode::BarcodePattern;
use crate::consensus::overlap::AgreementStrategy;
use crate::errors::{CollapseError, Result};
use crate::grouper::DuplexJoin;
use crate::phred::MIN_PHRED;
use crate::validation::{string_to_tag, validate_fraction, validate_positive, validate_quality_score};

/// Consensus and quality-weighting parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOptions {
    /// Phred-scaled error rate of events before barcode attachment
    pub error_rate_pre_umi: u8,
    /// Phred-scaled error rate of events after barcode attachment (PCR)
    pub error_rate_post_umi: u8,
    /// Bases below this quality do not vote, unless no base at their position reaches it
    pub min_input_base_quality: u8,
    /// Cap on any emitted consensus quality
    pub max_consensus_quality: u8,
    /// Majority-strand fraction above which a family is flagged as strand-biased
    pub strand_bias_threshold: f64,
    /// Families smaller than this are never flagged
    pub min_strand_bias_family_size: usize,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self {
            error_rate_pre_umi: 45,
            error_rate_post_umi: 40,
            min_input_base_quality: 10,
            max_consensus_quality: 93,
            strand_bias_threshold: 0.9,
            min_strand_bias_family_size: 3,
        }
    }
}

/// Barcode parsing and family membership parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeOptions {
    /// IUPAC pattern, optionally split into mate halves with `-`
    pub pattern: String,
    /// 0/1 mask over the pattern or over one half
    pub mask: Option<String>,
    /// SAM tag holding the barcode fragment
    pub tag: String,
    /// Degenerate-base mismatches tolerated within a family
    pub max_mismatches: u32,
    /// Mismatches to the pattern beyond which a barcode is chimeric
    pub max_pattern_mismatches: Option<u32>,
    /// Exclude chimeric pairs instead of only counting them
    pub discard_chimeric: bool,
    /// 0/1 mask of the positions compared when joining top and bottom strand families
    pub duplex_mask: Option<String>,
    /// Mismatches tolerated when joining top and bottom strand families
    pub duplex_max_mismatches: Option<u32>,
}

impl BarcodeOptions {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mask: None,
            tag: "RX".to_string(),
            max_mismatches: 1,
            max_pattern_mismatches: None,
            discard_chimeric: false,
            duplex_mask: None,
            duplex_max_mismatches: None,
        }
    }
}

/// Everything a collapse run reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseConfig {
    pub barcode: BarcodeOptions,
    /// Width in bases of the genomic bins pairs are grouped in
    pub bin_width: usize,
    /// Pairs with a mate exceeding this many reference mismatches are excluded
    pub max_read_mismatches: Option<u32>,
    pub consensus: ConsensusOptions,
    pub overlap_agreement: AgreementStrategy,
}

impl CollapseConfig {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            barcode: BarcodeOptions::new(pattern),
            bin_width: 1,
            max_read_mismatches: None,
            consensus: ConsensusOptions::default(),
            overlap_agreement: AgreementStrategy::Consensus,
        }
    }

    /// Checks every parameter and returns the parsed barcode pattern.
    pub fn validate(&self) -> Result<BarcodePattern> {
        validate_positive(self.bin_width, "bin-width")?;
        string_to_tag(&self.barcode.tag, "barcode-tag")?;

        let c = &self.consensus;
        validate_quality_score(c.error_rate_pre_umi, "error-rate-pre-umi")?;
        validate_quality_score(c.error_rate_post_umi, "error-rate-post-umi")?;
        validate_quality_score(c.min_input_base_quality, "min-input-base-quality")?;
        validate_quality_score(c.max_consensus_quality, "max-consensus-quality")?;
        if c.max_consensus_quality < MIN_PHRED {
            return Err(CollapseError::InvalidParameter {
                parameter: "max-consensus-quality".to_string(),
                reason: format!("Must be at least {MIN_PHRED}, got: {}", c.max_consensus_quality),
            });
        }
        validate_fraction(c.strand_bias_threshold, 0.5, 1.0, "strand-bias-threshold")?;
        validate_positive(c.min_strand_bias_family_size, "min-strand-bias-family-size")?;

        let pattern = BarcodePattern::parse(&self.barcode.pattern, self.barcode.mask.as_deref())?;
        self.duplex_join(&pattern)?;
        Ok(pattern)
    }

    /// How strand families are joined into duplex families, or `None` when they are not.
    ///
    /// Joining needs a pattern split into two identical halves. The duplex mask defaults to
    /// the pattern's mask and the duplex tolerance to the family tolerance.
    pub fn duplex_join(&self, pattern: &BarcodePattern) -> Result<Option<DuplexJoin>> {
        let requested = self.barcode.duplex_mask.is_some() || self.barcode.duplex_max_mismatches.is_some();
        if !pattern.is_symmetric() {
            if requested {
                return Err(CollapseError::InvalidParameter {
                    parameter: "duplex-mask".to_string(),
                    reason: format!(
                        "Duplex joining needs a pattern split into two identical halves, got: {}",
                        self.barcode.pattern
                    ),
                });
            }
            return Ok(None);
        }
        Ok(Some(DuplexJoin {
            positions: pattern.positions_for_mask(self.barcode.duplex_mask.as_deref())?,
            tolerance: self.barcode.duplex_max_mismatches.unwrap_or(self.barcode.max_mismatches),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CollapseConfig::new("NNNNNN");
        let pattern = config.validate().unwrap();
        assert_eq!(pattern.len(), 6);
        assert_eq!(config.barcode.max_mismatches, 1);
        assert_eq!(config.bin_width, 1);
    }

    #[test]
    fn test_duplex_join_defaults() {
        let config = CollapseConfig::new("NNNNNN");
        assert_eq!(config.duplex_join(&config.validate().unwrap()).unwrap(), None);

        let mut config = CollapseConfig::new("NNT-NNT");
        config.barcode.mask = Some("110".to_string());
        let pattern = config.validate().unwrap();
        let duplex = config.duplex_join(&pattern).unwrap().unwrap();
        assert_eq!(duplex.positions, vec![0, 1, 3, 4]);
        assert_eq!(duplex.tolerance, 1);

        config.barcode.duplex_mask = Some("100".to_string());
        config.barcode.duplex_max_mismatches = Some(0);
        let duplex = config.duplex_join(&pattern).unwrap().unwrap();
        assert_eq!(duplex.positions, vec![0, 3]);
        assert_eq!(duplex.tolerance, 0);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut config = CollapseConfig::new("NNNN");
        config.bin_width = 0;
        assert!(config.validate().unwrap_err().to_string().contains("bin-width"));

        let mut config = CollapseConfig::new("NNNN");
        config.consensus.strand_bias_threshold = 0.2;
        assert!(config.validate().unwrap_err().to_string().contains("strand-bias-threshold"));

        let mut config = CollapseConfig::new("NNNN");
        config.consensus.max_consensus_quality = 1;
        assert!(config.validate().is_err());

        let mut config = CollapseConfig::new("NNNN");
        config.barcode.tag = "R".to_string();
        assert!(config.validate().is_err());

        let mut config = CollapseConfig::new("NNNN");
        config.barcode.duplex_max_mismatches = Some(1);
        assert!(config.validate().unwrap_err().to_string().contains("duplex-mask"));

        let mut config = CollapseConfig::new("NN-NN");
        config.barcode.duplex_mask = Some("111".to_string());
        assert!(matches!(config.validate(), Err(CollapseError::InvalidBarcodePattern { .. })));

        let config = CollapseConfig::new("NN?N");
        assert!(matches!(config.validate(), Err(CollapseError::InvalidBarcodePattern { .. })));
    }
}
