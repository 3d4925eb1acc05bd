//! # pgx-profile - Pharmacogenomic Profile Derivation
//!
//! Turns an uploaded variant-call text stream into a per-gene clinical
//! genotype/phenotype record. The pipeline validates the stream in a single
//! pass, extracts star-allele observations for the gene panel, collapses them
//! into one diplotype per gene and resolves a metabolizer phenotype.

pub mod diplotype;
pub mod extract;
pub mod panel;
pub mod phenotype;
pub mod profile;
pub mod report;
pub mod risk;
pub mod utils;
pub mod validator;
pub mod vcf;

use serde::{Deserialize, Serialize};

/// One extracted pharmacogenomic observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub gene: String,
    pub allele: String,
    pub rsid: String,
    pub gt: String,
}

impl Variant {
    pub fn new(gene: String, allele: String, rsid: String, gt: String) -> Self {
        Self {
            gene,
            allele,
            rsid,
            gt,
        }
    }
}

/// Variant as exposed in a gene profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedVariant {
    pub allele: String,
    pub rsid: String,
}

impl From<&Variant> for DetectedVariant {
    fn from(variant: &Variant) -> Self {
        Self {
            allele: variant.allele.clone(),
            rsid: variant.rsid.clone(),
        }
    }
}

/// Resolved genotype/phenotype record for one panel gene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneProfile {
    pub diplotype: String,
    pub phenotype: String,
    pub detected_variants: Vec<DetectedVariant>,
}

/// What to do when more than two non-wild-type alleles are found for a gene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NarrowingPolicy {
    /// Keep the two most severe alleles without reporting the rest
    #[default]
    Silent,
    /// Keep the two most severe alleles and record a warning naming the dropped ones
    Warn,
}

/// Limits and literals enforced by the stream validator
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub extension: String,
    pub supported_version: String,
    pub max_file_size: u64,
    pub min_file_size: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            extension: "vcf".to_string(),
            supported_version: "VCFv4.2".to_string(),
            max_file_size: 5 * 1024 * 1024,
            min_file_size: 1024,
        }
    }
}

/// Settings for the profiling stage that runs after a successful validation
#[derive(Debug, Clone, Default)]
pub struct ProfileConfig {
    pub narrowing: NarrowingPolicy,
}

/// Check validator limits for consistency
pub fn validate_config(config: &ValidationConfig) -> PgxResult<()> {
    if config.extension.is_empty() || config.extension.starts_with('.') {
        return Err(PgxError::InvalidConfig(
            "extension must be non-empty and given without a leading dot".to_string(),
        ));
    }

    if config.supported_version.is_empty() {
        return Err(PgxError::InvalidConfig(
            "supported file-format version must be non-empty".to_string(),
        ));
    }

    if config.max_file_size == 0 {
        return Err(PgxError::InvalidConfig(
            "max_file_size must be greater than 0".to_string(),
        ));
    }

    if config.min_file_size > config.max_file_size {
        return Err(PgxError::InvalidConfig(
            "min_file_size must not exceed max_file_size".to_string(),
        ));
    }

    Ok(())
}

/// Error types for the pgx-profile library
#[derive(Debug, thiserror::Error)]
pub enum PgxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid allele designator: {0}")]
    InvalidAllele(String),

    #[error("Invalid phenotype table: {0}")]
    InvalidTable(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type PgxResult<T> = Result<T, PgxError>;
