//! Diplotype construction with severity-ranked tie-breaking

use crate::extract::GeneObservations;
use crate::panel::WILD_TYPE;
use crate::vcf::Zygosity;
use crate::{PgxError, PgxResult, Variant};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

const BASE_HIGH_RISK: [&str; 10] = ["*3", "*4", "*5", "*6", "*8", "*11", "*12", "*13", "*14", "*15"];
const BASE_MEDIUM_RISK: [&str; 6] = ["*2", "*9", "*10", "*17", "*41", "*1B"];

/// Genes for which `*2` counts as high risk instead of medium
const STAR2_PROMOTED_GENES: [&str; 2] = ["CYP2C19", "CYP2C9"];
const PROMOTED_ALLELE: &str = "*2";

pub const HIGH_RISK_SCORE: u8 = 10;
pub const MEDIUM_RISK_SCORE: u8 = 5;
pub const OTHER_RISK_SCORE: u8 = 2;
pub const WILD_TYPE_SCORE: u8 = 0;

/// Gene-adjusted risk tiers used to rank alleles
#[derive(Debug, Clone)]
pub struct SeverityTable {
    high: Vec<&'static str>,
    medium: Vec<&'static str>,
}

impl SeverityTable {
    pub fn base() -> Self {
        Self {
            high: BASE_HIGH_RISK.to_vec(),
            medium: BASE_MEDIUM_RISK.to_vec(),
        }
    }

    pub fn for_gene(gene: &str) -> Self {
        let mut table = Self::base();
        if STAR2_PROMOTED_GENES.contains(&gene) {
            table.medium.retain(|a| *a != PROMOTED_ALLELE);
            table.high.push(PROMOTED_ALLELE);
        }
        table
    }

    pub fn score(&self, allele: &str) -> u8 {
        if allele == WILD_TYPE {
            WILD_TYPE_SCORE
        } else if self.high.contains(&allele) {
            HIGH_RISK_SCORE
        } else if self.medium.contains(&allele) {
            MEDIUM_RISK_SCORE
        } else {
            OTHER_RISK_SCORE
        }
    }
}

/// Number embedded in a designator, reading its digits in order (`*2A` -> 2, `*41` -> 41)
fn embedded_number(allele: &str) -> Option<u64> {
    let digits: String = allele.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits.parse::<u64>().unwrap_or(u64::MAX))
    }
}

/// Display order: wild-type first, then ascending embedded number, then designators without digits
fn display_order(a: &str, b: &str) -> Ordering {
    fn key(allele: &str) -> (u8, u64) {
        if allele == WILD_TYPE {
            return (0, 0);
        }
        match embedded_number(allele) {
            Some(n) => (1, n),
            None => (2, 0),
        }
    }
    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

/// Normalized allele pair rendered as `a/b`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diplotype {
    first: String,
    second: String,
}

impl Diplotype {
    /// Build a diplotype, putting the pair in display order
    pub fn new(a: &str, b: &str) -> Self {
        let (first, second) = if display_order(a, b) == Ordering::Greater {
            (b, a)
        } else {
            (a, b)
        };
        Self {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    pub fn wild_type() -> Self {
        Self::new(WILD_TYPE, WILD_TYPE)
    }
}

impl fmt::Display for Diplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

/// Diplotype for one gene plus whatever was narrowed away to get there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiplotypeCall {
    pub diplotype: Diplotype,
    /// Non-wild-type alleles that ranked below the retained pair
    pub dropped: Vec<String>,
}

fn check_allele(allele: &str) -> PgxResult<()> {
    if allele.is_empty() || allele.contains('/') || allele.chars().any(char::is_whitespace) {
        return Err(PgxError::InvalidAllele(allele.to_string()));
    }
    Ok(())
}

/// Expand calls by zygosity, drop wild-type and collapse to two alleles
pub fn build_diplotype(gene: &str, variants: &[Variant]) -> PgxResult<DiplotypeCall> {
    let mut detected: Vec<&str> = Vec::new();
    for variant in variants {
        check_allele(&variant.allele)?;
        match Zygosity::from_gt(&variant.gt) {
            Zygosity::Homozygous => detected.extend([variant.allele.as_str(); 2]),
            Zygosity::Heterozygous => detected.push(&variant.allele),
            Zygosity::Other => {}
        }
    }

    detected.retain(|a| *a != WILD_TYPE);

    let call = match detected.len() {
        0 => DiplotypeCall {
            diplotype: Diplotype::wild_type(),
            dropped: Vec::new(),
        },
        1 => DiplotypeCall {
            diplotype: Diplotype::new(WILD_TYPE, detected[0]),
            dropped: Vec::new(),
        },
        _ => {
            let severity = SeverityTable::for_gene(gene);
            // stable: equal scores keep detection order
            detected.sort_by(|a, b| severity.score(b).cmp(&severity.score(a)));
            DiplotypeCall {
                diplotype: Diplotype::new(detected[0], detected[1]),
                dropped: detected[2..].iter().map(|a| a.to_string()).collect(),
            }
        }
    };

    log::debug!("{} diplotype {} from {} allele(s)", gene, call.diplotype, detected.len());
    Ok(call)
}

/// Build one diplotype per gene; a gene that cannot be called keeps its error
pub fn build_diplotypes(
    extracted: &BTreeMap<String, GeneObservations>,
) -> BTreeMap<String, PgxResult<DiplotypeCall>> {
    extracted
        .iter()
        .map(|(gene, observations)| (gene.clone(), build_diplotype(gene, &observations.variants)))
        .collect()
}
