//! Per-gene profile assembly: extraction -> diplotype -> phenotype

use crate::diplotype::{build_diplotypes, Diplotype, DiplotypeCall};
use crate::extract::{extract_variants, GeneObservations};
use crate::panel::PANEL_GENES;
use crate::phenotype::PhenotypeTable;
use crate::{DetectedVariant, GeneProfile, NarrowingPolicy, ProfileConfig};
use anyhow::Context;
use std::collections::BTreeMap;

/// Profiles for the panel genes plus any non-fatal problems met on the way
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOutcome {
    pub profiles: BTreeMap<String, GeneProfile>,
    pub warnings: Vec<String>,
}

fn profile_gene(
    gene: &str,
    observations: Option<&GeneObservations>,
    call: Option<crate::PgxResult<DiplotypeCall>>,
    phenotypes: &PhenotypeTable,
) -> anyhow::Result<(GeneProfile, Vec<String>)> {
    let call = match call {
        Some(result) => result.context("cannot build diplotype")?,
        None => DiplotypeCall {
            diplotype: Diplotype::wild_type(),
            dropped: Vec::new(),
        },
    };

    let diplotype = call.diplotype.to_string();
    let phenotype = phenotypes.resolve(gene, &diplotype).to_string();
    let detected_variants = observations
        .map(|o| o.variants.iter().map(DetectedVariant::from).collect())
        .unwrap_or_default();

    Ok((
        GeneProfile {
            diplotype,
            phenotype,
            detected_variants,
        },
        call.dropped,
    ))
}

/// Derive a profile for every panel gene from validated data lines.
///
/// A gene whose diplotype cannot be built is left out and reported in
/// `warnings`; the other genes are unaffected.
pub fn build_profiles<S: AsRef<str>>(
    lines: &[S],
    phenotypes: &PhenotypeTable,
    config: &ProfileConfig,
) -> ProfileOutcome {
    let extracted = extract_variants(lines);
    let mut calls = build_diplotypes(&extracted);
    let mut outcome = ProfileOutcome::default();

    for gene in PANEL_GENES {
        match profile_gene(gene, extracted.get(gene), calls.remove(gene), phenotypes) {
            Ok((profile, dropped)) => {
                if !dropped.is_empty() {
                    log::debug!("{}: discarded {:?} below {}", gene, dropped, profile.diplotype);
                    if config.narrowing == NarrowingPolicy::Warn {
                        outcome.warnings.push(format!(
                            "{}: kept {}, discarded lower-severity allele(s) {}",
                            gene,
                            profile.diplotype,
                            dropped.join(", ")
                        ));
                    }
                }
                outcome.profiles.insert(gene.to_string(), profile);
            }
            Err(e) => {
                log::warn!("Profiling failed for {}: {:#}", gene, e);
                outcome
                    .warnings
                    .push(format!("Genetic profiling failed for {}: {:#}", gene, e));
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phenotype::UNKNOWN_PHENOTYPE;

    fn table() -> PhenotypeTable {
        PhenotypeTable::from_entries(vec![
            ("CYP2D6", "*1/*1", "NM"),
            ("CYP2D6", "*4/*4", "PM"),
            ("CYP2C19", "*1/*17", "RM"),
            ("CYP2C9", "*2/*4", "PM"),
        ])
    }

    #[test]
    fn test_profiles_cover_the_panel() {
        let lines = vec!["chr22\t1\trs3892097\tC\tT\t.\tPASS\tGENE=CYP2D6;STAR=*4;RS=rs3892097\tGT\t1/1"];
        let outcome = build_profiles(&lines, &table(), &ProfileConfig::default());

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.profiles.len(), PANEL_GENES.len());

        let cyp2d6 = &outcome.profiles["CYP2D6"];
        assert_eq!(cyp2d6.diplotype, "*4/*4");
        assert_eq!(cyp2d6.phenotype, "PM");
        assert_eq!(
            cyp2d6.detected_variants,
            vec![DetectedVariant {
                allele: "*4".to_string(),
                rsid: "rs3892097".to_string()
            }]
        );

        let tpmt = &outcome.profiles["TPMT"];
        assert_eq!(tpmt.diplotype, "*1/*1");
        assert_eq!(tpmt.phenotype, UNKNOWN_PHENOTYPE);
        assert!(tpmt.detected_variants.is_empty());
    }

    #[test]
    fn test_failed_gene_is_omitted_with_warning() {
        let lines = vec![
            "chr1\t1\tid1\tA\tG\t.\tPASS\tGENE=TPMT;STAR=*3A/*3C;RS=rs1\tGT\t0/1",
            "chr10\t2\tid2\tA\tG\t.\tPASS\tGENE=CYP2C19;STAR=*17;RS=rs12248560\tGT\t0/1",
        ];
        let outcome = build_profiles(&lines, &table(), &ProfileConfig::default());

        assert!(!outcome.profiles.contains_key("TPMT"));
        assert_eq!(outcome.profiles.len(), PANEL_GENES.len() - 1);
        assert_eq!(outcome.profiles["CYP2C19"].phenotype, "RM");
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].starts_with("Genetic profiling failed for TPMT"));
    }

    #[test]
    fn test_narrowing_policy() {
        let lines = vec![
            "c\t1\ti1\tA\tG\t.\tPASS\tGENE=CYP2C9;STAR=*4;RS=rs1\tGT\t0/1",
            "c\t2\ti2\tA\tG\t.\tPASS\tGENE=CYP2C9;STAR=*9;RS=rs2\tGT\t0/1",
            "c\t3\ti3\tA\tG\t.\tPASS\tGENE=CYP2C9;STAR=*2;RS=rs3\tGT\t0/1",
        ];

        let silent = build_profiles(&lines, &table(), &ProfileConfig::default());
        assert!(silent.warnings.is_empty());
        assert_eq!(silent.profiles["CYP2C9"].diplotype, "*2/*4");
        assert_eq!(silent.profiles["CYP2C9"].phenotype, "PM");
        assert_eq!(silent.profiles["CYP2C9"].detected_variants.len(), 3);

        let config = ProfileConfig {
            narrowing: NarrowingPolicy::Warn,
        };
        let warned = build_profiles(&lines, &table(), &config);
        assert_eq!(warned.profiles, silent.profiles);
        assert_eq!(
            warned.warnings,
            vec!["CYP2C9: kept *2/*4, discarded lower-severity allele(s) *9".to_string()]
        );
    }
}
