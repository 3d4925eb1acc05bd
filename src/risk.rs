//! Drug risk assessment from resolved gene phenotypes

use crate::phenotype::UNKNOWN_PHENOTYPE;
use crate::GeneProfile;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const RULE_CONFIDENCE: f64 = 0.98;
const PARTIAL_CONFIDENCE: f64 = 0.7;
const UNKNOWN_CONFIDENCE: f64 = 0.3;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const ADJUST_DOSAGE: &str = "Adjust Dosage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Gene whose phenotype governs the response to `drug` (upper-case name)
pub fn primary_gene(drug: &str) -> Option<&'static str> {
    match drug {
        "CODEINE" => Some("CYP2D6"),
        "WARFARIN" => Some("CYP2C9"),
        "CLOPIDOGREL" => Some("CYP2C19"),
        "SIMVASTATIN" => Some("SLCO1B1"),
        "AZATHIOPRINE" => Some("TPMT"),
        "FLUOROURACIL" => Some("DPYD"),
        _ => None,
    }
}

/// Fold long-form metabolizer names onto their short codes
pub fn normalize_phenotype(phenotype: &str) -> String {
    let upper = phenotype.trim().to_uppercase();
    let code = match upper.as_str() {
        "" | "UNKNOWN" => return UNKNOWN_PHENOTYPE.to_string(),
        "POOR METABOLIZER" => "PM",
        "INTERMEDIATE METABOLIZER" => "IM",
        "NORMAL METABOLIZER" => "NM",
        "RAPID METABOLIZER" => "RM",
        "ULTRA RAPID METABOLIZER" => "UM",
        _ => return upper,
    };
    code.to_string()
}

fn rule(drug: &str, phenotype: &str) -> Option<(&'static str, Severity)> {
    use Severity::*;

    let hit = match (drug, phenotype) {
        ("CODEINE", "PM") => ("Ineffective", Moderate),
        ("CODEINE", "IM") => (ADJUST_DOSAGE, Moderate),
        ("CODEINE", "NM") => ("Safe", None),
        ("CODEINE", "UM") => ("Toxic", High),

        ("CLOPIDOGREL", "PM") => ("Ineffective", High),
        ("CLOPIDOGREL", "IM") => (ADJUST_DOSAGE, Moderate),
        ("CLOPIDOGREL", "NM" | "RM" | "UM") => ("Safe", None),

        ("WARFARIN" | "SIMVASTATIN", "PM") => ("Toxic", High),
        ("WARFARIN" | "SIMVASTATIN", "IM") => (ADJUST_DOSAGE, Moderate),
        ("WARFARIN" | "SIMVASTATIN", "NM") => ("Safe", None),

        ("AZATHIOPRINE" | "FLUOROURACIL", "PM") => ("Toxic", Critical),
        ("AZATHIOPRINE" | "FLUOROURACIL", "IM") => (ADJUST_DOSAGE, High),
        ("AZATHIOPRINE" | "FLUOROURACIL", "NM") => ("Safe", None),

        _ => return Option::None,
    };
    Some(hit)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub action: &'static str,
    pub guideline: &'static str,
}

impl Recommendation {
    fn for_risk(label: &str, severity: Severity) -> Self {
        if severity >= Severity::High {
            Self {
                action: "Consider Alternative Therapy",
                guideline: "CPIC Level A",
            }
        } else if label == ADJUST_DOSAGE {
            Self {
                action: ADJUST_DOSAGE,
                guideline: "CPIC Level A",
            }
        } else {
            Self {
                action: "Proceed with Standard Protocol",
                guideline: "CPIC Level B",
            }
        }
    }
}

/// Risk assessment for one requested drug
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrugRisk {
    pub drug: String,
    pub primary_gene: String,
    pub diplotype: Option<String>,
    pub phenotype: String,
    pub risk_label: String,
    pub severity: Severity,
    pub confidence_score: f64,
    pub recommendation: Recommendation,
}

/// Split a comma-separated drug list into trimmed upper-case names
pub fn parse_drug_list(drugs: &str) -> Vec<String> {
    drugs
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_uppercase)
        .collect()
}

pub fn assess_drug(drug: &str, profiles: &BTreeMap<String, GeneProfile>) -> DrugRisk {
    let drug = drug.trim().to_uppercase();
    let gene = primary_gene(&drug);
    let profile = gene.and_then(|g| profiles.get(g));

    let phenotype = match (gene, profile) {
        (Some(_), Some(profile)) => normalize_phenotype(&profile.phenotype),
        _ => UNKNOWN_PHENOTYPE.to_string(),
    };

    let (label, severity, confidence) = match gene {
        Some(_) => match rule(&drug, &phenotype) {
            Some((label, severity)) => (label, severity, RULE_CONFIDENCE),
            None if phenotype != UNKNOWN_PHENOTYPE => {
                (ADJUST_DOSAGE, Severity::Low, PARTIAL_CONFIDENCE)
            }
            None => (UNKNOWN_LABEL, Severity::None, UNKNOWN_CONFIDENCE),
        },
        None => {
            log::warn!("No pharmacogene mapping for drug {}", drug);
            (UNKNOWN_LABEL, Severity::None, UNKNOWN_CONFIDENCE)
        }
    };

    DrugRisk {
        primary_gene: gene.unwrap_or(UNKNOWN_LABEL).to_string(),
        diplotype: profile.map(|p| p.diplotype.clone()),
        phenotype,
        risk_label: label.to_string(),
        severity,
        confidence_score: confidence,
        recommendation: Recommendation::for_risk(label, severity),
        drug,
    }
}

/// Assess every drug in a comma-separated list, in list order
pub fn assess_drugs(drugs: &str, profiles: &BTreeMap<String, GeneProfile>) -> Vec<DrugRisk> {
    parse_drug_list(drugs)
        .iter()
        .map(|drug| assess_drug(drug, profiles))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles(entries: &[(&str, &str, &str)]) -> BTreeMap<String, GeneProfile> {
        entries
            .iter()
            .map(|(gene, diplotype, phenotype)| {
                (
                    gene.to_string(),
                    GeneProfile {
                        diplotype: diplotype.to_string(),
                        phenotype: phenotype.to_string(),
                        detected_variants: Vec::new(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_drug_list() {
        assert_eq!(
            parse_drug_list(" codeine, ,Warfarin,,clopidogrel "),
            vec!["CODEINE", "WARFARIN", "CLOPIDOGREL"]
        );
        assert!(parse_drug_list(" , ").is_empty());
    }

    #[test]
    fn test_normalize_phenotype() {
        assert_eq!(normalize_phenotype("Poor Metabolizer"), "PM");
        assert_eq!(normalize_phenotype("ultra rapid metabolizer"), "UM");
        assert_eq!(normalize_phenotype("im"), "IM");
        assert_eq!(normalize_phenotype(""), UNKNOWN_PHENOTYPE);
        assert_eq!(normalize_phenotype("Unknown"), UNKNOWN_PHENOTYPE);
        assert_eq!(normalize_phenotype("unknown"), UNKNOWN_PHENOTYPE);
    }

    #[test]
    fn test_rule_hit() {
        let profiles = profiles(&[("CYP2D6", "*4/*4", "PM"), ("DPYD", "*2A/*2A", "PM")]);

        let codeine = assess_drug("codeine", &profiles);
        assert_eq!(codeine.primary_gene, "CYP2D6");
        assert_eq!(codeine.diplotype.as_deref(), Some("*4/*4"));
        assert_eq!(codeine.risk_label, "Ineffective");
        assert_eq!(codeine.severity, Severity::Moderate);
        assert_eq!(codeine.confidence_score, RULE_CONFIDENCE);
        assert_eq!(codeine.recommendation.action, "Proceed with Standard Protocol");

        let fluorouracil = assess_drug("FLUOROURACIL", &profiles);
        assert_eq!(fluorouracil.risk_label, "Toxic");
        assert_eq!(fluorouracil.severity, Severity::Critical);
        assert_eq!(fluorouracil.recommendation.action, "Consider Alternative Therapy");
        assert_eq!(fluorouracil.recommendation.guideline, "CPIC Level A");
    }

    #[test]
    fn test_known_phenotype_without_rule() {
        let profiles = profiles(&[("CYP2C9", "*1/*17", "RM")]);
        let warfarin = assess_drug("warfarin", &profiles);
        assert_eq!(warfarin.risk_label, ADJUST_DOSAGE);
        assert_eq!(warfarin.severity, Severity::Low);
        assert_eq!(warfarin.confidence_score, PARTIAL_CONFIDENCE);
        assert_eq!(warfarin.recommendation.action, ADJUST_DOSAGE);
    }

    #[test]
    fn test_unknown_phenotype_and_unmapped_drug() {
        let profiles = profiles(&[("CYP2C19", "*1/*1", UNKNOWN_PHENOTYPE)]);

        let clopidogrel = assess_drug("clopidogrel", &profiles);
        assert_eq!(clopidogrel.risk_label, UNKNOWN_LABEL);
        assert_eq!(clopidogrel.severity, Severity::None);
        assert_eq!(clopidogrel.confidence_score, UNKNOWN_CONFIDENCE);

        let aspirin = assess_drug("aspirin", &profiles);
        assert_eq!(aspirin.primary_gene, UNKNOWN_LABEL);
        assert_eq!(aspirin.phenotype, UNKNOWN_PHENOTYPE);
        assert!(aspirin.diplotype.is_none());
        assert_eq!(aspirin.recommendation.guideline, "CPIC Level B");

        // gene omitted from the profile, e.g. after a profiling failure
        let azathioprine = assess_drug("azathioprine", &profiles);
        assert_eq!(azathioprine.primary_gene, "TPMT");
        assert_eq!(azathioprine.phenotype, UNKNOWN_PHENOTYPE);
    }

    #[test]
    fn test_assess_drugs_keeps_order_and_serializes() {
        let profiles = profiles(&[("TPMT", "*1/*3A", "IM")]);
        let risks = assess_drugs("azathioprine, codeine", &profiles);
        assert_eq!(risks.len(), 2);
        assert_eq!(risks[0].drug, "AZATHIOPRINE");
        assert_eq!(risks[0].severity, Severity::High);

        let json = serde_json::to_value(&risks[0]).unwrap();
        assert_eq!(json["severity"], "high");
        assert_eq!(json["recommendation"]["action"], "Consider Alternative Therapy");
    }
}
