//! Gene panel and the fixed literals the pipeline keys off

/// Genes whose pharmacogenomic variants are tracked
pub const PANEL_GENES: [&str; 6] = ["CYP2D6", "CYP2C19", "CYP2C9", "SLCO1B1", "TPMT", "DPYD"];

/// Annotation tags that must each appear somewhere in the file
pub const GENE_TAG: &str = "GENE";
pub const RS_TAG: &str = "RS";
pub const STAR_TAG: &str = "STAR";
pub const REQUIRED_TAGS: [&str; 3] = [GENE_TAG, RS_TAG, STAR_TAG];

/// Implicit reference allele
pub const WILD_TYPE: &str = "*1";

/// VCF missing-value marker
pub const MISSING_VALUE: &str = ".";

/// rsid placeholder when a record carries no `RS=` token
pub const RSID_NOT_AVAILABLE: &str = "N/A";

/// Genotype assumed when a record has no usable GT sub-field
pub const DEFAULT_GENOTYPE: &str = "0/1";

pub fn is_panel_gene(gene: &str) -> bool {
    PANEL_GENES.contains(&gene)
}
