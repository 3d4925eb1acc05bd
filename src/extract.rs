//! Pharmacogenomic variant extraction from validated data lines

use crate::panel::{is_panel_gene, DEFAULT_GENOTYPE, PANEL_GENES, RSID_NOT_AVAILABLE};
use crate::vcf::{
    genotype_from_columns, split_validated_line, InfoField, Zygosity, FORMAT_COL, INFO_COL,
    MIN_COLUMNS, SAMPLE_COL,
};
use crate::Variant;
use std::collections::BTreeMap;

/// Observations collected for one panel gene
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneObservations {
    /// One entry per physical record, in file order
    pub variants: Vec<Variant>,
    /// Star alleles with homozygous calls listed twice
    pub alleles: Vec<String>,
}

/// Group the star-allele observations of every panel gene.
///
/// Every panel gene is present in the result, with empty observations when the
/// file has no record for it. Lines that are comments, too short, outside the
/// panel or without a `STAR=` value are skipped.
pub fn extract_variants<S: AsRef<str>>(lines: &[S]) -> BTreeMap<String, GeneObservations> {
    let mut extracted: BTreeMap<String, GeneObservations> = PANEL_GENES
        .iter()
        .map(|gene| (gene.to_string(), GeneObservations::default()))
        .collect();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let columns = split_validated_line(line);
        if columns.len() < MIN_COLUMNS {
            continue;
        }

        let info = InfoField::parse(columns[INFO_COL]);
        let Some(gene) = info.gene().filter(|g| is_panel_gene(g)) else {
            continue;
        };
        let Some(allele) = info.star_allele() else {
            continue;
        };

        let gt = columns
            .get(FORMAT_COL)
            .zip(columns.get(SAMPLE_COL))
            .and_then(|(format, sample)| genotype_from_columns(format, sample))
            .unwrap_or(DEFAULT_GENOTYPE);

        let rsid = info.rsid().unwrap_or(RSID_NOT_AVAILABLE);

        let observations = extracted.entry(gene.to_string()).or_default();
        observations.alleles.push(allele.to_string());
        if Zygosity::from_gt(gt) == Zygosity::Homozygous {
            observations.alleles.push(allele.to_string());
        }
        observations.variants.push(Variant::new(
            gene.to_string(),
            allele.to_string(),
            rsid.to_string(),
            gt.to_string(),
        ));

        log::debug!("Extracted {} {} ({}) gt={}", gene, allele, rsid, gt);
    }

    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_groups_by_panel_gene() {
        let lines = vec![
            "chr22\t100\trs3892097\tC\tT\t.\tPASS\tGENE=CYP2D6;STAR=*4;RS=rs3892097\tGT\t1/1",
            "chr10\t200\trs4244285\tG\tA\t.\tPASS\tGENE=CYP2C19;STAR=*2;RS=rs4244285\tGT\t0/1",
            "chr1\t300\trs1\tG\tA\t.\tPASS\tGENE=BRCA1;STAR=*9;RS=rs1\tGT\t0/1",
        ];

        let extracted = extract_variants(&lines);
        assert_eq!(extracted.len(), PANEL_GENES.len());
        assert!(!extracted.contains_key("BRCA1"));

        let cyp2d6 = &extracted["CYP2D6"];
        assert_eq!(cyp2d6.variants.len(), 1);
        assert_eq!(cyp2d6.alleles, vec!["*4", "*4"]);
        assert_eq!(cyp2d6.variants[0].gt, "1/1");
        assert_eq!(cyp2d6.variants[0].rsid, "rs3892097");

        let cyp2c19 = &extracted["CYP2C19"];
        assert_eq!(cyp2c19.alleles, vec!["*2"]);

        assert!(extracted["TPMT"].variants.is_empty());
    }

    #[test]
    fn test_extract_defaults() {
        let lines = vec![
            "chr1\t100\tid1\tA\tG\t.\tPASS\tGENE=TPMT;STAR=*3A",
            "chr1\t101\tid2\tA\tG\t.\tPASS\tGENE=TPMT;STAR=*2\tDP\t30",
        ];

        let extracted = extract_variants(&lines);
        let tpmt = &extracted["TPMT"];
        assert_eq!(tpmt.variants.len(), 2);
        for variant in &tpmt.variants {
            assert_eq!(variant.rsid, RSID_NOT_AVAILABLE);
            assert_eq!(variant.gt, DEFAULT_GENOTYPE);
        }
    }

    #[test]
    fn test_empty_genotype_defaults_to_heterozygous() {
        let lines = vec!["chr22\t100\trs1\tC\tT\t.\tPASS\tGENE=CYP2D6;STAR=*4;RS=rs1\tGT:DP\t:30"];
        let extracted = extract_variants(&lines);
        let cyp2d6 = &extracted["CYP2D6"];
        assert_eq!(cyp2d6.variants[0].gt, DEFAULT_GENOTYPE);
        assert_eq!(cyp2d6.alleles, vec!["*4"]);

        let calls = crate::diplotype::build_diplotypes(&extracted);
        assert_eq!(calls["CYP2D6"].as_ref().unwrap().diplotype.to_string(), "*1/*4");
    }

    #[test]
    fn test_extract_skips_records_without_star() {
        let lines = vec![
            "chr1\t100\tid1\tA\tG\t.\tPASS\tGENE=DPYD;RS=rs3918290",
            "chr1\t100\tid1\tA\tG\t.\tPASS\tGENE=DPYD;STAR=;RS=rs3918290",
            "# comment",
            "",
            "chr1\t100\tid1\tA\tG",
        ];

        let extracted = extract_variants(&lines);
        assert!(extracted["DPYD"].variants.is_empty());
        assert!(extracted["DPYD"].alleles.is_empty());
    }

    #[test]
    fn test_extract_whitespace_lines() {
        let lines = vec!["chr10 200 rs1 G A . PASS GENE=CYP2C9;STAR=*3;RS=rs1057910 GT:DP 1|1:20"];
        let extracted = extract_variants(&lines);
        assert_eq!(extracted["CYP2C9"].alleles, vec!["*3", "*3"]);
        assert_eq!(extracted["CYP2C9"].variants[0].gt, "1|1");
    }
}
