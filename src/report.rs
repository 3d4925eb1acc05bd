//! Output writers for per-file validation and profiling results

use crate::risk::DrugRisk;
use crate::utils::{ensure_parent_dirs, has_extension};
use crate::validator::{ValidationFailure, ValidationSuccess};
use crate::PgxResult;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Result of processing one input file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    Valid {
        #[serde(flatten)]
        result: ValidationSuccess,
        drug_risks: Vec<DrugRisk>,
    },
    Invalid {
        #[serde(flatten)]
        failure: ValidationFailure,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn valid(file: impl Into<String>, result: ValidationSuccess, drug_risks: Vec<DrugRisk>) -> Self {
        Self {
            file: file.into(),
            outcome: FileOutcome::Valid { result, drug_risks },
        }
    }

    pub fn invalid(file: impl Into<String>, failure: ValidationFailure) -> Self {
        Self {
            file: file.into(),
            outcome: FileOutcome::Invalid { failure },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, FileOutcome::Valid { .. })
    }
}

/// Open `path` for writing, gzip-compressing when it ends in `.gz`
fn write_output<F>(path: &Path, write: F) -> PgxResult<()>
where
    F: FnOnce(&mut dyn Write) -> PgxResult<()>,
{
    ensure_parent_dirs(path)?;
    let file = BufWriter::new(File::create(path)?);

    if has_extension(path, "gz") {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write(&mut encoder)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = file;
        write(&mut writer)?;
        writer.flush()?;
    }
    Ok(())
}

fn join_or_dot<'a, I: Iterator<Item = &'a str>>(items: I) -> String {
    let joined: Vec<&str> = items.collect();
    if joined.is_empty() {
        ".".to_string()
    } else {
        joined.join(",")
    }
}

/// One row per profiled gene of every valid file
pub fn write_profile_table<W: Write + ?Sized>(reports: &[FileReport], writer: &mut W) -> PgxResult<()> {
    writeln!(writer, "File\tGene\tDiplotype\tPhenotype\tAlleles\tRsids")?;

    for report in reports {
        let FileOutcome::Valid { result, .. } = &report.outcome else {
            continue;
        };
        for (gene, profile) in &result.genetic_profile {
            let variants = &profile.detected_variants;
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}",
                report.file,
                gene,
                profile.diplotype,
                profile.phenotype,
                join_or_dot(variants.iter().map(|v| v.allele.as_str())),
                join_or_dot(variants.iter().map(|v| v.rsid.as_str())),
            )?;
        }
    }

    Ok(())
}

/// One row per assessed drug of every valid file
pub fn write_risk_table<W: Write + ?Sized>(reports: &[FileReport], writer: &mut W) -> PgxResult<()> {
    writeln!(
        writer,
        "File\tDrug\tGene\tPhenotype\tRisk\tSeverity\tConfidence\tAction\tGuideline"
    )?;

    for report in reports {
        let FileOutcome::Valid { drug_risks, .. } = &report.outcome else {
            continue;
        };
        for risk in drug_risks {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{}\t{}",
                report.file,
                risk.drug,
                risk.primary_gene,
                risk.phenotype,
                risk.risk_label,
                risk.severity,
                risk.confidence_score,
                risk.recommendation.action,
                risk.recommendation.guideline,
            )?;
        }
    }

    Ok(())
}

pub fn write_profile_results(reports: &[FileReport], output_path: &Path) -> PgxResult<()> {
    write_output(output_path, |writer| write_profile_table(reports, writer))?;
    log::info!("Wrote gene profiles to {:?}", output_path);
    Ok(())
}

pub fn write_risk_results(reports: &[FileReport], output_path: &Path) -> PgxResult<()> {
    write_output(output_path, |writer| write_risk_table(reports, writer))?;
    log::info!("Wrote drug risks to {:?}", output_path);
    Ok(())
}

/// Full per-file results as pretty-printed JSON
pub fn write_json_report(reports: &[FileReport], output_path: &Path) -> PgxResult<()> {
    write_output(output_path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, reports)?;
        writeln!(writer)?;
        Ok(())
    })?;
    log::info!("Wrote JSON report to {:?}", output_path);
    Ok(())
}
