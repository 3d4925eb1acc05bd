//! CLI binary for pgx-profile - validates VCF uploads and derives pharmacogenomic profiles

use clap::Parser;
use env_logger::Env;
use pgx_profile::{
    phenotype::PhenotypeRegistry,
    report::{write_json_report, write_profile_results, write_risk_results, FileReport},
    risk::assess_drugs,
    utils::{get_num_cpus, Timer},
    validate_config,
    validator::{validate_path, ValidatorOptions, DEFAULT_CHUNK_SIZE},
    NarrowingPolicy, PgxError, PgxResult, ProfileConfig, ValidationConfig,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pgx_profile")]
#[command(about = "pgx-profile - VCF validation and pharmacogenomic profile derivation")]
#[command(long_about = "
pgx-profile validates annotated VCF files in a single streaming pass and derives a
clinical genotype/phenotype record for the pharmacogene panel
(CYP2D6, CYP2C19, CYP2C9, SLCO1B1, TPMT, DPYD).

For every input file the tool:
1. Validates size limits, the ##fileformat version, the #CHROM header and every data record
2. Extracts GENE/STAR/RS annotated observations for the panel genes
3. Builds one diplotype per gene, keeping the two most severe alleles
4. Resolves a metabolizer phenotype from the phenotype table

Space-separated files are accepted and reported with a normalization warning.
With --drugs, a CPIC-style risk assessment is added for each listed drug.
Without --output, --risk-output or --json the JSON report is printed to stdout.
")]
struct Args {
    /// Input VCF files
    #[arg(value_name = "FILE", required = true)]
    inputs: Vec<PathBuf>,

    /// Phenotype table (.json, .json.gz or TSV with gene/diplotype/phenotype columns)
    #[arg(long, value_name = "FILE", default_value = "data/gene_phenotypes.json")]
    phenotype_table: PathBuf,

    /// Comma-separated drug names to assess, e.g. "codeine,warfarin"
    #[arg(long)]
    drugs: Option<String>,

    /// Path to the per-gene profile TSV (gzip-compressed when ending in .gz)
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to the drug risk TSV (requires --drugs)
    #[arg(long, value_name = "FILE", requires = "drugs")]
    risk_output: Option<PathBuf>,

    /// Path to the full JSON report
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Bytes read per chunk while streaming an input
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Number of processes to use for parallel processing
    #[arg(long, default_value_t = get_num_cpus())]
    num_processes: usize,

    /// Report alleles dropped when more than two are found for a gene
    #[arg(long)]
    warn_on_narrowing: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Force overwrite of output files if they exist
    #[arg(short, long)]
    force: bool,
}

impl Args {
    fn output_paths(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.output, &self.risk_output, &self.json]
            .into_iter()
            .flatten()
    }

    fn profile_config(&self) -> ProfileConfig {
        ProfileConfig {
            narrowing: if self.warn_on_narrowing {
                NarrowingPolicy::Warn
            } else {
                NarrowingPolicy::Silent
            },
        }
    }
}

fn check_output_path(path: &Path, force: bool) -> PgxResult<()> {
    if path.exists() && !force {
        return Err(PgxError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Output file {:?} already exists. Use --force to overwrite.", path),
        )));
    }
    Ok(())
}

/// Validate and profile one input, never failing the batch
fn process_file(path: &Path, chunk_size: usize, options: ValidatorOptions, drugs: Option<&str>) -> FileReport {
    let name = path.to_string_lossy().to_string();
    match validate_path(path, chunk_size, options) {
        Ok(result) => {
            let risks = drugs
                .map(|d| assess_drugs(d, &result.genetic_profile))
                .unwrap_or_default();
            FileReport::valid(name, result, risks)
        }
        Err(failure) => {
            log::error!("{}: {}", name, failure.detail.as_deref().unwrap_or(&failure.message));
            FileReport::invalid(name, failure)
        }
    }
}

fn process_files(args: &Args, registry: &PhenotypeRegistry) -> PgxResult<Vec<FileReport>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.num_processes)
        .build()
        .map_err(|e| PgxError::InvalidConfig(format!("cannot start worker pool: {}", e)))?;

    // one table snapshot for the whole batch
    let options = ValidatorOptions {
        validation: ValidationConfig::default(),
        profile: args.profile_config(),
        phenotypes: registry.snapshot(),
    };

    let reports: Vec<FileReport> = pool.install(|| {
        args.inputs
            .par_iter()
            .map(|path| process_file(path, args.chunk_size, options.clone(), args.drugs.as_deref()))
            .collect()
    });
    Ok(reports)
}

fn run() -> PgxResult<bool> {
    let args = Args::parse();

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    log::info!("Starting pgx-profile on {} file(s)", args.inputs.len());
    log::info!("Phenotype table: {:?}", args.phenotype_table);
    log::info!("Number of processes: {}", args.num_processes);

    if args.num_processes == 0 || args.chunk_size == 0 {
        return Err(PgxError::InvalidConfig(
            "--num-processes and --chunk-size must be greater than 0".to_string(),
        ));
    }
    validate_config(&ValidationConfig::default())?;

    for path in args.output_paths() {
        check_output_path(path, args.force)?;
    }

    let registry = PhenotypeRegistry::from_path(&args.phenotype_table)?;

    let reports = {
        let _timer = Timer::new("Validating inputs");
        process_files(&args, &registry)?
    };

    let valid = reports.iter().filter(|r| r.is_valid()).count();
    log::info!("Validation summary: {} valid, {} invalid", valid, reports.len() - valid);

    if let Some(path) = &args.output {
        write_profile_results(&reports, path)?;
    }
    if let Some(path) = &args.risk_output {
        write_risk_results(&reports, path)?;
    }
    if let Some(path) = &args.json {
        write_json_report(&reports, path)?;
    }
    if args.output_paths().next().is_none() {
        let stdout = std::io::stdout();
        serde_json::to_writer_pretty(stdout.lock(), &reports)?;
        println!();
    }

    Ok(valid == reports.len())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: PgxError) -> ! {
    match error {
        PgxError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        PgxError::InvalidTable(msg) => {
            eprintln!("Error: Invalid phenotype table: {}", msg);
            eprintln!("Expected a JSON object of gene -> diplotype -> phenotype, or a TSV with gene/diplotype/phenotype columns.");
        }
        PgxError::Csv(ref e) => {
            eprintln!("Error: Could not parse phenotype table: {}", e);
            eprintln!("Expected a TSV with gene/diplotype/phenotype columns.");
        }
        PgxError::Json(ref e) => {
            eprintln!("Error: JSON error: {}", e);
            eprintln!("Please check that the phenotype table is valid JSON.");
        }
        PgxError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
        }
        PgxError::InvalidAllele(msg) => {
            eprintln!("Error: Invalid allele designator: {}", msg);
        }
        PgxError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
    }
    std::process::exit(1);
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => handle_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgx_profile::phenotype::PhenotypeTable;
    use pgx_profile::validator::FailureKind;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_vcf(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "##fileformat=VCFv4.2").unwrap();
        for i in 0..10 {
            writeln!(file, "##source=pgx-profile-test-fixture-{:0>90}", i).unwrap();
        }
        writeln!(file, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE").unwrap();
        write!(file, "{}", body).unwrap();
        path
    }

    fn args(inputs: Vec<PathBuf>) -> Args {
        Args::parse_from(
            std::iter::once("pgx_profile".into())
                .chain(inputs.into_iter().map(|p| p.into_os_string()))
                .chain(["--num-processes".into(), "2".into(), "--drugs".into(), "codeine".into()]),
        )
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from([
            "pgx_profile",
            "a.vcf",
            "b.vcf",
            "--warn-on-narrowing",
            "--output",
            "out.tsv.gz",
        ]);
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(args.phenotype_table, PathBuf::from("data/gene_phenotypes.json"));
        assert_eq!(args.profile_config().narrowing, NarrowingPolicy::Warn);
        assert_eq!(args.output_paths().count(), 1);

        assert!(Args::try_parse_from(["pgx_profile", "a.vcf", "--risk-output", "r.tsv"]).is_err());
        assert!(Args::try_parse_from(["pgx_profile"]).is_err());
    }

    #[test]
    fn test_check_output_path() {
        let existing = NamedTempFile::new().unwrap();
        assert!(check_output_path(existing.path(), false).is_err());
        assert!(check_output_path(existing.path(), true).is_ok());
        assert!(check_output_path(Path::new("/nonexistent/out.tsv"), false).is_ok());
    }

    #[test]
    fn test_process_files_in_input_order() {
        let dir = TempDir::new().unwrap();
        let good = write_vcf(
            &dir,
            "good.vcf",
            "chr22\t42126611\trs3892097\tC\tT\t.\tPASS\tGENE=CYP2D6;STAR=*4;RS=rs3892097\tGT\t1/1\n",
        );
        let bad = write_vcf(&dir, "bad.vcf", "chr1\t.\trs1\tA\tG\t.\tPASS\tGENE=CYP2D6\n");
        let wrong_ext = dir.path().join("notes.txt");
        std::fs::write(&wrong_ext, "hello").unwrap();

        let registry = PhenotypeRegistry::new(PhenotypeTable::from_entries(vec![("CYP2D6", "*4/*4", "PM")]));
        let reports = process_files(&args(vec![good, bad, wrong_ext]), &registry).unwrap();

        assert_eq!(reports.len(), 3);
        assert!(reports[0].file.ends_with("good.vcf"));
        match &reports[0].outcome {
            pgx_profile::report::FileOutcome::Valid { result, drug_risks } => {
                assert_eq!(result.genetic_profile["CYP2D6"].phenotype, "PM");
                assert_eq!(drug_risks[0].risk_label, "Ineffective");
            }
            other => panic!("expected a valid report, got {:?}", other),
        }

        for (report, kind) in reports[1..]
            .iter()
            .zip([FailureKind::ValidationError, FailureKind::InvalidExtension])
        {
            match &report.outcome {
                pgx_profile::report::FileOutcome::Invalid { failure } => {
                    assert_eq!(failure.error_type, kind)
                }
                other => panic!("expected an invalid report, got {:?}", other),
            }
        }
    }
}
