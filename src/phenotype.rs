//! Phenotype lookup tables and their lifecycle

use crate::utils::{has_extension, is_gzipped, validate_file_readable};
use crate::{PgxError, PgxResult};
use flate2::read::MultiGzDecoder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Phenotype reported when no table entry matches
pub const UNKNOWN_PHENOTYPE: &str = "Unknown";

/// One row of the tabular table format
#[derive(Debug, Deserialize)]
struct PhenotypeRow {
    gene: String,
    diplotype: String,
    phenotype: String,
}

/// Immutable gene -> diplotype -> phenotype mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhenotypeTable {
    genes: BTreeMap<String, BTreeMap<String, String>>,
}

impl PhenotypeTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from `(gene, diplotype, phenotype)` triples; later duplicates win
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String>,
    {
        let mut genes: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (gene, diplotype, phenotype) in entries {
            genes
                .entry(gene.into())
                .or_default()
                .insert(diplotype.into(), phenotype.into());
        }
        Self { genes }
    }

    /// Nested JSON object: `{"CYP2D6": {"*1/*4": "IM"}}`
    pub fn from_json_reader<R: Read>(reader: R) -> PgxResult<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Tab-separated rows with a `gene`, `diplotype`, `phenotype` header
    pub fn from_tsv_reader<R: Read>(reader: R) -> PgxResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut rows = Vec::new();
        for result in csv_reader.deserialize::<PhenotypeRow>() {
            let row = result?;
            if row.gene.is_empty() || row.diplotype.is_empty() {
                return Err(PgxError::InvalidTable(format!(
                    "row with empty gene or diplotype (phenotype {:?})",
                    row.phenotype
                )));
            }
            rows.push((row.gene, row.diplotype, row.phenotype));
        }

        Ok(Self::from_entries(rows))
    }

    /// Load a JSON (`.json`, `.json.gz`) or TSV table from disk
    pub fn load<P: AsRef<Path>>(path: P) -> PgxResult<Self> {
        let path = path.as_ref();
        validate_file_readable(path)?;
        let file = File::open(path)?;

        let reader: Box<dyn Read> = if is_gzipped(path)? {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let inner = if has_extension(path, "gz") {
            path.with_extension("")
        } else {
            path.to_path_buf()
        };

        let table = if has_extension(&inner, "json") {
            Self::from_json_reader(reader)?
        } else {
            Self::from_tsv_reader(reader)?
        };

        log::info!(
            "Loaded phenotype table from {:?}: {} genes, {} diplotypes",
            path,
            table.gene_count(),
            table.len()
        );
        Ok(table)
    }

    /// Like [`PhenotypeTable::load`], but a missing file yields an empty table
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> PgxResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!(
                "Phenotype table {:?} not found; every phenotype will resolve to {}",
                path,
                UNKNOWN_PHENOTYPE
            );
            return Ok(Self::empty());
        }
        Self::load(path)
    }

    pub fn gene_count(&self) -> usize {
        self.genes.len()
    }

    /// Total number of diplotype entries across all genes
    pub fn len(&self) -> usize {
        self.genes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Phenotype for `diplotype`, trying the allele pair in both orders
    pub fn resolve(&self, gene: &str, diplotype: &str) -> &str {
        let Some(entries) = self.genes.get(gene) else {
            return UNKNOWN_PHENOTYPE;
        };

        if let Some(phenotype) = entries.get(diplotype) {
            return phenotype;
        }

        let parts: Vec<&str> = diplotype.split('/').collect();
        if let [first, second] = parts.as_slice() {
            if let Some(phenotype) = entries.get(&format!("{}/{}", second, first)) {
                return phenotype;
            }
        }

        UNKNOWN_PHENOTYPE
    }
}

/// Owns the current phenotype table and swaps it on explicit reloads.
///
/// Validation runs take a [`snapshot`](PhenotypeRegistry::snapshot) when they
/// start and keep it for their whole lifetime.
pub struct PhenotypeRegistry {
    source: Option<PathBuf>,
    current: RwLock<Arc<PhenotypeTable>>,
}

impl PhenotypeRegistry {
    pub fn new(table: PhenotypeTable) -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Load the table at process start; a missing file gives an empty table
    pub fn from_path<P: AsRef<Path>>(path: P) -> PgxResult<Self> {
        let path = path.as_ref().to_path_buf();
        let table = PhenotypeTable::load_or_empty(&path)?;
        Ok(Self {
            source: Some(path),
            current: RwLock::new(Arc::new(table)),
        })
    }

    pub fn snapshot(&self) -> Arc<PhenotypeTable> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current table, returning the previous one
    pub fn replace(&self, table: PhenotypeTable) -> Arc<PhenotypeTable> {
        std::mem::replace(&mut *self.current.write(), Arc::new(table))
    }

    /// Re-read the source file. On error the current table stays in place.
    pub fn reload(&self) -> PgxResult<usize> {
        let path = self.source.as_ref().ok_or_else(|| {
            PgxError::InvalidTable("registry was not created from a file".to_string())
        })?;
        let table = PhenotypeTable::load_or_empty(path)?;
        let entries = table.len();
        self.replace(table);
        log::info!("Reloaded phenotype table from {:?} ({} entries)", path, entries);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_table() -> PhenotypeTable {
        PhenotypeTable::from_entries(vec![
            ("CYP2D6", "*1/*1", "NM"),
            ("CYP2D6", "*4/*4", "PM"),
            ("CYP2C19", "*17/*1", "RM"),
        ])
    }

    #[test]
    fn test_resolve_exact_and_reversed() {
        let table = sample_table();
        assert_eq!(table.resolve("CYP2D6", "*4/*4"), "PM");
        assert_eq!(table.resolve("CYP2D6", "*1/*1"), "NM");
        // only the reversed orientation is in the table
        assert_eq!(table.resolve("CYP2C19", "*1/*17"), "RM");
    }

    #[test]
    fn test_resolve_unknown() {
        let table = sample_table();
        assert_eq!(table.resolve("CYP2D6", "*1/*4"), UNKNOWN_PHENOTYPE);
        assert_eq!(table.resolve("TPMT", "*1/*1"), UNKNOWN_PHENOTYPE);
        assert_eq!(table.resolve("CYP2D6", "*4"), UNKNOWN_PHENOTYPE);
        assert_eq!(PhenotypeTable::empty().resolve("CYP2D6", "*1/*1"), UNKNOWN_PHENOTYPE);
    }

    #[test]
    fn test_load_json() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, r#"{{"CYP2D6": {{"*1/*4": "IM", "*4/*4": "PM"}}, "TPMT": {{"*1/*1": "NM"}}}}"#).unwrap();

        let table = PhenotypeTable::load(temp_file.path()).unwrap();
        assert_eq!(table.gene_count(), 2);
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve("CYP2D6", "*4/*1"), "IM");
    }

    #[test]
    fn test_load_tsv() {
        let mut temp_file = NamedTempFile::with_suffix(".tsv").unwrap();
        writeln!(temp_file, "gene\tdiplotype\tphenotype").unwrap();
        writeln!(temp_file, "# comment rows are skipped").unwrap();
        writeln!(temp_file, "CYP2C9\t*1/*3\tIM").unwrap();
        writeln!(temp_file, "CYP2C9\t*3/*3\tPM").unwrap();

        let table = PhenotypeTable::load(temp_file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("CYP2C9", "*3/*3"), "PM");
    }

    #[test]
    fn test_load_gzipped_json() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let temp_file = NamedTempFile::with_suffix(".json.gz").unwrap();
        let mut encoder = GzEncoder::new(temp_file.reopen().unwrap(), Compression::default());
        encoder.write_all(br#"{"DPYD": {"*1/*2A": "IM"}}"#).unwrap();
        encoder.finish().unwrap();

        let table = PhenotypeTable::load(temp_file.path()).unwrap();
        assert_eq!(table.resolve("DPYD", "*1/*2A"), "IM");
    }

    #[test]
    fn test_bundled_table() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/gene_phenotypes.json");
        let table = PhenotypeTable::load(path).unwrap();
        assert_eq!(table.gene_count(), 6);
        assert_eq!(table.resolve("CYP2D6", "*4/*4"), "PM");
        assert_eq!(table.resolve("CYP2C19", "*1/*17"), "RM");
        assert_eq!(table.resolve("DPYD", "*13/*2A"), "PM");
    }

    #[test]
    fn test_missing_table_is_empty() {
        let table = PhenotypeTable::load_or_empty("/nonexistent/gene_phenotypes.json").unwrap();
        assert!(table.is_empty());
        assert!(PhenotypeTable::load("/nonexistent/gene_phenotypes.json").is_err());
    }

    #[test]
    fn test_malformed_table_is_an_error() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "[1, 2, 3]").unwrap();
        assert!(PhenotypeTable::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_registry_reload() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, r#"{{"CYP2D6": {{"*4/*4": "PM"}}}}"#).unwrap();
        temp_file.flush().unwrap();

        let registry = PhenotypeRegistry::from_path(temp_file.path()).unwrap();
        let before = registry.snapshot();
        assert_eq!(before.resolve("CYP2D6", "*4/*4"), "PM");

        std::fs::write(temp_file.path(), r#"{"CYP2D6": {"*4/*4": "IM", "*1/*1": "NM"}}"#).unwrap();
        assert_eq!(registry.reload().unwrap(), 2);

        // earlier snapshots are unaffected by the reload
        assert_eq!(before.resolve("CYP2D6", "*4/*4"), "PM");
        assert_eq!(registry.snapshot().resolve("CYP2D6", "*4/*4"), "IM");
    }

    #[test]
    fn test_registry_without_source_cannot_reload() {
        let registry = PhenotypeRegistry::new(sample_table());
        assert!(registry.reload().is_err());
        let previous = registry.replace(PhenotypeTable::empty());
        assert_eq!(previous.len(), 3);
        assert!(registry.snapshot().is_empty());
    }
}
