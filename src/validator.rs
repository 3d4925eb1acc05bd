//! Single-pass streaming validation of uploaded VCF data
//!
//! The validator is fed byte chunks of any size. It reconstructs lines across
//! chunk boundaries, checks each line as soon as it is complete and stops at
//! the first fatal problem. File-wide properties (minimum size, record counts,
//! annotation tags) are checked once the stream has been consumed.

use crate::panel::{is_panel_gene, GENE_TAG, REQUIRED_TAGS, RS_TAG, STAR_TAG};
use crate::phenotype::PhenotypeTable;
use crate::profile::build_profiles;
use crate::utils::{format_file_size, has_name_suffix};
use crate::vcf::{DataRecord, Delimiter, RecordError, MIN_COLUMNS};
use crate::{GeneProfile, ProfileConfig, ValidationConfig};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

pub const NORMALIZATION_WARNING: &str =
    "File normalized: space-separated VCF converted to tab-separated format";

const INVALID_HEADER_MESSAGE: &str = "Invalid VCF header: missing required fields";

/// Default read size used when pulling from a reader
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Classification of a failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    InvalidExtension,
    FileTooLarge,
    FileTooSmall,
    ValidationError,
    InsufficientData,
    NoPharmacogenes,
    MissingAnnotations,
    InvalidHeader,
    ProcessingError,
}

impl FailureKind {
    /// HTTP status a transport layer should answer with
    pub fn status_code(self) -> u16 {
        match self {
            FailureKind::FileTooLarge => 413,
            _ => 400,
        }
    }
}

/// A failed validation run.
///
/// `message` is safe to show to the uploader; `detail` keeps the line number
/// and other diagnostics for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ValidationFailure {
    pub error_type: FailureKind,
    pub message: String,
    #[serde(skip)]
    pub detail: Option<String>,
    pub status_code: u16,
}

impl ValidationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            error_type: kind,
            message: message.into(),
            detail: None,
            status_code: kind.status_code(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn processing(detail: impl Into<String>) -> Self {
        Self::new(
            FailureKind::ProcessingError,
            "An unexpected error occurred processing the file",
        )
        .with_detail(detail)
    }

    fn invalid_header(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidHeader, INVALID_HEADER_MESSAGE).with_detail(detail)
    }
}

impl From<RecordError> for ValidationFailure {
    fn from(error: RecordError) -> Self {
        Self::new(FailureKind::ValidationError, error.summary()).with_detail(error.to_string())
    }
}

/// A successful validation run with the derived gene profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSuccess {
    pub vcf_version: String,
    pub total_variants: usize,
    pub pharmacogene_variants: usize,
    pub genes_detected: Vec<String>,
    pub warnings: Vec<String>,
    pub genetic_profile: BTreeMap<String, GeneProfile>,
    #[serde(skip)]
    pub valid_lines: Vec<String>,
}

/// Everything a validation run needs besides the bytes themselves
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    pub validation: ValidationConfig,
    pub profile: ProfileConfig,
    pub phenotypes: Arc<PhenotypeTable>,
}

impl ValidatorOptions {
    pub fn with_phenotypes(phenotypes: Arc<PhenotypeTable>) -> Self {
        Self {
            phenotypes,
            ..Self::default()
        }
    }
}

/// Accumulated facts about the lines seen so far in one run
#[derive(Debug, Default)]
struct ValidationState {
    vcf_version: Option<String>,
    has_chrom_header: bool,
    total_variants: usize,
    pharmacogene_variants: usize,
    genes_detected: BTreeSet<String>,
    seen_gene_tag: bool,
    seen_rs_tag: bool,
    seen_star_tag: bool,
    warnings: Vec<String>,
    delimiter: Delimiter,
    valid_lines: Vec<String>,
    line_number: usize,
}

impl ValidationState {
    fn normalize_to_whitespace(&mut self) {
        if self.delimiter != Delimiter::Whitespace {
            log::debug!("Line {}: switching to whitespace-delimited columns", self.line_number);
            self.delimiter = Delimiter::Whitespace;
        }
        if !self.warnings.iter().any(|w| w == NORMALIZATION_WARNING) {
            self.warnings.push(NORMALIZATION_WARNING.to_string());
        }
    }

    fn process_line(&mut self, raw: &str, config: &ValidationConfig) -> Result<(), ValidationFailure> {
        self.line_number += 1;
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        if line.starts_with("##") {
            if let Some(value) = line.strip_prefix("##fileformat=") {
                let version = value.split('=').next().unwrap_or_default().trim();
                self.vcf_version = Some(version.to_string());
                if version != config.supported_version {
                    return Err(ValidationFailure::invalid_header(format!(
                        "Version mismatch: expected {}, found {}",
                        config.supported_version, version
                    )));
                }
            }
            return Ok(());
        }

        if line.starts_with('#') {
            if line.starts_with("#CHROM") {
                self.process_header(line)?;
            }
            return Ok(());
        }

        if !self.has_chrom_header {
            return Err(ValidationFailure::invalid_header(format!(
                "Missing #CHROM header before line {}",
                self.line_number
            )));
        }

        self.process_record(line)
    }

    fn process_header(&mut self, line: &str) -> Result<(), ValidationFailure> {
        let columns = if line.starts_with("#CHROM\t") {
            Delimiter::Tab.split(line)
        } else {
            let parts = Delimiter::Whitespace.split(line);
            if parts.len() < MIN_COLUMNS || parts[0] != "#CHROM" {
                return Err(ValidationFailure::invalid_header(
                    "Missing required fields or invalid separator in #CHROM line",
                ));
            }
            self.normalize_to_whitespace();
            parts
        };

        if columns.len() < MIN_COLUMNS {
            return Err(ValidationFailure::invalid_header(format!(
                "#CHROM line has {} columns, at least {} required",
                columns.len(),
                MIN_COLUMNS
            )));
        }

        self.has_chrom_header = true;
        log::debug!("Line {}: #CHROM header with {} columns", self.line_number, columns.len());
        Ok(())
    }

    fn process_record(&mut self, line: &str) -> Result<(), ValidationFailure> {
        let mut columns = self.delimiter.split(line);
        if columns.len() < MIN_COLUMNS && self.delimiter == Delimiter::Tab {
            let parts = Delimiter::Whitespace.split(line);
            if parts.len() >= MIN_COLUMNS {
                self.normalize_to_whitespace();
                columns = parts;
            }
        }

        let record = DataRecord::from_columns(&columns, self.line_number)?;

        self.seen_gene_tag |= record.info.has_key(GENE_TAG);
        self.seen_rs_tag |= record.info.has_key(RS_TAG);
        self.seen_star_tag |= record.info.has_key(STAR_TAG);

        if let Some(gene) = record.info.gene() {
            self.genes_detected.insert(gene.to_string());
            if is_panel_gene(gene) {
                self.pharmacogene_variants += 1;
            }
        }

        self.total_variants += 1;
        // stored tab-joined so extraction sees the same columns
        self.valid_lines.push(columns.join("\t"));
        Ok(())
    }

    fn missing_tags(&self) -> Vec<&'static str> {
        REQUIRED_TAGS
            .into_iter()
            .zip([self.seen_gene_tag, self.seen_rs_tag, self.seen_star_tag])
            .filter(|(_, seen)| !seen)
            .map(|(tag, _)| tag)
            .collect()
    }
}

/// Validates one upload as its bytes arrive.
///
/// Feed chunks with [`push_chunk`](StreamValidator::push_chunk) and call
/// [`finish`](StreamValidator::finish) at end of stream. Once a chunk has been
/// rejected the validator is halted: later chunks are neither counted nor
/// decoded and `finish` returns the same failure.
#[derive(Debug)]
pub struct StreamValidator {
    file_name: String,
    options: ValidatorOptions,
    state: ValidationState,
    bytes_read: u64,
    /// Tail of the last chunk that ends inside a multi-byte character
    pending_bytes: Vec<u8>,
    line_buffer: String,
    halted: Option<ValidationFailure>,
}

impl StreamValidator {
    pub fn new(file_name: impl Into<String>, options: ValidatorOptions) -> Self {
        let file_name = file_name.into();
        let halted = if has_name_suffix(&file_name, &options.validation.extension) {
            None
        } else {
            log::warn!("Rejecting {:?}: not a .{} file", file_name, options.validation.extension);
            Some(ValidationFailure::new(
                FailureKind::InvalidExtension,
                "Uploaded file is not a valid VCF file",
            ))
        };

        Self {
            file_name,
            options,
            state: ValidationState::default(),
            bytes_read: 0,
            pending_bytes: Vec::new(),
            line_buffer: String::new(),
            halted,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The failure that stopped this run, if any
    pub fn halted(&self) -> Option<&ValidationFailure> {
        self.halted.as_ref()
    }

    fn halt(&mut self, failure: ValidationFailure) -> ValidationFailure {
        log::warn!(
            "Validation of {:?} failed ({:?}): {}",
            self.file_name,
            failure.error_type,
            failure.detail.as_deref().unwrap_or(&failure.message)
        );
        self.halted = Some(failure.clone());
        failure
    }

    /// Account for, decode and process the complete lines of one chunk
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), ValidationFailure> {
        if let Some(failure) = &self.halted {
            return Err(failure.clone());
        }

        self.bytes_read += chunk.len() as u64;
        let max = self.options.validation.max_file_size;
        if self.bytes_read > max {
            let failure = ValidationFailure::new(
                FailureKind::FileTooLarge,
                format!("File size must be < {}", format_file_size(max)),
            )
            .with_detail(format!("read {} bytes so far", self.bytes_read));
            return Err(self.halt(failure));
        }

        self.decode(chunk);

        let mut start = 0;
        while let Some(offset) = self.line_buffer[start..].find('\n') {
            let end = start + offset;
            let result = self
                .state
                .process_line(&self.line_buffer[start..end], &self.options.validation);
            if let Err(failure) = result {
                return Err(self.halt(failure));
            }
            start = end + 1;
        }
        self.line_buffer.drain(..start);

        Ok(())
    }

    /// Append the valid UTF-8 in `chunk` to the line buffer, dropping invalid
    /// sequences and holding back a trailing incomplete character
    fn decode(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        let mut input: &[u8] = &self.pending_bytes;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.line_buffer.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => input = &rest[len..],
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending_bytes.len() - input.len();
        self.pending_bytes.drain(..consumed);
    }

    /// Process the trailing partial line, run the file-wide checks and build the profile
    pub fn finish(mut self) -> Result<ValidationSuccess, ValidationFailure> {
        if let Some(failure) = self.halted.take() {
            return Err(failure);
        }

        if !self.line_buffer.is_empty() {
            let last = std::mem::take(&mut self.line_buffer);
            if let Err(failure) = self.state.process_line(&last, &self.options.validation) {
                return Err(self.halt(failure));
            }
        }

        if let Err(failure) = self.check_complete() {
            return Err(self.halt(failure));
        }

        let state = self.state;
        let outcome = build_profiles(
            &state.valid_lines,
            &self.options.phenotypes,
            &self.options.profile,
        );

        let mut warnings = state.warnings;
        warnings.extend(outcome.warnings);

        log::info!(
            "Validated {:?}: {} records, {} pharmacogene records, {} genes profiled",
            self.file_name,
            state.total_variants,
            state.pharmacogene_variants,
            outcome.profiles.len()
        );

        Ok(ValidationSuccess {
            vcf_version: state.vcf_version.unwrap_or_default(),
            total_variants: state.total_variants,
            pharmacogene_variants: state.pharmacogene_variants,
            genes_detected: state.genes_detected.into_iter().collect(),
            warnings,
            genetic_profile: outcome.profiles,
            valid_lines: state.valid_lines,
        })
    }

    fn check_complete(&self) -> Result<(), ValidationFailure> {
        let config = &self.options.validation;
        let state = &self.state;

        if self.bytes_read < config.min_file_size {
            return Err(ValidationFailure::new(
                FailureKind::FileTooSmall,
                format!("File size must be > {}", format_file_size(config.min_file_size)),
            )
            .with_detail(format!("read {} bytes", self.bytes_read)));
        }

        if state.vcf_version.is_none() {
            return Err(ValidationFailure::invalid_header("Missing ##fileformat line"));
        }

        if !state.has_chrom_header {
            return Err(ValidationFailure::invalid_header("Missing #CHROM header"));
        }

        if state.total_variants == 0 {
            return Err(ValidationFailure::new(
                FailureKind::InsufficientData,
                "VCF file contains insufficient genomic data",
            )
            .with_detail("must have at least 1 variant"));
        }

        if state.pharmacogene_variants == 0 {
            return Err(ValidationFailure::new(
                FailureKind::NoPharmacogenes,
                "No pharmacogenomic variants detected in file",
            ));
        }

        let missing = state.missing_tags();
        if !missing.is_empty() {
            return Err(ValidationFailure::new(
                FailureKind::MissingAnnotations,
                "VCF lacks pharmacogenomic annotations (GENE/STAR/RS)",
            )
            .with_detail(format!("never seen: {}", missing.join(", "))));
        }

        Ok(())
    }
}

/// Validate a sequence of chunks, pulling no further chunks after a failure
pub fn validate_chunks<I, C>(
    file_name: &str,
    chunks: I,
    options: ValidatorOptions,
) -> Result<ValidationSuccess, ValidationFailure>
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut validator = StreamValidator::new(file_name, options);
    if let Some(failure) = validator.halted() {
        return Err(failure.clone());
    }

    for chunk in chunks {
        validator.push_chunk(chunk.as_ref())?;
    }
    validator.finish()
}

/// Validate everything `reader` yields, reading `chunk_size` bytes at a time
pub fn validate_reader<R: Read>(
    file_name: &str,
    mut reader: R,
    chunk_size: usize,
    options: ValidatorOptions,
) -> Result<ValidationSuccess, ValidationFailure> {
    let mut validator = StreamValidator::new(file_name, options);
    if let Some(failure) = validator.halted() {
        return Err(failure.clone());
    }

    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ValidationFailure::processing(e.to_string())),
        };
        validator.push_chunk(&buffer[..n])?;
    }
    validator.finish()
}

/// Validate a file on disk, using its file name for the extension check
pub fn validate_path<P: AsRef<Path>>(
    path: P,
    chunk_size: usize,
    options: ValidatorOptions,
) -> Result<ValidationSuccess, ValidationFailure> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    if !has_name_suffix(&file_name, &options.validation.extension) {
        return validate_chunks(&file_name, std::iter::empty::<&[u8]>(), options);
    }

    let file = File::open(path)
        .map_err(|e| ValidationFailure::processing(format!("cannot open {:?}: {}", path, e)))?;
    validate_reader(&file_name, file, chunk_size, options)
}
