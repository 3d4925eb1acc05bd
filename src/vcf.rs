//! VCF record tokenization and field-level checks

use crate::panel::{GENE_TAG, MISSING_VALUE, RS_TAG, STAR_TAG};

/// Minimum number of columns in the `#CHROM` row and in every data line
pub const MIN_COLUMNS: usize = 8;

/// Column indices for the fixed VCF layout
pub const POS_COL: usize = 1;
pub const ID_COL: usize = 2;
pub const REF_COL: usize = 3;
pub const ALT_COL: usize = 4;
pub const INFO_COL: usize = 7;
pub const FORMAT_COL: usize = 8;
pub const SAMPLE_COL: usize = 9;

/// How columns are separated in the file being read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Tab,
    /// Any run of whitespace, used once a space-separated file has been detected
    Whitespace,
}

impl Delimiter {
    pub fn split(self, line: &str) -> Vec<&str> {
        match self {
            Delimiter::Tab => line.split('\t').collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
        }
    }
}

/// Split a line that has already been validated, picking the delimiter per line
pub fn split_validated_line(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        Delimiter::Tab.split(line)
    } else {
        Delimiter::Whitespace.split(line)
    }
}

/// Parsed semicolon-separated INFO column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoField<'a> {
    entries: Vec<(&'a str, Option<&'a str>)>,
}

impl<'a> InfoField<'a> {
    pub fn parse(field: &'a str) -> Self {
        let entries = field
            .split(';')
            .map(|part| match part.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (part, None),
            })
            .collect();
        InfoField { entries }
    }

    /// Whether the key occurs at all, with or without a value
    pub fn has_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Value of the last occurrence of `key`, ignoring bare-key and empty forms
    pub fn value(&self, key: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| *v)
            .filter(|v| !v.is_empty())
    }

    pub fn gene(&self) -> Option<&'a str> {
        self.value(GENE_TAG)
    }

    pub fn rsid(&self) -> Option<&'a str> {
        self.value(RS_TAG)
    }

    pub fn star_allele(&self) -> Option<&'a str> {
        self.value(STAR_TAG)
    }
}

/// Zygosity implied by a raw GT string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zygosity {
    Heterozygous,
    Homozygous,
    /// Reference calls, missing calls and anything outside the supported encodings
    Other,
}

impl Zygosity {
    pub fn from_gt(gt: &str) -> Self {
        match gt {
            "0/1" | "1/0" => Zygosity::Heterozygous,
            "1/1" | "1|1" => Zygosity::Homozygous,
            _ => Zygosity::Other,
        }
    }
}

/// Pull the non-empty GT sub-field out of a FORMAT/sample column pair
pub fn genotype_from_columns<'a>(format: &str, sample: &'a str) -> Option<&'a str> {
    let gt_idx = format.split(':').position(|key| key == "GT")?;
    sample.split(':').nth(gt_idx).filter(|gt| !gt.is_empty())
}

/// Fatal problems with a single data line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Malformed variant records detected (Line {line}: Insufficient columns)")]
    InsufficientColumns { line: usize },

    #[error("Corrupted variant entries detected (Line {line}: Missing POS)")]
    MissingPosition { line: usize },

    #[error("Malformed variant records detected (Line {line}: POS not integer)")]
    PositionNotInteger { line: usize },

    #[error("Corrupted variant entries detected (Line {line}: Missing ID or ALT)")]
    MissingIdOrAlt { line: usize },

    #[error("Malformed variant records detected (Line {line}: Invalid REF bases)")]
    InvalidRefBases { line: usize },

    #[error("Malformed variant records detected (Line {line}: Invalid ALT bases)")]
    InvalidAltBases { line: usize },
}

impl RecordError {
    /// User-facing text with the line detail removed
    pub fn summary(&self) -> &'static str {
        match self {
            RecordError::MissingPosition { .. } | RecordError::MissingIdOrAlt { .. } => {
                "Corrupted variant entries detected"
            }
            _ => "Malformed variant records detected",
        }
    }

    pub fn line(&self) -> usize {
        match self {
            RecordError::InsufficientColumns { line }
            | RecordError::MissingPosition { line }
            | RecordError::PositionNotInteger { line }
            | RecordError::MissingIdOrAlt { line }
            | RecordError::InvalidRefBases { line }
            | RecordError::InvalidAltBases { line } => *line,
        }
    }
}

fn is_nucleotide_sequence(bases: &str) -> bool {
    bases
        .bytes()
        .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
}

/// One data line that passed every field-level check
#[derive(Debug, Clone)]
pub struct DataRecord<'a> {
    pub chrom: &'a str,
    pub pos: i64,
    pub id: &'a str,
    pub ref_bases: &'a str,
    pub alt_bases: &'a str,
    pub info: InfoField<'a>,
    pub format: Option<&'a str>,
    pub sample: Option<&'a str>,
}

impl<'a> DataRecord<'a> {
    /// Check the columns of data line `line` and borrow them into a record
    pub fn from_columns(columns: &[&'a str], line: usize) -> Result<Self, RecordError> {
        if columns.len() < MIN_COLUMNS {
            return Err(RecordError::InsufficientColumns { line });
        }

        let pos_field = columns[POS_COL];
        if pos_field == MISSING_VALUE {
            return Err(RecordError::MissingPosition { line });
        }
        let pos = pos_field
            .trim()
            .parse::<i64>()
            .map_err(|_| RecordError::PositionNotInteger { line })?;

        let id = columns[ID_COL];
        let alt_bases = columns[ALT_COL];
        if alt_bases == MISSING_VALUE || id == MISSING_VALUE {
            return Err(RecordError::MissingIdOrAlt { line });
        }

        let ref_bases = columns[REF_COL];
        if !is_nucleotide_sequence(ref_bases) {
            return Err(RecordError::InvalidRefBases { line });
        }
        if !is_nucleotide_sequence(alt_bases) {
            return Err(RecordError::InvalidAltBases { line });
        }

        let (format, sample) = if columns.len() > SAMPLE_COL {
            (Some(columns[FORMAT_COL]), Some(columns[SAMPLE_COL]))
        } else {
            (None, None)
        };

        Ok(DataRecord {
            chrom: columns[0],
            pos,
            id,
            ref_bases,
            alt_bases,
            info: InfoField::parse(columns[INFO_COL]),
            format,
            sample,
        })
    }

    /// Raw GT string from the first sample, if the record carries one
    pub fn genotype(&self) -> Option<&'a str> {
        match (self.format, self.sample) {
            (Some(format), Some(sample)) => genotype_from_columns(format, sample),
            _ => None,
        }
    }
}
