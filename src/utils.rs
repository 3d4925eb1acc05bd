//! Small file and process helpers shared by the library and the CLI

use crate::{PgxError, PgxResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether the file starts with the gzip magic bytes
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> PgxResult<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];

    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(PgxError::Io(e)),
    }
}

/// Case-insensitive check of the last extension (`sample.VCF` has extension `vcf`)
pub fn has_extension<P: AsRef<Path>>(path: P, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Case-insensitive `.<extension>` suffix check on a bare file name (`.vcf` itself matches)
pub fn has_name_suffix(file_name: &str, extension: &str) -> bool {
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    file_name.to_ascii_lowercase().ends_with(&suffix)
}

pub fn get_num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Fail with [`PgxError::FileNotFound`] unless `path` exists and can be opened
pub fn validate_file_readable<P: AsRef<Path>>(path: P) -> PgxResult<()> {
    let path = path.as_ref();
    let missing = || PgxError::FileNotFound(path.to_string_lossy().to_string());

    if !path.is_file() {
        return Err(missing());
    }
    File::open(path).map_err(|_| missing())?;
    Ok(())
}

/// Human-readable byte count, e.g. `5.00 MB`
pub fn format_file_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut value = size as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}

pub fn ensure_parent_dirs<P: AsRef<Path>>(path: P) -> PgxResult<()> {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Logs the time spent in a named stage when dropped
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("Started: {}", name);
        Timer {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!("{} finished in {:.2?}", self.name, self.elapsed());
    }
}
