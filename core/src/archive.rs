//! Sector file readers and the archive interface that serves them.
//!
//! TESS light curves are distributed one file per observing sector.  The
//! pipeline consumes them in the CSV layout `lightkurve` writes with
//! `LightCurve.to_csv()`: a header row followed by `time`, `flux`,
//! `flux_err` and `quality` columns (any further columns are ignored).
//!
//! This module provides a [`SectorIO`] trait with a [`CsvSectorReader`]
//! implementation, an extension-dispatching [`SectorReader`], and the
//! [`SectorArchive`] abstraction the pipeline queries by catalog ID.
//! [`LocalArchive`] serves a directory of downloaded sector files and
//! [`MemoryArchive`] serves sectors held in memory.  [`stitch`] merges the
//! sectors of one target into a single ordered [`LightCurve`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ndarray::Array1;
use serde::Deserialize;

use crate::lightcurve::{LightCurve, LightCurveError};
use crate::stats;

/// Quality bits excluded by default: attitude tweak, safe mode, coarse
/// point, earth point, reaction wheel desaturation and manual exclude.
pub const DEFAULT_QUALITY_BITMASK: u32 = 1 | 2 | 4 | 8 | 32 | 128;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while locating or reading sector files.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unsupported sector file format: {0}")]
    UnsupportedFormat(String),

    #[error("target '{0}' not found in archive")]
    TargetNotFound(String),

    #[error("sector file {path}: {reason}")]
    BadSector { path: String, reason: String },

    #[error("no usable samples left after quality filtering for '{0}'")]
    NoUsableSamples(String),

    #[error(transparent)]
    LightCurve(#[from] LightCurveError),
}

// ---------------------------------------------------------------------------
// Sector
// ---------------------------------------------------------------------------

/// One raw observing segment as stored on disk.  No ordering is assumed.
#[derive(Clone, Debug, Default)]
pub struct Sector {
    pub sector: u32,
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
    pub flux_err: Vec<f64>,
    pub quality: Vec<u32>,
}

impl Sector {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Abstract interface for reading one sector file.
pub trait SectorIO {
    fn read(&self, path: &Path) -> Result<Sector, ArchiveError>;
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: Option<f64>,
    flux: Option<f64>,
    #[serde(default)]
    flux_err: Option<f64>,
    #[serde(default)]
    quality: Option<u32>,
}

/// Reader for lightkurve CSV exports.
pub struct CsvSectorReader;

impl SectorIO for CsvSectorReader {
    fn read(&self, path: &Path) -> Result<Sector, ArchiveError> {
        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        for required in ["time", "flux"] {
            if !headers.iter().any(|h| h == required) {
                return Err(ArchiveError::BadSector {
                    path: path.display().to_string(),
                    reason: format!("missing '{}' column", required),
                });
            }
        }

        let mut sector = Sector {
            sector: sector_number(path).unwrap_or(0),
            ..Sector::default()
        };
        for row in reader.deserialize::<CsvRow>() {
            let row = row?;
            sector.time.push(row.time.unwrap_or(f64::NAN));
            sector.flux.push(row.flux.unwrap_or(f64::NAN));
            sector.flux_err.push(row.flux_err.unwrap_or(f64::NAN));
            sector.quality.push(row.quality.unwrap_or(0));
        }

        debug!("Read {} samples from {}", sector.len(), path.display());
        Ok(sector)
    }
}

/// Parse the sector number from a `<target>_s<NN>.<ext>` file name.
fn sector_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
    let pos = stem.rfind("_s")?;
    let digits: String = stem[pos + 2..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Auto-detecting sector reader keyed on the file extension.
#[derive(Clone, Debug, Default)]
pub struct SectorReader;

impl SectorReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read(&self, path: &Path) -> Result<Sector, ArchiveError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" => CsvSectorReader.read(path),
            "fits" | "fit" => Err(ArchiveError::UnsupportedFormat(
                "FITS sector files are not read directly; export them with lightkurve to_csv()"
                    .to_string(),
            )),
            other => Err(ArchiveError::UnsupportedFormat(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Archive interface
// ---------------------------------------------------------------------------

/// Lower-case alphanumeric form of a catalog ID: `"TIC 307210830"` becomes
/// `"tic307210830"`.
pub fn target_slug(target: &str) -> String {
    target
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A source of per-sector light curves addressed by catalog ID.
pub trait SectorArchive {
    /// Fetch every available sector for `target`.  A target with no sectors
    /// is an error.
    fn download_all(&self, target: &str) -> Result<Vec<Sector>, ArchiveError>;
}

/// Directory of downloaded sector files named `<target-slug>_s<NN>.csv`.
#[derive(Clone, Debug)]
pub struct LocalArchive {
    root: PathBuf,
    reader: SectorReader,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reader: SectorReader::new(),
        }
    }

    /// List the sector files belonging to `target`, sorted by name.
    pub fn search(&self, target: &str) -> Result<Vec<PathBuf>, ArchiveError> {
        let slug = target_slug(target);
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let prefix = stem.split('_').next().unwrap_or(stem);
            if target_slug(prefix) == slug {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}

impl SectorArchive for LocalArchive {
    fn download_all(&self, target: &str) -> Result<Vec<Sector>, ArchiveError> {
        let paths = self.search(target)?;
        if paths.is_empty() {
            return Err(ArchiveError::TargetNotFound(target.to_string()));
        }
        info!("Found {} sector files for {}", paths.len(), target);
        paths.iter().map(|p| self.reader.read(p)).collect()
    }
}

/// In-memory archive, keyed by target slug.
#[derive(Clone, Debug, Default)]
pub struct MemoryArchive {
    sectors: HashMap<String, Vec<Sector>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: &str, sectors: Vec<Sector>) {
        self.sectors.insert(target_slug(target), sectors);
    }
}

impl SectorArchive for MemoryArchive {
    fn download_all(&self, target: &str) -> Result<Vec<Sector>, ArchiveError> {
        match self.sectors.get(&target_slug(target)) {
            Some(sectors) if !sectors.is_empty() => Ok(sectors.clone()),
            _ => Err(ArchiveError::TargetNotFound(target.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Stitching
// ---------------------------------------------------------------------------

/// Merge sectors into one light curve.
///
/// Samples with a non-finite time or flux, or with any bit of
/// `quality_bitmask` set, are dropped.  Each sector is divided by its own
/// median flux, the union is sorted by time and repeated timestamps keep
/// their first occurrence.
pub fn stitch(
    target: &str,
    sectors: &[Sector],
    quality_bitmask: u32,
) -> Result<LightCurve, ArchiveError> {
    let mut samples: Vec<(f64, f64, f64, u32)> = Vec::new();
    let mut sector_ids = Vec::new();

    for sector in sectors {
        let n = sector.len();
        if sector.flux.len() != n || sector.flux_err.len() != n || sector.quality.len() != n {
            return Err(ArchiveError::BadSector {
                path: format!("sector {}", sector.sector),
                reason: "column lengths differ".to_string(),
            });
        }

        let usable: Vec<usize> = (0..n)
            .filter(|&i| {
                sector.time[i].is_finite()
                    && sector.flux[i].is_finite()
                    && sector.quality[i] & quality_bitmask == 0
            })
            .collect();
        if usable.is_empty() {
            warn!("Sector {} has no usable samples, skipping", sector.sector);
            continue;
        }

        let fluxes: Vec<f64> = usable.iter().map(|&i| sector.flux[i]).collect();
        let norm = match stats::median(&fluxes) {
            Some(m) if m != 0.0 => m,
            _ => 1.0,
        };

        for &i in &usable {
            samples.push((
                sector.time[i],
                sector.flux[i] / norm,
                sector.flux_err[i] / norm,
                sector.quality[i],
            ));
        }
        sector_ids.push(sector.sector);
    }

    if samples.is_empty() {
        return Err(ArchiveError::NoUsableSamples(target.to_string()));
    }

    samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    samples.dedup_by(|next, prev| next.0 == prev.0);

    let time = Array1::from_iter(samples.iter().map(|s| s.0));
    let flux = Array1::from_iter(samples.iter().map(|s| s.1));
    let flux_err = Array1::from_iter(samples.iter().map(|s| s.2));
    let quality = Array1::from_iter(samples.iter().map(|s| s.3));

    sector_ids.sort_unstable();
    sector_ids.dedup();

    let lc = LightCurve::new(target, time, flux, flux_err, quality)?.with_sectors(sector_ids);
    info!(
        "Stitched {} sectors into {} samples spanning {:.1} days",
        lc.sectors.len(),
        lc.len(),
        lc.baseline()
    );
    Ok(lc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn sector(id: u32, time: Vec<f64>, flux: Vec<f64>) -> Sector {
        let n = time.len();
        Sector {
            sector: id,
            time,
            flux,
            flux_err: vec![1.0; n],
            quality: vec![0; n],
        }
    }

    #[test]
    fn slug_normalises_catalog_id() {
        assert_eq!(target_slug("TIC 307210830"), "tic307210830");
        assert_eq!(target_slug("tic-307210830"), "tic307210830");
    }

    #[test]
    fn sector_number_from_name() {
        assert_eq!(sector_number(Path::new("tic1_s02.csv")), Some(2));
        assert_eq!(sector_number(Path::new("tic1_s45_extra.csv")), Some(45));
        assert_eq!(sector_number(Path::new("tic1.csv")), None);
    }

    #[test]
    fn stitch_sorts_normalises_and_dedups() {
        let a = sector(2, vec![3.0, 4.0], vec![200.0, 200.0]);
        let b = sector(1, vec![1.0, 2.0, 3.0], vec![50.0, 50.0, 50.0]);
        let lc = stitch("TIC 1", &[a, b], DEFAULT_QUALITY_BITMASK).unwrap();
        assert_eq!(lc.time().to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        for f in lc.flux().iter() {
            assert_relative_eq!(*f, 1.0);
        }
        assert_eq!(lc.sectors, vec![1, 2]);
    }

    #[test]
    fn stitch_drops_flagged_and_nan() {
        let mut s = sector(1, vec![1.0, 2.0, 3.0, 4.0], vec![1.0, f64::NAN, 1.0, 1.0]);
        s.quality[2] = 32;
        s.quality[3] = 1024; // not in the default mask
        let lc = stitch("TIC 1", &[s], DEFAULT_QUALITY_BITMASK).unwrap();
        assert_eq!(lc.time().to_vec(), vec![1.0, 4.0]);
    }

    #[test]
    fn stitch_with_nothing_usable_is_an_error() {
        let s = sector(1, vec![f64::NAN], vec![1.0]);
        assert!(matches!(
            stitch("TIC 1", &[s], DEFAULT_QUALITY_BITMASK),
            Err(ArchiveError::NoUsableSamples(_))
        ));
    }

    #[test]
    fn local_archive_reads_csv_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("tic42_s07.csv")).unwrap();
        writeln!(f, "# exported by lightkurve").unwrap();
        writeln!(f, "time,flux,flux_err,quality,centroid_col").unwrap();
        writeln!(f, "1.0,100.0,0.5,0,10.0").unwrap();
        writeln!(f, "2.0,nan,0.5,0,10.0").unwrap();
        writeln!(f, "3.0,102.0,,0,10.0").unwrap();
        fs::File::create(dir.path().join("tic4_s01.csv")).unwrap();

        let archive = LocalArchive::new(dir.path());
        let found = archive.search("TIC 42").unwrap();
        assert_eq!(found.len(), 1);

        let sectors = archive.download_all("TIC 42").unwrap();
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].sector, 7);
        assert_eq!(sectors[0].len(), 3);
        assert!(sectors[0].flux[1].is_nan());
        assert!(sectors[0].flux_err[2].is_nan());
    }

    #[test]
    fn local_archive_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let archive = LocalArchive::new(dir.path());
        assert!(matches!(
            archive.download_all("TIC 99"),
            Err(ArchiveError::TargetNotFound(_))
        ));
    }

    #[test]
    fn csv_without_flux_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tic1_s01.csv");
        fs::write(&path, "time,sap_flux\n1.0,2.0\n").unwrap();
        assert!(matches!(
            CsvSectorReader.read(&path),
            Err(ArchiveError::BadSector { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        assert!(matches!(
            SectorReader::new().read(Path::new("tic1_s01.fil")),
            Err(ArchiveError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn memory_archive_lookup() {
        let mut archive = MemoryArchive::new();
        archive.insert("TIC 5", vec![sector(1, vec![1.0], vec![1.0])]);
        assert_eq!(archive.download_all("tic5").unwrap().len(), 1);
        assert!(archive.download_all("TIC 6").is_err());
    }
}
