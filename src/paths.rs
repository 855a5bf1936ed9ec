//! # DRS path construction
//!
//! Helpers for the directory/filename convention AIMIP archives use:
//!
//! `<institute>/<model>/<activity>/<realization>/<frequency>/<variable>/<grid>/<version>/`
//! holding
//! `<variable>_<frequency>_<model>_<activity>_<realization>_<grid>_<period>.nc`
//!
//! Nothing in the conversion code enforces this layout; it is offered so
//! callers can place output files where downstream tooling expects them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Components of a DRS-style dataset path.
///
/// # Examples
///
/// ```rust
/// use nc2cmor::paths::DrsPath;
///
/// let drs = DrsPath {
///     institute: "MPI-M".to_string(),
///     model: "MPI-ESM1-2-LR".to_string(),
///     activity: "aimip".to_string(),
///     realization: "r1i1p1f1".to_string(),
///     frequency: "Amon".to_string(),
///     variable: "tas".to_string(),
///     grid: "gr".to_string(),
///     version: "v20190815".to_string(),
///     period: "197901-199812".to_string(),
/// };
/// assert_eq!(
///     drs.filename(),
///     "tas_Amon_MPI-ESM1-2-LR_aimip_r1i1p1f1_gr_197901-199812.nc"
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrsPath {
    pub institute: String,
    pub model: String,
    pub activity: String,
    pub realization: String,
    /// Output frequency table, e.g. `Amon`
    pub frequency: String,
    pub variable: String,
    /// `gr` for the regular 1-degree grid, `gn` for the native grid
    pub grid: String,
    pub version: String,
    /// Time span covered by the file, e.g. `197901-199812`
    pub period: String,
}

impl DrsPath {
    /// Directory holding the dataset version.
    pub fn directory(&self) -> PathBuf {
        [
            &self.institute,
            &self.model,
            &self.activity,
            &self.realization,
            &self.frequency,
            &self.variable,
            &self.grid,
            &self.version,
        ]
        .iter()
        .collect()
    }

    /// Filename for the dataset file.
    pub fn filename(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}.nc",
            self.variable,
            self.frequency,
            self.model,
            self.activity,
            self.realization,
            self.grid,
            self.period
        )
    }

    /// Directory and filename joined.
    pub fn full_path(&self) -> PathBuf {
        self.directory().join(self.filename())
    }
}
