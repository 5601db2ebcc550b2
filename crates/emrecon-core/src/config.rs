//! Runtime configuration for an EM refinement run: the core option
//! table plus a few additional knobs (`initial_cutoff`, `correct_scale`,
//! `wiener_filter_fsc`, `join_half`, `clamp_negative`). Global
//! compile-time flags in the original source are replaced wholesale by
//! fields here, threaded through `Optimiser::new` rather than read from
//! a central header.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for one `emrecon` refinement run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Hard cap on EM iterations.
    pub iter_max: usize,
    /// Side length `N` of every image and the unpadded reference.
    pub size: usize,
    /// Fourier-space padding factor (1 or 2).
    #[serde(default = "default_pf")]
    pub pf: usize,
    /// Gridding kernel support radius (pixels).
    #[serde(default = "default_kernel_a")]
    pub a: f64,
    /// Gridding kernel smoothness parameter.
    #[serde(default = "default_kernel_alpha")]
    pub alpha: f64,
    /// Angstroms per pixel, used only to report resolution.
    #[serde(default = "default_pixel_size")]
    pub pixel_size: f64,
    /// Number of reference classes. This crate assumes 1.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Symmetry group name (`C1`, `C2V`, `D4`, `T`, `O`, ...).
    pub sym: String,
    /// Path to the particle database (SQLite).
    pub db: PathBuf,
    /// Path to the initial reference volume (MRC).
    pub init_model: PathBuf,
    /// Base particle-filter sample count.
    #[serde(default = "default_m")]
    pub m: usize,
    /// GLOBAL-phase sample count.
    #[serde(default = "default_mg")]
    pub mg: usize,
    /// LOCAL-phase sample count.
    #[serde(default = "default_ml")]
    pub ml: usize,
    /// Initial sample-count multiplier (`mG * mF`, `mL * mF`) used only
    /// when constructing each image's first particle filter.
    #[serde(default = "default_mf")]
    pub mf: usize,
    /// Translation-search standard deviation, pixels.
    #[serde(default = "default_trans_s")]
    pub trans_s: f64,
    /// Absolute translation bound, x axis, pixels.
    #[serde(default = "default_max_x")]
    pub max_x: f64,
    /// Absolute translation bound, y axis, pixels.
    #[serde(default = "default_max_y")]
    pub max_y: f64,

    /// Fixed bootstrap cutoff, when set. `None` triggers the original's
    /// derived formula `min(8, max(MAX_GAP, size/16))` instead (see
    /// DESIGN.md, Open Question i).
    #[serde(default)]
    pub initial_cutoff: Option<usize>,
    /// Optional first-iteration scale-correction step (see DESIGN.md,
    /// Open Question ii); off by default.
    #[serde(default)]
    pub correct_scale: bool,
    /// Apply the FSC-derived Wiener term in the balance loop.
    #[serde(default = "default_true")]
    pub wiener_filter_fsc: bool,
    /// Whether the Wiener term uses the join-half `sqrt(2*FSC/(1+FSC))`
    /// transform (two independent half-maps) or raw FSC (single map).
    #[serde(default = "default_true")]
    pub join_half: bool,
    /// Clamp negative densities to zero in the final reconstruction.
    #[serde(default)]
    pub clamp_negative: bool,
}

fn default_pf() -> usize {
    2
}
fn default_kernel_a() -> f64 {
    1.9
}
fn default_kernel_alpha() -> f64 {
    15.0
}
fn default_pixel_size() -> f64 {
    1.0
}
fn default_k() -> usize {
    1
}
fn default_m() -> usize {
    50
}
fn default_mg() -> usize {
    1200
}
fn default_ml() -> usize {
    400
}
fn default_mf() -> usize {
    4
}
fn default_trans_s() -> f64 {
    2.0
}
fn default_max_x() -> f64 {
    10.0
}
fn default_max_y() -> f64 {
    10.0
}
fn default_true() -> bool {
    true
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            iter_max: 30,
            size: 128,
            pf: default_pf(),
            a: default_kernel_a(),
            alpha: default_kernel_alpha(),
            pixel_size: default_pixel_size(),
            k: default_k(),
            sym: "C1".to_string(),
            db: PathBuf::from("particles.db"),
            init_model: PathBuf::from("initial.mrc"),
            m: default_m(),
            mg: default_mg(),
            ml: default_ml(),
            mf: default_mf(),
            trans_s: default_trans_s(),
            max_x: default_max_x(),
            max_y: default_max_y(),
            initial_cutoff: None,
            correct_scale: false,
            wiener_filter_fsc: true,
            join_half: true,
            clamp_negative: false,
        }
    }
}

impl RefineConfig {
    /// `r := 16` when `initial_cutoff` is set; otherwise the original's
    /// derived bootstrap `min(8, max(MAX_GAP, size/16))` (see DESIGN.md).
    pub fn resolved_initial_cutoff(&self) -> usize {
        const MAX_GAP: usize = 10;
        self.initial_cutoff
            .unwrap_or_else(|| (self.size / 16).max(MAX_GAP).min(8).max(1))
    }

    pub fn max_r(&self) -> usize {
        self.size / 2
    }
}

impl fmt::Display for RefineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EM refinement configuration")?;
        writeln!(f, "  size:          {} (pf={})", self.size, self.pf)?;
        writeln!(f, "  symmetry:      {}", self.sym)?;
        writeln!(f, "  db:            {}", self.db.display())?;
        writeln!(f, "  init model:    {}", self.init_model.display())?;
        writeln!(f, "  iter_max:      {}", self.iter_max)?;
        writeln!(f, "  pixel size:    {:.3} A/px", self.pixel_size)?;
        writeln!(
            f,
            "  particles:     m={} mG={} mL={} mF={}",
            self.m, self.mg, self.ml, self.mf
        )?;
        writeln!(
            f,
            "  translation:   std={:.2} bound=({:.1},{:.1})",
            self.trans_s, self.max_x, self.max_y
        )?;
        write!(
            f,
            "  initial r:     {}",
            self.resolved_initial_cutoff()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let cfg = RefineConfig::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let back: RefineConfig = toml::from_str(&s).unwrap();
        assert_eq!(back.size, cfg.size);
        assert_eq!(back.sym, cfg.sym);
    }

    #[test]
    fn explicit_initial_cutoff_overrides_derived_formula() {
        let mut cfg = RefineConfig::default();
        cfg.initial_cutoff = Some(16);
        assert_eq!(cfg.resolved_initial_cutoff(), 16);
    }

    #[test]
    fn missing_initial_cutoff_uses_derived_formula() {
        let mut cfg = RefineConfig::default();
        cfg.size = 256;
        cfg.initial_cutoff = None;
        assert_eq!(cfg.resolved_initial_cutoff(), 8);
    }
}
