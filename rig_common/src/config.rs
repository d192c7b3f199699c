//! Rig configuration loading and validation.
//!
//! All previously-implicit constants (scale factors, workspace box,
//! settle times, bus timeouts, solver rates) are collected into one
//! explicit [`RigConfig`] structure, loaded once at startup from TOML.
//!
//! Every field carries a serde default so a partial `rig.toml` is valid;
//! `validate()` rejects semantically impossible combinations before the
//! control loop starts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    Io(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

// ─── Axis / Workspace ───────────────────────────────────────────────

/// Per-linear-axis configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Motion-unit counts per millimetre of travel.
    #[serde(default = "default_counts_per_mm")]
    pub counts_per_mm: f64,
    /// Usable travel from the homed zero [mm].
    #[serde(default = "default_travel_mm")]
    pub travel_mm: f64,
    /// Delay between raw homing steps [us].
    #[serde(default = "default_homing_step_delay_us")]
    pub homing_step_delay_us: u64,
}

fn default_counts_per_mm() -> f64 {
    80.0
}
fn default_travel_mm() -> f64 {
    800.0
}
fn default_homing_step_delay_us() -> u64 {
    400
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            counts_per_mm: default_counts_per_mm(),
            travel_mm: default_travel_mm(),
            homing_step_delay_us: default_homing_step_delay_us(),
        }
    }
}

/// Workspace clamp box for solver targets.
///
/// `margin_mm` is an inward reserve kept free for a future
/// collision-aware clamp; solver outputs never enter it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_x_max")]
    pub x_max_mm: f64,
    #[serde(default = "default_y_max")]
    pub y_max_mm: f64,
    #[serde(default = "default_z_max")]
    pub z_max_mm: f64,
    #[serde(default = "default_margin")]
    pub margin_mm: f64,
}

fn default_x_max() -> f64 {
    780.0
}
fn default_y_max() -> f64 {
    580.0
}
fn default_z_max() -> f64 {
    300.0
}
fn default_margin() -> f64 {
    5.0
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            x_max_mm: default_x_max(),
            y_max_mm: default_y_max(),
            z_max_mm: default_z_max(),
            margin_mm: default_margin(),
        }
    }
}

// ─── Pan / Tilt ─────────────────────────────────────────────────────

/// Rotary pan actuator configuration.
///
/// The pan stepper is open loop: its logical angle is step bookkeeping,
/// re-referenced only by homing against the zero flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PanConfig {
    /// Steps per degree of pan rotation.
    #[serde(default = "default_steps_per_degree")]
    pub steps_per_degree: f64,
    /// Delay between steps during normal moves [us].
    #[serde(default = "default_pan_step_delay_us")]
    pub step_delay_us: u64,
    /// Maximum pan steps issued per control cycle.
    #[serde(default = "default_pan_steps_per_cycle")]
    pub steps_per_cycle: u32,
    /// Zeroing first-pass step delay [us] (slow).
    #[serde(default = "default_zero_approach_delay_us")]
    pub zero_approach_delay_us: u64,
    /// Zeroing second-pass step delay [us] (slower still).
    #[serde(default = "default_zero_crawl_delay_us")]
    pub zero_crawl_delay_us: u64,
    /// Steps to back off the zero flag between the two passes.
    #[serde(default = "default_zero_backoff_steps")]
    pub zero_backoff_steps: u32,
}

fn default_steps_per_degree() -> f64 {
    8.889
}
fn default_pan_step_delay_us() -> u64 {
    250
}
fn default_pan_steps_per_cycle() -> u32 {
    16
}
fn default_zero_approach_delay_us() -> u64 {
    1200
}
fn default_zero_crawl_delay_us() -> u64 {
    2500
}
fn default_zero_backoff_steps() -> u32 {
    40
}

impl Default for PanConfig {
    fn default() -> Self {
        Self {
            steps_per_degree: default_steps_per_degree(),
            step_delay_us: default_pan_step_delay_us(),
            steps_per_cycle: default_pan_steps_per_cycle(),
            zero_approach_delay_us: default_zero_approach_delay_us(),
            zero_crawl_delay_us: default_zero_crawl_delay_us(),
            zero_backoff_steps: default_zero_backoff_steps(),
        }
    }
}

/// Tilt actuator configuration.
///
/// The local tilt drive maps `[min_deg, max_deg]` linearly onto
/// `[min_pulse_us, max_pulse_us]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TiltConfig {
    #[serde(default = "default_tilt_min")]
    pub min_deg: f64,
    #[serde(default = "default_tilt_max")]
    pub max_deg: f64,
    /// Parking angle after homing.
    #[serde(default = "default_tilt_center")]
    pub center_deg: f64,
    #[serde(default = "default_min_pulse")]
    pub min_pulse_us: u16,
    #[serde(default = "default_max_pulse")]
    pub max_pulse_us: u16,
}

fn default_tilt_min() -> f64 {
    -45.0
}
fn default_tilt_max() -> f64 {
    45.0
}
fn default_tilt_center() -> f64 {
    0.0
}
fn default_min_pulse() -> u16 {
    1000
}
fn default_max_pulse() -> u16 {
    2000
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            min_deg: default_tilt_min(),
            max_deg: default_tilt_max(),
            center_deg: default_tilt_center(),
            min_pulse_us: default_min_pulse(),
            max_pulse_us: default_max_pulse(),
        }
    }
}

// ─── Bus / Timing ───────────────────────────────────────────────────

/// Shared serial bus configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BusConfig {
    /// Settle delay after switching the bus owner [ms].
    #[serde(default = "default_bus_settle_ms")]
    pub settle_ms: u64,
    /// Read timeout for sensor replies [ms].
    #[serde(default = "default_bus_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Acknowledgement timeout for the remote tilt actuator [ms].
    #[serde(default = "default_bus_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

fn default_bus_settle_ms() -> u64 {
    50
}
fn default_bus_read_timeout_ms() -> u64 {
    200
}
fn default_bus_ack_timeout_ms() -> u64 {
    250
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_bus_settle_ms(),
            read_timeout_ms: default_bus_read_timeout_ms(),
            ack_timeout_ms: default_bus_ack_timeout_ms(),
        }
    }
}

/// Control cycle timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Target cycle period [ms].
    #[serde(default = "default_cycle_ms")]
    pub period_ms: u64,
    /// Minimum settle time after issuing a move before "arrived" is
    /// trusted [ms] (debounces drive-electronics settling).
    #[serde(default = "default_move_settle_ms")]
    pub move_settle_ms: u64,
}

fn default_cycle_ms() -> u64 {
    10
}
fn default_move_settle_ms() -> u64 {
    150
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_ms: default_cycle_ms(),
            move_settle_ms: default_move_settle_ms(),
        }
    }
}

// ─── Solver ─────────────────────────────────────────────────────────

/// Host-side kinematic solver rates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Linear rate for keyboard movement [mm/s].
    #[serde(default = "default_linear_rate")]
    pub linear_rate_mm_s: f64,
    /// Pan degrees per mouse x-unit.
    #[serde(default = "default_mouse_pan_scale")]
    pub mouse_pan_scale: f64,
    /// Tilt degrees per mouse y-unit.
    #[serde(default = "default_mouse_tilt_scale")]
    pub mouse_tilt_scale: f64,
    /// Step size for discrete button jogs [mm].
    #[serde(default = "default_jog_step")]
    pub jog_step_mm: f64,
}

fn default_linear_rate() -> f64 {
    120.0
}
fn default_mouse_pan_scale() -> f64 {
    0.15
}
fn default_mouse_tilt_scale() -> f64 {
    0.10
}
fn default_jog_step() -> f64 {
    10.0
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            linear_rate_mm_s: default_linear_rate(),
            mouse_pan_scale: default_mouse_pan_scale(),
            mouse_tilt_scale: default_mouse_tilt_scale(),
            jog_step_mm: default_jog_step(),
        }
    }
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete rig configuration, loaded once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub x: AxisConfig,
    #[serde(default)]
    pub y: AxisConfig,
    #[serde(default)]
    pub z: AxisConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub pan: PanConfig,
    #[serde(default)]
    pub tilt: TiltConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

impl RigConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Axis configuration by axis.
    pub fn axis(&self, axis: crate::state::LinearAxis) -> &AxisConfig {
        match axis {
            crate::state::LinearAxis::X => &self.x,
            crate::state::LinearAxis::Y => &self.y,
            crate::state::LinearAxis::Z => &self.z,
        }
    }

    /// Workspace maximum for an axis [mm].
    pub fn workspace_max(&self, axis: crate::state::LinearAxis) -> f64 {
        match axis {
            crate::state::LinearAxis::X => self.workspace.x_max_mm,
            crate::state::LinearAxis::Y => self.workspace.y_max_mm,
            crate::state::LinearAxis::Z => self.workspace.z_max_mm,
        }
    }

    /// Reject semantically impossible configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, axis) in [("x", &self.x), ("y", &self.y), ("z", &self.z)] {
            if axis.counts_per_mm <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name}.counts_per_mm must be positive"
                )));
            }
            if axis.travel_mm <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name}.travel_mm must be positive"
                )));
            }
        }
        if self.tilt.min_deg >= self.tilt.max_deg {
            return Err(ConfigError::Validation(
                "tilt.min_deg must be below tilt.max_deg".into(),
            ));
        }
        if self.tilt.center_deg < self.tilt.min_deg || self.tilt.center_deg > self.tilt.max_deg {
            return Err(ConfigError::Validation(
                "tilt.center_deg must lie within the tilt range".into(),
            ));
        }
        if self.tilt.min_pulse_us >= self.tilt.max_pulse_us {
            return Err(ConfigError::Validation(
                "tilt.min_pulse_us must be below tilt.max_pulse_us".into(),
            ));
        }
        if self.pan.steps_per_degree <= 0.0 {
            return Err(ConfigError::Validation(
                "pan.steps_per_degree must be positive".into(),
            ));
        }
        if self.pan.steps_per_cycle == 0 {
            return Err(ConfigError::Validation(
                "pan.steps_per_cycle must be at least 1".into(),
            ));
        }
        if self.workspace.margin_mm < 0.0 {
            return Err(ConfigError::Validation(
                "workspace.margin_mm must not be negative".into(),
            ));
        }
        let min_travel = self
            .workspace
            .x_max_mm
            .min(self.workspace.y_max_mm)
            .min(self.workspace.z_max_mm);
        if self.workspace.margin_mm * 2.0 >= min_travel {
            return Err(ConfigError::Validation(
                "workspace.margin_mm consumes the whole workspace".into(),
            ));
        }
        if self.cycle.period_ms == 0 {
            return Err(ConfigError::Validation(
                "cycle.period_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
