//! Configuration management for the mesh leveller.
//!
//! Handles:
//! - Command-line argument parsing
//! - Loading device, probing and transform settings from TOML
//!
//! The resulting `Config` is built once and handed to each component.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

/// Command-line arguments for the mesh leveller
#[derive(Debug, Parser)]
#[command(name = "mesh-leveller")]
#[command(about = "Probe a printer bed and level G-code against the measured mesh")]
#[command(version)]
pub struct Args {
    /// Settings file to use instead of the per-user one
    #[arg(long, global = true, help = "Path to a settings TOML file")]
    pub config: Option<PathBuf>,

    /// Log level for the tool
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Probe the bed and create a mesh, or refresh an existing one
    Probe {
        /// Mesh file to refresh; created when it cannot be loaded
        #[arg(long)]
        mesh: Option<PathBuf>,
    },
    /// Level a G-code file against a mesh
    Process {
        #[arg(long)]
        mesh: PathBuf,
        #[arg(long)]
        material: String,
        gcode: PathBuf,
    },
    /// Add a material to a mesh or change its offset
    Material {
        #[arg(long)]
        mesh: PathBuf,
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<f64>,
    },
    /// Overwrite the mesh reference height
    ReferenceHeight {
        #[arg(long)]
        mesh: PathBuf,
        #[arg(allow_hyphen_values = true)]
        value: f64,
    },
}

/// Motion controller connection
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrinterSettings {
    pub address: String,
    /// Deadline for each command acknowledgement
    pub ack_timeout_ms: u64,
    /// Safety factor applied to estimated move durations
    pub movement_time_multiplier: f64,
    /// Lowest Z any motion command may ask for
    pub min_z: f64,
    /// Highest Z any motion command may ask for
    pub max_z: f64,
    /// Height the head is parked at on connect
    pub park_z: f64,
    pub park_feed: f64,
    /// Wait after the start-up park move
    pub settle_ms: u64,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8899".to_string(),
            ack_timeout_ms: 100_000,
            movement_time_multiplier: 1.5,
            min_z: 50.0,
            max_z: 100.0,
            park_z: 100.0,
            park_feed: 2000.0,
            settle_ms: 5000,
        }
    }
}

/// Touch probe connection and descent parameters. Heights in mm, speeds in mm/s.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeSettings {
    pub address: String,
    pub read_timeout_ms: u64,
    pub touch_retries: u32,
    /// Height every descent starts from
    pub start_z: f64,
    /// Lowest Z the probe may ever be commanded to
    pub floor_z: f64,
    /// Highest Z the probe may be commanded to
    pub max_z: f64,
    pub z_step: f64,
    pub speed_xy: f64,
    pub speed_z_fast: f64,
    pub speed_z_slow: f64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9988".to_string(),
            read_timeout_ms: 10_000,
            touch_retries: 3,
            start_z: 56.0,
            floor_z: 50.0,
            max_z: 100.0,
            z_step: 0.02,
            speed_xy: 80.0,
            speed_z_fast: 16.0,
            speed_z_slow: 1.0,
        }
    }
}

/// Rectangle and density of the probing grid
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridSettings {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub points_per_side: usize,
    pub repeats_per_point: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            min_x: -75.0,
            min_y: -75.0,
            max_x: 75.0,
            max_y: 75.0,
            points_per_side: 7,
            repeats_per_point: 1,
        }
    }
}

/// G-code rewrite tolerances
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransformSettings {
    /// Step along a move when checking it against the mesh (mm)
    pub resolution: f64,
    /// Allowed gap between a straight move and the mesh surface (mm)
    pub max_deviance: f64,
    /// Appended to the input file stem to name the output
    pub suffix: String,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            resolution: 0.02,
            max_deviance: 0.02,
            suffix: "-processed".to_string(),
        }
    }
}

/// All tunable settings, as read from the settings file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub printer: PrinterSettings,
    pub probe: ProbeSettings,
    pub grid: GridSettings,
    pub transform: TransformSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make probing or rewriting unsafe
    pub fn validate(&self) -> Result<()> {
        let probe = &self.probe;
        if !(probe.z_step > 0.0) {
            bail!("probe.z_step must be positive");
        }
        if probe.floor_z >= probe.start_z || probe.start_z > probe.max_z {
            bail!(
                "probe heights must satisfy floor_z < start_z <= max_z (got {} / {} / {})",
                probe.floor_z,
                probe.start_z,
                probe.max_z
            );
        }
        if probe.touch_retries == 0 {
            bail!("probe.touch_retries must be at least 1");
        }
        if [probe.speed_xy, probe.speed_z_fast, probe.speed_z_slow]
            .iter()
            .any(|s| !(*s > 0.0))
        {
            bail!("probe speeds must be positive");
        }
        if self.grid.points_per_side < 2 {
            bail!("grid.points_per_side must be at least 2");
        }
        if self.grid.repeats_per_point == 0 {
            bail!("grid.repeats_per_point must be at least 1");
        }
        if !(self.transform.resolution > 0.0) {
            bail!("transform.resolution must be positive");
        }
        if !(self.transform.max_deviance >= 0.0) {
            bail!("transform.max_deviance must not be negative");
        }
        let printer = &self.printer;
        if !(printer.min_z <= printer.park_z && printer.park_z <= printer.max_z) {
            bail!(
                "printer heights must satisfy min_z <= park_z <= max_z (got {} / {} / {})",
                printer.min_z,
                printer.park_z,
                printer.max_z
            );
        }
        if self.printer.movement_time_multiplier < 0.0 {
            bail!("printer.movement_time_multiplier must not be negative");
        }
        Ok(())
    }
}

/// Combined configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub log_level: String,
    pub settings: Settings,
    /// Where the settings were read from, if anywhere
    pub settings_path: Option<PathBuf>,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: Args) -> Result<Self> {
        // Explicit file first, then the per-user settings file if present
        let settings_path = args.config.or_else(|| {
            dirs::config_dir()
                .map(|dir| dir.join("mesh-leveller").join("config.toml"))
                .filter(|path| path.exists())
        });

        let settings = match &settings_path {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        Ok(Config {
            command: args.command,
            log_level: args.log_level,
            settings,
            settings_path,
        })
    }
}
