//! Configuration loading using Figment
//!
//! Configuration is merged from:
//! 1. a TOML file (`config/rust_align.toml` by default)
//! 2. environment variables prefixed with `RUST_ALIGN_`, nested keys separated
//!    by `__` (e.g. `RUST_ALIGN_MOTION__RETRACT_UM=80`)
//!
//! Stage definitions describe axes in their scan units (µm for linear axes,
//! degrees for rotational ones) unless a `unit` is given. Turning a definition
//! into a live [`Stage`] needs a transport per axis, supplied by the caller.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use rust_align::config::AlignConfig;
//! use rust_align::hardware::{mock::MockAxisTransport, AxisTransport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AlignConfig::load()?;
//! config.validate()?;
//! let rig = config.build_stages2(|axis| {
//!     let transport: Arc<dyn AxisTransport> = Arc::new(MockAxisTransport::new(&axis.channel, 0.0));
//!     Ok(transport)
//! })?;
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{AlignError, AlignResult, TransportError, TransportErrorKind};
use crate::hardware::AxisTransport;
use crate::stage::{
    Axis, AxisConfig, AxisKind, AxisLimits, AxisMapping, AxisRole, ChipAxis, ChipCalibration,
    RetractSettings, Stage, StageRole, Stages2, Stages3, Unit, DEFAULT_CENTRING_RETRACT_UM,
    DEFAULT_REFRESH_INTERVAL, DEFAULT_RETRACT_UM,
};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/rust_align.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "RUST_ALIGN_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignConfig {
    /// Tracing output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Motion safety settings.
    #[serde(default)]
    pub motion: MotionConfig,
    /// Stage definitions.
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, coloured (development).
    #[default]
    Pretty,
    /// Single-line, uncoloured.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Emit span open/close events.
    pub with_span_events: bool,
    /// Include source file and line.
    pub with_file_and_line: bool,
    /// Include thread names.
    pub with_thread_names: bool,
    /// ANSI colours (pretty format only).
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_span_events: false,
            with_file_and_line: true,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

/// Motion safety settings shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// z retraction before restoring a snapshot, µm.
    pub retract_um: f64,
    /// z retraction while centring or making long moves, µm.
    pub centring_retract_um: f64,
    /// Re-read hardware position every N axis operations; 0 disables.
    pub refresh_interval: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            retract_um: DEFAULT_RETRACT_UM,
            centring_retract_um: DEFAULT_CENTRING_RETRACT_UM,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl MotionConfig {
    /// Retraction distances for a rig.
    pub fn retract(&self) -> RetractSettings {
        RetractSettings {
            retract_um: self.retract_um,
            centring_retract_um: self.centring_retract_um,
        }
    }
}

/// One axis of a stage definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDefinition {
    /// Physical role on the stage.
    pub role: AxisRole,
    /// Transport channel identifier handed to the transport factory.
    pub channel: String,
    /// Lower limit, in `unit`.
    pub min: f64,
    /// Upper limit, in `unit`.
    pub max: f64,
    /// Unit of `min`/`max`; defaults to µm or degrees.
    #[serde(default)]
    pub unit: Option<Unit>,
    /// Mirror positions about the maximum.
    #[serde(default)]
    pub reversed: bool,
    /// Overrides [`MotionConfig::refresh_interval`].
    #[serde(default)]
    pub refresh_interval: Option<u32>,
}

impl AxisDefinition {
    /// Unit of the limits.
    pub fn unit(&self) -> Unit {
        self.unit.unwrap_or_else(|| self.role.kind().scan_unit())
    }

    /// Limits in canonical units.
    pub fn limits(&self) -> AlignResult<AxisLimits> {
        let unit = self.unit();
        if unit.kind() != self.role.kind() {
            return Err(AlignError::config(format!(
                "axis `{}` ({}) cannot use unit {}",
                self.channel, self.role, unit
            )));
        }
        AxisLimits::new(unit.to_canonical(self.min), unit.to_canonical(self.max))
    }

    fn axis_config(&self, motion: &MotionConfig) -> AlignResult<AxisConfig> {
        let limits = self.limits()?;
        let config = match self.role.kind() {
            AxisKind::Linear => AxisConfig::linear(self.channel.clone(), limits),
            AxisKind::Rotate => AxisConfig::rotate(self.channel.clone(), limits),
        };
        Ok(config
            .reversed(self.reversed)
            .refresh_every(self.refresh_interval.unwrap_or(motion.refresh_interval)))
    }
}

/// One stage: its axes, logical mapping and chip calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique stage name.
    pub name: String,
    /// Role within a rig.
    #[serde(default)]
    pub role: Option<StageRole>,
    /// Physical axes.
    pub axes: Vec<AxisDefinition>,
    /// Logical x/y/z mapping; identity when absent.
    #[serde(default)]
    pub mapping: Option<AxisMapping>,
    /// Chip line calibration.
    #[serde(default)]
    pub chip: Option<ChipCalibration>,
}

impl StageDefinition {
    fn validate(&self) -> AlignResult<()> {
        if self.axes.is_empty() {
            return Err(AlignError::config(format!("stage `{}` has no axes", self.name)));
        }
        let mut roles = HashSet::new();
        for axis in &self.axes {
            if !roles.insert(axis.role) {
                return Err(AlignError::config(format!(
                    "stage `{}` defines axis `{}` twice",
                    self.name, axis.role
                )));
            }
            axis.limits()?;
        }
        if let Some(mapping) = &self.mapping {
            mapping.validate()?;
        }
        if self.chip.is_some() && !AxisRole::LINEAR.iter().all(|r| roles.contains(r)) {
            return Err(AlignError::config(format!(
                "stage `{}` has a chip calibration but not all of x, y and z",
                self.name
            )));
        }
        Ok(())
    }

    /// Build the stage, asking `connect` for each axis's transport.
    pub fn build<F>(&self, motion: &MotionConfig, mut connect: F) -> AlignResult<Stage>
    where
        F: FnMut(&AxisDefinition) -> anyhow::Result<Arc<dyn AxisTransport>>,
    {
        let mut builder = Stage::builder(self.name.clone());
        for definition in &self.axes {
            let transport = connect(definition).map_err(|err| {
                TransportError::from_anyhow(&definition.channel, TransportErrorKind::Communication, &err)
            })?;
            let axis = Axis::new(definition.axis_config(motion)?, transport)?;
            builder = builder.axis(definition.role, axis);
        }
        if let Some(mapping) = self.mapping {
            builder = builder.mapping(mapping);
        }
        if let Some(calibration) = &self.chip {
            builder = builder.chip(ChipAxis::from_calibration(calibration)?);
        }
        let stage = builder.build()?;
        info!(stage = %self.name, axes = self.axes.len(), "stage built from configuration");
        Ok(stage)
    }
}

impl AlignConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> AlignResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AlignResult<Self> {
        Self::extract(Figment::new().merge(Toml::file(path.as_ref())))
    }

    /// Load from TOML text and the environment.
    pub fn from_toml_str(toml: &str) -> AlignResult<Self> {
        Self::extract(Figment::new().merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> AlignResult<Self> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| AlignError::Config(Box::new(err)))
    }

    /// Render as TOML, e.g. to write a starting configuration file.
    pub fn to_toml_string(&self) -> AlignResult<String> {
        toml::to_string_pretty(self)
            .map_err(|err| AlignError::config(format!("cannot render configuration: {}", err)))
    }

    /// Check values that deserialisation cannot.
    pub fn validate(&self) -> AlignResult<()> {
        if !VALID_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AlignError::config(format!(
                "invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            )));
        }

        for (name, value) in [
            ("retract_um", self.motion.retract_um),
            ("centring_retract_um", self.motion.centring_retract_um),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AlignError::config(format!(
                    "motion.{} must be a non-negative distance, got {}",
                    name, value
                )));
            }
        }

        let mut names = HashSet::new();
        let mut roles = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name.as_str()) {
                return Err(AlignError::config(format!("duplicate stage name `{}`", stage.name)));
            }
            if let Some(role) = stage.role {
                if !roles.insert(role) {
                    return Err(AlignError::config(format!("more than one `{}` stage", role)));
                }
            }
            stage.validate()?;
        }
        Ok(())
    }

    /// Stage definition by name.
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Stage definition by rig role.
    pub fn stage_for(&self, role: StageRole) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.role == Some(role))
    }

    fn build_role<F>(&self, role: StageRole, connect: &mut F) -> AlignResult<Stage>
    where
        F: FnMut(&AxisDefinition) -> anyhow::Result<Arc<dyn AxisTransport>>,
    {
        self.stage_for(role)
            .ok_or_else(|| AlignError::config(format!("no stage with role `{}` configured", role)))?
            .build(&self.motion, &mut *connect)
    }

    /// Build an input/output rig.
    pub fn build_stages2<F>(&self, mut connect: F) -> AlignResult<Stages2>
    where
        F: FnMut(&AxisDefinition) -> anyhow::Result<Arc<dyn AxisTransport>>,
    {
        let input = self.build_role(StageRole::Input, &mut connect)?;
        let output = self.build_role(StageRole::Output, &mut connect)?;
        Ok(Stages2::new(input, output).with_retract(self.motion.retract()))
    }

    /// Build an input/output/chip rig.
    pub fn build_stages3<F>(&self, mut connect: F) -> AlignResult<Stages3>
    where
        F: FnMut(&AxisDefinition) -> anyhow::Result<Arc<dyn AxisTransport>>,
    {
        let input = self.build_role(StageRole::Input, &mut connect)?;
        let output = self.build_role(StageRole::Output, &mut connect)?;
        let chip = self.build_role(StageRole::Chip, &mut connect)?;
        Ok(Stages3::new(input, output, chip).with_retract(self.motion.retract()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hardware::mock::MockAxisTransport;
    use serial_test::serial;

    const RIG: &str = r#"
        [logging]
        level = "debug"
        format = "json"

        [motion]
        retract_um = 80.0

        [[stages]]
        name = "left"
        role = "input"
        mapping = { x = "z", y = "y", z = "x" }
        axes = [
            { role = "x", channel = "L1", min = 0.0, max = 25000.0 },
            { role = "y", channel = "L2", min = 0.0, max = 25000.0, reversed = true },
            { role = "z", channel = "L3", min = 0.0, max = 25.0, unit = "millimetre" },
            { role = "yaw", channel = "L4", min = -5.0, max = 5.0 },
        ]

        [[stages]]
        name = "right"
        role = "output"
        axes = [
            { role = "x", channel = "R1", min = 0.0, max = 25000.0 },
            { role = "y", channel = "R2", min = 0.0, max = 25000.0 },
            { role = "z", channel = "R3", min = 0.0, max = 25000.0, refresh_interval = 0 },
        ]
    "#;

    fn mock(axis: &AxisDefinition) -> anyhow::Result<Arc<dyn AxisTransport>> {
        Ok(Arc::new(MockAxisTransport::new(&axis.channel, 1_000.0)))
    }

    #[test]
    #[serial]
    fn parses_rig_definition() {
        let config = AlignConfig::from_toml_str(RIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.motion.retract_um, 80.0);
        assert_eq!(config.motion.centring_retract_um, DEFAULT_CENTRING_RETRACT_UM);

        let left = config.stage_for(StageRole::Input).unwrap();
        assert_eq!(left.name, "left");
        assert_eq!(left.axes[2].limits().unwrap().max, 25_000_000.0);
        assert_eq!(left.axes[3].limits().unwrap().min, -18_000.0);
    }

    #[test]
    #[serial]
    fn builds_a_two_stage_rig() {
        let config = AlignConfig::from_toml_str(RIG).unwrap();
        let mut rig = config.build_stages2(mock).unwrap();

        assert_eq!(rig.retract().retract_um, 80.0);
        assert_eq!(rig.input().mapping().x, AxisRole::Z);
        assert!(rig.input().require_axis(AxisRole::Yaw).unwrap().kind() == AxisKind::Rotate);
        assert!(rig.input().require_axis(AxisRole::Y).unwrap().is_reversed());
        assert_eq!(rig.output_mut().position_um().unwrap(), [Some(1.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    #[serial]
    fn missing_chip_stage_is_reported() {
        let config = AlignConfig::from_toml_str(RIG).unwrap();
        let err = config.build_stages3(mock).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    #[serial]
    fn transport_factory_failures_become_transport_errors() {
        let config = AlignConfig::from_toml_str(RIG).unwrap();
        let err = config
            .build_stages2(|axis| anyhow::bail!("port {} busy", axis.channel))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("L1"));
    }

    #[test]
    #[serial]
    fn validation_rejects_bad_values() {
        let mut config = AlignConfig::from_toml_str(RIG).unwrap();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = AlignConfig::from_toml_str(RIG).unwrap();
        config.stages[1].name = "left".into();
        assert!(config.validate().is_err());

        let mut config = AlignConfig::from_toml_str(RIG).unwrap();
        config.stages[0].axes[3].unit = Some(Unit::Micrometre);
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);

        let mut config = AlignConfig::from_toml_str(RIG).unwrap();
        config.stages[1].chip = Some(ChipCalibration {
            c1: [0.0, 0.0, 0.0],
            c2: [100.0, 0.0, -10.0],
            c1_z_chip: 0.0,
            c2_z_chip: 0.0,
            distance_mask_um: None,
            reversed: false,
        });
        config.stages[1].axes.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        std::env::set_var("RUST_ALIGN_MOTION__CENTRING_RETRACT_UM", "35");
        let config = AlignConfig::from_toml_str(RIG);
        std::env::remove_var("RUST_ALIGN_MOTION__CENTRING_RETRACT_UM");

        assert_eq!(config.unwrap().motion.centring_retract_um, 35.0);
    }

    #[test]
    #[serial]
    fn rendered_toml_loads_back() {
        let config = AlignConfig::from_toml_str(RIG).unwrap();
        let text = config.to_toml_string().unwrap();
        let reloaded = AlignConfig::from_toml_str(&text).unwrap();
        assert_eq!(reloaded.stages, config.stages);
        assert_eq!(reloaded.logging, config.logging);
    }

    #[test]
    #[serial]
    fn empty_configuration_uses_defaults() {
        let config = AlignConfig::from_toml_str("").unwrap();
        assert_eq!(config.motion, MotionConfig::default());
        assert!(config.stages.is_empty());
        config.validate().unwrap();
    }
}
