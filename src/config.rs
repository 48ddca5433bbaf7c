//! Configuration loading for the workspace scene

use crate::geometry::{Color, Point};
use crate::{Result, VizError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneConfig {
    pub scene: Scene,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scene {
    pub workspaces: Vec<WorkspaceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    pub id: String,
    pub render: RenderConfig,
    pub attributes: AttributesConfig,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
    #[serde(default)]
    pub robots: Vec<RobotConfig>,
    #[serde(default, alias = "personnel")]
    pub particles: Vec<ParticleConfig>,
    pub protocol: Vec<SubscriberConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Logical width and height, scaled into the window size.
    pub dimensions: [f64; 2],
    pub color: Color,
    #[serde(rename = "type")]
    pub render_type: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttributesConfig {
    pub scaling: f64,
    /// Frame interval in seconds. Absent means yield without delay.
    pub interval: Option<f64>,
    #[serde(default)]
    pub stale_policy: StalePolicy,
}

/// What to do with personnel telemetry older than what was already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Last write wins regardless of timestamp.
    #[default]
    Accept,
    /// Drop updates whose timestamp is strictly older than the latest applied one.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleShapeKind {
    Line,
    Polygon,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObstacleConfig {
    pub points: Vec<Point>,
    pub render: ObstacleRender,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObstacleRender {
    pub shape: ObstacleShapeKind,
    pub color: Color,
    #[serde(default = "default_stroke_width")]
    pub width: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    pub id: String,
    #[serde(default)]
    pub base: Point,
    pub render: RobotRender,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotRender {
    pub color: Color,
    pub joint_width: f64,
    pub base_width: f64,
    pub base_shoulder: f64,
    pub shoulder_elbow: f64,
    /// Falls back to `shoulder_elbow` when absent.
    pub elbow_wrist: Option<f64>,
    pub warning_zone: Option<ZoneConfig>,
    pub danger_zone: Option<ZoneConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ZoneConfig {
    pub radius: f64,
    pub color: Color,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParticleConfig {
    pub id: String,
    /// Initial position for all three tracks until telemetry arrives.
    pub center: Option<Point>,
    pub render: ParticleRender,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParticleRender {
    pub ref_pos_color: Color,
    pub uwb_pos_color: Color,
    pub est_pos_color: Color,
    pub ray_cast_color: Color,
    #[serde(default = "default_heading_color")]
    pub heading_color: Color,
    pub size: f64,
}

/// Telemetry kind a subscriber is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberKind {
    RobotTelemetry,
    PersonnelTelemetry,
    /// Derive the kind from the binding key prefix of every message.
    BindingKey,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriberConfig {
    pub name: Option<String>,
    pub kind: SubscriberKind,
    pub exchange: String,
    /// AMQP-style binding patterns (`*` one word, `#` any number of words).
    pub bindings: Vec<String>,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Newline-delimited JSON envelopes on stdin.
    #[default]
    Stdin,
    /// Newline-delimited JSON envelopes replayed from a file.
    Replay { path: PathBuf },
    /// In-process bus supplied by the embedding application.
    Memory,
    /// Zenoh subscription (requires the `zenoh-integration` feature).
    Zenoh { key_prefix: Option<String> },
}

fn default_stroke_width() -> f64 {
    1.0
}

fn default_heading_color() -> Color {
    Color::BLACK
}

impl SceneConfig {
    pub fn load_from_path(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let contents = fs::read_to_string(config_path).map_err(|e| {
            VizError::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: SceneConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot be rendered.
    pub fn validate(&self) -> Result<()> {
        if self.scene.workspaces.is_empty() {
            return Err(VizError::Config("scene declares no workspaces".into()));
        }
        let mut workspace_ids = HashSet::new();
        for workspace in &self.scene.workspaces {
            if !workspace_ids.insert(workspace.id.as_str()) {
                return Err(VizError::Config(format!("duplicate workspace id '{}'", workspace.id)));
            }
            workspace.validate()?;
        }
        // Lines from stdin cannot be shared between readers
        let stdin_readers = self
            .scene
            .workspaces
            .iter()
            .flat_map(|ws| &ws.protocol)
            .filter(|sub| sub.transport == TransportConfig::Stdin)
            .count();
        if stdin_readers > 1 {
            return Err(VizError::Config(format!(
                "{} subscribers read stdin, at most one may",
                stdin_readers
            )));
        }
        Ok(())
    }
}

impl WorkspaceConfig {
    pub fn validate(&self) -> Result<()> {
        let ctx = |msg: String| VizError::Config(format!("workspace '{}': {}", self.id, msg));

        let scaling = self.attributes.scaling;
        if !scaling.is_finite() || scaling <= 0.0 {
            return Err(ctx(format!("scaling must be positive, got {}", scaling)));
        }
        if let Some(interval) = self.attributes.interval {
            if Duration::try_from_secs_f64(interval).is_err() {
                return Err(ctx(format!(
                    "interval must be a non-negative number of seconds, got {}",
                    interval
                )));
            }
        }

        for (index, obstacle) in self.obstacles.iter().enumerate() {
            let count = obstacle.points.len();
            match obstacle.render.shape {
                ObstacleShapeKind::Line if count != 2 => {
                    return Err(ctx(format!("obstacle {} is a line with {} points", index, count)));
                }
                ObstacleShapeKind::Polygon if count <= 2 => {
                    return Err(ctx(format!("obstacle {} is a polygon with {} points", index, count)));
                }
                _ => {}
            }
        }

        let mut robot_ids = HashSet::new();
        for robot in &self.robots {
            if !robot_ids.insert(robot.id.as_str()) {
                return Err(ctx(format!("duplicate robot id '{}'", robot.id)));
            }
        }
        let mut particle_ids = HashSet::new();
        for particle in &self.particles {
            if !particle_ids.insert(particle.id.as_str()) {
                return Err(ctx(format!("duplicate personnel id '{}'", particle.id)));
            }
        }

        if self.protocol.is_empty() {
            return Err(ctx("protocol declares no subscribers".into()));
        }
        for subscriber in &self.protocol {
            if subscriber.bindings.is_empty() {
                return Err(ctx(format!("subscriber on '{}' has no bindings", subscriber.exchange)));
            }
        }
        Ok(())
    }

    /// Delay between frames for this workspace.
    pub fn interval(&self) -> Duration {
        self.attributes
            .interval
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::ZERO)
    }
}

impl SubscriberConfig {
    /// Name used in logs.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.exchange, self.bindings.join(",")))
    }
}
