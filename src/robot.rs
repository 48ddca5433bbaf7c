//! Robot arm store
//!
//! Each arm is shown as a planar kinematic chain base → shoulder → elbow →
//! wrist. Poses come only from telemetry; nothing here computes kinematics.

use crate::config::{RobotConfig, ZoneConfig};
use crate::geometry::{Color, Point};
use crate::scaling::Scaler;
use crate::surface::DrawSurface;
use tracing::debug;

/// Latest joint positions of one arm, in logical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotPose {
    pub base: Point,
    pub shoulder: Point,
    pub elbow: Point,
    pub wrist: Point,
}

impl RobotPose {
    /// All joints collapsed onto the base.
    pub fn at_base(base: Point) -> Self {
        Self {
            base,
            shoulder: base,
            elbow: base,
            wrist: base,
        }
    }
}

/// Partial pose update. `None` keeps the stored joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RobotUpdate {
    pub base: Option<Point>,
    pub shoulder: Option<Point>,
    pub elbow: Option<Point>,
    pub wrist: Option<Point>,
}

impl RobotUpdate {
    pub fn full(base: Point, shoulder: Point, elbow: Point, wrist: Point) -> Self {
        Self {
            base: Some(base),
            shoulder: Some(shoulder),
            elbow: Some(elbow),
            wrist: Some(wrist),
        }
    }

    fn apply(&self, pose: &mut RobotPose) {
        if let Some(base) = self.base {
            pose.base = base;
        }
        if let Some(shoulder) = self.shoulder {
            pose.shoulder = shoulder;
        }
        if let Some(elbow) = self.elbow {
            pose.elbow = elbow;
        }
        if let Some(wrist) = self.wrist {
            pose.wrist = wrist;
        }
    }
}

#[derive(Debug, Clone)]
struct RobotStyle {
    color: Color,
    joint_width: f64,
    base_width: f64,
    base_shoulder: f64,
    shoulder_elbow: f64,
    elbow_wrist: f64,
    warning_zone: Option<ZoneConfig>,
    danger_zone: Option<ZoneConfig>,
}

#[derive(Debug, Clone)]
pub struct RobotVisual {
    id: String,
    pose: RobotPose,
    style: RobotStyle,
}

impl RobotVisual {
    pub fn from_config(config: &RobotConfig) -> Self {
        let render = &config.render;
        Self {
            id: config.id.clone(),
            pose: RobotPose::at_base(config.base),
            style: RobotStyle {
                color: render.color,
                joint_width: render.joint_width,
                base_width: render.base_width,
                base_shoulder: render.base_shoulder,
                shoulder_elbow: render.shoulder_elbow,
                elbow_wrist: render.elbow_wrist.unwrap_or(render.shoulder_elbow),
                warning_zone: render.warning_zone,
                danger_zone: render.danger_zone,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pose(&self) -> &RobotPose {
        &self.pose
    }

    fn draw(&self, surface: &mut dyn DrawSurface, scaler: &Scaler) {
        let style = &self.style;
        let base = scaler.scale_point(self.pose.base);
        let shoulder = scaler.scale_point(self.pose.shoulder);
        let elbow = scaler.scale_point(self.pose.elbow);
        let wrist = scaler.scale_point(self.pose.wrist);

        // Zones underneath, the larger warning zone first
        for zone in [style.warning_zone, style.danger_zone].into_iter().flatten() {
            surface.draw_circle(base, scaler.scale_scalar(zone.radius), zone.color);
        }

        surface.draw_line(base, shoulder, style.color, style.base_shoulder);
        surface.draw_line(shoulder, elbow, style.color, style.shoulder_elbow);
        surface.draw_line(elbow, wrist, style.color, style.elbow_wrist);

        surface.draw_circle(base, style.base_width, style.color);
        for joint in [shoulder, elbow, wrist] {
            surface.draw_circle(joint, style.joint_width, style.color);
            surface.draw_circle(joint, style.joint_width / 2.0, Color::WHITE);
        }
    }
}

/// Arms of one workspace, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RobotStore {
    robots: Vec<RobotVisual>,
}

impl RobotStore {
    pub fn from_config(configs: &[RobotConfig]) -> Self {
        Self {
            robots: configs.iter().map(RobotVisual::from_config).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RobotVisual> {
        self.robots.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.robots.iter().map(|r| r.id.as_str())
    }

    /// Merge `update` into the arm named `id`.
    ///
    /// Returns `false` without touching anything when no such arm is configured.
    pub fn update(&mut self, id: &str, update: &RobotUpdate) -> bool {
        match self.robots.iter_mut().find(|r| r.id == id) {
            Some(robot) => {
                update.apply(&mut robot.pose);
                true
            }
            None => {
                debug!(entity = id, "No robot configured with this id");
                false
            }
        }
    }

    pub fn draw(&self, surface: &mut dyn DrawSurface, scaler: &Scaler) {
        for robot in &self.robots {
            robot.draw(surface, scaler);
        }
    }
}
