//! Personnel store
//!
//! A person is drawn as a point object with three independently tracked
//! positions: reference (ground truth), measured (UWB) and estimated.
//! Optional ray-cast view and heading arrive as loosely typed telemetry and
//! are validated by the scaler at draw time.

use crate::config::{ParticleConfig, StalePolicy};
use crate::geometry::{Color, Point};
use crate::scaling::Scaler;
use crate::surface::DrawSurface;
use crate::{Result, VizError};
use serde_json::Value;
use tracing::{debug, error};

/// Heading indicator length, in logical units.
const HEADING_LENGTH: f64 = 2.0;
const HEADING_WIDTH: f64 = 3.0;
const RAY_WIDTH: f64 = 1.0;

/// Partial personnel update. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonnelUpdate {
    pub ref_position: Option<Point>,
    pub uwb_position: Option<Point>,
    pub est_position: Option<Point>,
    pub radius: Option<f64>,
    /// Ray endpoints, each an object carrying a `contact_point`.
    pub world_view: Option<Vec<Value>>,
    /// Object with `start` and `end` coordinates.
    pub ref_heading: Option<Value>,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone)]
struct ParticleStyle {
    ref_pos_color: Color,
    uwb_pos_color: Color,
    est_pos_color: Color,
    ray_cast_color: Color,
    heading_color: Color,
}

#[derive(Debug, Clone)]
pub struct ParticleVisual {
    id: String,
    ref_center: Option<Point>,
    uwb_center: Option<Point>,
    est_center: Option<Point>,
    radius: f64,
    world_view: Option<Vec<Value>>,
    ref_heading: Option<Value>,
    last_timestamp: Option<f64>,
    style: ParticleStyle,
}

/// Render-space geometry of one person, computed before anything is drawn
/// so a bad field skips the whole person instead of half of it.
struct ParticleFrame {
    rays: Vec<(Point, Point)>,
    uwb: Point,
    reference: Point,
    estimated: Point,
    heading: Option<(Point, Point)>,
}

impl ParticleVisual {
    pub fn from_config(config: &ParticleConfig) -> Self {
        let render = &config.render;
        Self {
            id: config.id.clone(),
            ref_center: config.center,
            uwb_center: config.center,
            est_center: config.center,
            radius: render.size,
            world_view: None,
            ref_heading: None,
            last_timestamp: None,
            style: ParticleStyle {
                ref_pos_color: render.ref_pos_color,
                uwb_pos_color: render.uwb_pos_color,
                est_pos_color: render.est_pos_color,
                ray_cast_color: render.ray_cast_color,
                heading_color: render.heading_color,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ref_center(&self) -> Option<Point> {
        self.ref_center
    }

    pub fn uwb_center(&self) -> Option<Point> {
        self.uwb_center
    }

    pub fn est_center(&self) -> Option<Point> {
        self.est_center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn world_view(&self) -> Option<&[Value]> {
        self.world_view.as_deref()
    }

    pub fn ref_heading(&self) -> Option<&Value> {
        self.ref_heading.as_ref()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    fn apply(&mut self, update: &PersonnelUpdate) {
        if let Some(p) = update.ref_position {
            self.ref_center = Some(p);
        }
        if let Some(p) = update.uwb_position {
            self.uwb_center = Some(p);
        }
        if let Some(p) = update.est_position {
            self.est_center = Some(p);
        }
        if let Some(radius) = update.radius {
            self.radius = radius;
        }
        if let Some(view) = &update.world_view {
            self.world_view = Some(view.clone());
        }
        if let Some(heading) = &update.ref_heading {
            self.ref_heading = Some(heading.clone());
        }
        if let Some(ts) = update.timestamp {
            self.last_timestamp = Some(self.last_timestamp.map_or(ts, |last| last.max(ts)));
        }
    }

    fn plan(&self, scaler: &Scaler) -> Result<Option<ParticleFrame>> {
        let (Some(ref_center), Some(uwb_center), Some(est_center)) =
            (self.ref_center, self.uwb_center, self.est_center)
        else {
            return Ok(None);
        };
        let reference = scaler.scale_point(ref_center);

        let mut rays = Vec::new();
        if let Some(view) = &self.world_view {
            for ray in view {
                let contact = ray.get("contact_point").unwrap_or(&Value::Null);
                rays.push((reference, scaler.scale_coordinate(contact)?));
            }
        }

        let heading = match &self.ref_heading {
            Some(heading) => {
                let start = scaler.scale_coordinate(heading.get("start").unwrap_or(&Value::Null))?;
                let end = scaler.scale_coordinate(heading.get("end").unwrap_or(&Value::Null))?;
                let angle = (end.y - start.y).atan2(end.x - start.x);
                let tip = Point::new(
                    ref_center.x + angle.cos() * HEADING_LENGTH,
                    ref_center.y + angle.sin() * HEADING_LENGTH,
                );
                Some((reference, scaler.scale_point(tip)))
            }
            None => None,
        };

        Ok(Some(ParticleFrame {
            rays,
            uwb: scaler.scale_point(uwb_center),
            reference,
            estimated: scaler.scale_point(est_center),
            heading,
        }))
    }

    fn draw(&self, surface: &mut dyn DrawSurface, scaler: &Scaler) -> Result<()> {
        let Some(frame) = self.plan(scaler)? else {
            debug!(entity = %self.id, "Personnel has no position yet, not drawn");
            return Ok(());
        };
        let style = &self.style;
        for (start, end) in frame.rays {
            surface.draw_line(start, end, style.ray_cast_color, RAY_WIDTH);
        }
        surface.draw_circle(frame.uwb, self.radius, style.uwb_pos_color);
        surface.draw_circle(frame.reference, self.radius, style.ref_pos_color);
        surface.draw_circle(frame.estimated, self.radius, style.est_pos_color);
        if let Some((start, end)) = frame.heading {
            surface.draw_line(start, end, style.heading_color, HEADING_WIDTH);
        }
        Ok(())
    }
}

/// Tracked personnel of one workspace, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct PersonnelStore {
    particles: Vec<ParticleVisual>,
    stale_policy: StalePolicy,
}

impl PersonnelStore {
    pub fn from_config(configs: &[ParticleConfig], stale_policy: StalePolicy) -> Self {
        Self {
            particles: configs.iter().map(ParticleVisual::from_config).collect(),
            stale_policy,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ParticleVisual> {
        self.particles.iter().find(|p| p.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.particles.iter().map(|p| p.id.as_str())
    }

    /// Merge `update` into the person named `id`.
    ///
    /// Returns `Ok(false)` when no such person is configured. Under
    /// [`StalePolicy::Reject`] an update older than the latest applied
    /// timestamp fails with [`VizError::StaleTelemetry`] and changes nothing.
    pub fn update(&mut self, id: &str, update: &PersonnelUpdate) -> Result<bool> {
        let Some(particle) = self.particles.iter_mut().find(|p| p.id == id) else {
            debug!(entity = id, "No personnel configured with this id");
            return Ok(false);
        };
        if self.stale_policy == StalePolicy::Reject {
            if let (Some(received), Some(latest)) = (update.timestamp, particle.last_timestamp) {
                if received < latest {
                    return Err(VizError::StaleTelemetry {
                        id: id.to_string(),
                        received,
                        latest,
                    });
                }
            }
        }
        particle.apply(update);
        Ok(true)
    }

    /// Draw every person. A person whose telemetry cannot be rendered is
    /// logged and skipped; the others still draw.
    pub fn draw(&self, surface: &mut dyn DrawSurface, scaler: &Scaler) {
        for particle in &self.particles {
            if let Err(e) = particle.draw(surface, scaler) {
                error!(entity = %particle.id, error = %e, "Skipping personnel in this frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParticleRender;
    use crate::surface::{DrawCommand, RecordingSurface};
    use serde_json::json;

    fn particle_config(id: &str, center: Option<Point>) -> ParticleConfig {
        ParticleConfig {
            id: id.to_string(),
            center,
            render: ParticleRender {
                ref_pos_color: Color::rgb(0, 255, 0),
                uwb_pos_color: Color::rgb(255, 0, 0),
                est_pos_color: Color::rgb(0, 0, 255),
                ray_cast_color: Color::rgb(100, 100, 100),
                heading_color: Color::BLACK,
                size: 5.0,
            },
        }
    }

    fn positions(p: Point) -> PersonnelUpdate {
        PersonnelUpdate {
            ref_position: Some(p),
            uwb_position: Some(p),
            est_position: Some(p),
            ..Default::default()
        }
    }

    #[test]
    fn test_partial_update_keeps_absent_fields() {
        let mut store = PersonnelStore::from_config(&[particle_config("p1", None)], StalePolicy::Accept);
        store.update("p1", &positions(Point::new(1.0, 1.0))).unwrap();
        store
            .update(
                "p1",
                &PersonnelUpdate {
                    uwb_position: Some(Point::new(2.0, 2.0)),
                    ref_heading: Some(json!({"start": [0, 0], "end": [1, 0]})),
                    ..Default::default()
                },
            )
            .unwrap();

        let p = store.get("p1").unwrap();
        assert_eq!(p.ref_center(), Some(Point::new(1.0, 1.0)));
        assert_eq!(p.uwb_center(), Some(Point::new(2.0, 2.0)));
        assert_eq!(p.est_center(), Some(Point::new(1.0, 1.0)));
        assert!(p.ref_heading().is_some());
        assert!(p.world_view().is_none());
        assert_eq!(p.radius(), 5.0);
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let mut store = PersonnelStore::from_config(&[particle_config("p1", None)], StalePolicy::Accept);
        assert!(!store.update("ghost", &positions(Point::new(1.0, 1.0))).unwrap());
        assert_eq!(store.get("p1").unwrap().ref_center(), None);
    }

    #[test]
    fn test_stale_policy_accept_is_last_write_wins() {
        let mut store = PersonnelStore::from_config(&[particle_config("p1", None)], StalePolicy::Accept);
        let mut newer = positions(Point::new(5.0, 5.0));
        newer.timestamp = Some(20.0);
        let mut older = positions(Point::new(1.0, 1.0));
        older.timestamp = Some(10.0);
        store.update("p1", &newer).unwrap();
        store.update("p1", &older).unwrap();
        assert_eq!(store.get("p1").unwrap().ref_center(), Some(Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_stale_policy_reject() {
        let mut store = PersonnelStore::from_config(&[particle_config("p1", None)], StalePolicy::Reject);
        let mut newer = positions(Point::new(5.0, 5.0));
        newer.timestamp = Some(20.0);
        let mut older = positions(Point::new(1.0, 1.0));
        older.timestamp = Some(10.0);
        store.update("p1", &newer).unwrap();
        let err = store.update("p1", &older).unwrap_err();
        assert!(matches!(err, VizError::StaleTelemetry { .. }));
        assert_eq!(store.get("p1").unwrap().ref_center(), Some(Point::new(5.0, 5.0)));

        // Equal timestamps are replays, not stale
        newer.ref_position = Some(Point::new(6.0, 6.0));
        assert!(store.update("p1", &newer).unwrap());
    }

    #[test]
    fn test_not_drawn_until_positioned() {
        let store = PersonnelStore::from_config(&[particle_config("p1", None)], StalePolicy::Accept);
        let mut surface = RecordingSurface::new();
        store.draw(&mut surface, &Scaler::new(1.0).unwrap());
        assert!(surface.pending().is_empty());
    }

    #[test]
    fn test_configured_center_draws_immediately() {
        let store = PersonnelStore::from_config(&[particle_config("p1", Some(Point::new(2.0, 3.0)))], StalePolicy::Accept);
        let mut surface = RecordingSurface::new();
        store.draw(&mut surface, &Scaler::new(2.0).unwrap());
        assert_eq!(surface.pending().len(), 3);
        assert!(matches!(surface.pending()[0], DrawCommand::Circle { center, .. } if center == Point::new(4.0, 6.0)));
    }

    #[test]
    fn test_draw_rays_markers_heading() {
        let mut store = PersonnelStore::from_config(&[particle_config("p1", None)], StalePolicy::Accept);
        let mut update = positions(Point::new(1.0, 1.0));
        update.world_view = Some(vec![json!({"contact_point": [4, 1]}), json!({"contact_point": [1, 4]})]);
        update.ref_heading = Some(json!({"start": [0, 0], "end": [0, 5]}));
        store.update("p1", &update).unwrap();

        let mut surface = RecordingSurface::new();
        store.draw(&mut surface, &Scaler::new(10.0).unwrap());
        let cmds = surface.pending();
        assert_eq!(cmds.len(), 2 + 3 + 1);
        assert_eq!(
            cmds[0],
            DrawCommand::Line {
                start: Point::new(10.0, 10.0),
                end: Point::new(40.0, 10.0),
                color: Color::rgb(100, 100, 100),
                width: 1.0,
            }
        );
        assert!(matches!(cmds[2], DrawCommand::Circle { color, .. } if color == Color::rgb(255, 0, 0)));
        match cmds[5] {
            DrawCommand::Line { start, end, width, .. } => {
                assert_eq!(start, Point::new(10.0, 10.0));
                assert!((end.x - 10.0).abs() < 1e-9);
                assert!((end.y - 30.0).abs() < 1e-9);
                assert_eq!(width, 3.0);
            }
            ref other => panic!("expected heading line, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_contact_point_skips_only_that_person() {
        let configs = [particle_config("bad", None), particle_config("good", None)];
        let mut store = PersonnelStore::from_config(&configs, StalePolicy::Accept);
        let mut bad = positions(Point::new(1.0, 1.0));
        bad.world_view = Some(vec![json!({"contact_point": [1, 2, 3]})]);
        store.update("bad", &bad).unwrap();
        store.update("good", &positions(Point::new(2.0, 2.0))).unwrap();

        let mut surface = RecordingSurface::new();
        store.draw(&mut surface, &Scaler::new(1.0).unwrap());
        assert_eq!(surface.pending().len(), 3);
        assert!(matches!(surface.pending()[0], DrawCommand::Circle { center, .. } if center == Point::new(2.0, 2.0)));
    }
}
