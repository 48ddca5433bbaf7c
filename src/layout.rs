//! Static workspace layout: background and obstacles

use crate::config::{ObstacleShapeKind, WorkspaceConfig};
use crate::geometry::{Color, Point};
use crate::scaling::Scaler;
use crate::surface::DrawSurface;
use crate::{Result, VizError};

#[derive(Debug, Clone, PartialEq)]
pub enum ObstacleShape {
    Line { start: Point, end: Point },
    Polygon(Vec<Point>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    shape: ObstacleShape,
    color: Color,
    width: f64,
}

impl Obstacle {
    pub fn line(start: Point, end: Point, color: Color, width: f64) -> Self {
        Self {
            shape: ObstacleShape::Line { start, end },
            color,
            width,
        }
    }

    pub fn polygon(points: Vec<Point>, color: Color, width: f64) -> Result<Self> {
        if points.len() <= 2 {
            return Err(VizError::Config(format!(
                "polygon obstacle needs more than 2 points, got {}",
                points.len()
            )));
        }
        Ok(Self {
            shape: ObstacleShape::Polygon(points),
            color,
            width,
        })
    }

    pub fn shape(&self) -> &ObstacleShape {
        &self.shape
    }

    fn draw(&self, surface: &mut dyn DrawSurface, scaler: &Scaler) {
        match &self.shape {
            ObstacleShape::Line { start, end } => surface.draw_line(
                scaler.scale_point(*start),
                scaler.scale_point(*end),
                self.color,
                self.width,
            ),
            ObstacleShape::Polygon(points) => {
                let scaled: Vec<Point> = points.iter().map(|p| scaler.scale_point(*p)).collect();
                surface.draw_polygon(&scaled, self.color, self.width);
            }
        }
    }
}

/// Background color plus obstacles in configuration order.
#[derive(Debug, Clone)]
pub struct Layout {
    background: Color,
    obstacles: Vec<Obstacle>,
}

impl Layout {
    pub fn new(background: Color, obstacles: Vec<Obstacle>) -> Self {
        Self { background, obstacles }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Result<Self> {
        let mut obstacles = Vec::with_capacity(config.obstacles.len());
        for obstacle in &config.obstacles {
            let render = &obstacle.render;
            let built = match render.shape {
                ObstacleShapeKind::Line => match obstacle.points.as_slice() {
                    [start, end] => Obstacle::line(*start, *end, render.color, render.width),
                    points => {
                        return Err(VizError::Config(format!(
                            "line obstacle needs exactly 2 points, got {}",
                            points.len()
                        )))
                    }
                },
                ObstacleShapeKind::Polygon => {
                    Obstacle::polygon(obstacle.points.clone(), render.color, render.width)?
                }
            };
            obstacles.push(built);
        }
        Ok(Self::new(config.render.color, obstacles))
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn draw(&self, surface: &mut dyn DrawSurface, scaler: &Scaler) {
        surface.fill_background(self.background);
        for obstacle in &self.obstacles {
            obstacle.draw(surface, scaler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DrawCommand, RecordingSurface};

    #[test]
    fn test_draw_order_and_scaling() {
        let layout = Layout::new(
            Color::WHITE,
            vec![
                Obstacle::line(Point::new(0.0, 1.0), Point::new(2.0, 1.0), Color::BLACK, 2.0),
                Obstacle::polygon(
                    vec![Point::ORIGIN, Point::new(1.0, 0.0), Point::new(1.0, 1.0)],
                    Color::rgb(9, 9, 9),
                    0.0,
                )
                .unwrap(),
            ],
        );
        let mut surface = RecordingSurface::new();
        layout.draw(&mut surface, &Scaler::new(3.0).unwrap());

        let cmds = surface.pending();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0], DrawCommand::Background { color: Color::WHITE });
        assert_eq!(
            cmds[1],
            DrawCommand::Line {
                start: Point::new(0.0, 3.0),
                end: Point::new(6.0, 3.0),
                color: Color::BLACK,
                width: 2.0,
            }
        );
        match &cmds[2] {
            DrawCommand::Polygon { points, .. } => assert_eq!(points[2], Point::new(3.0, 3.0)),
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_polygon_needs_three_points() {
        assert!(Obstacle::polygon(vec![Point::ORIGIN, Point::new(1.0, 1.0)], Color::BLACK, 1.0).is_err());
    }
}
