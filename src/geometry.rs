//! Planar coordinates and colors shared by the layout, the stores and the surface

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A 2D coordinate. Deserializes from `[x, y]` or `[x, y, z]`; z is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Build a point from a JSON array carrying at least x and y.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() < 2 {
            return None;
        }
        Some(Self::new(items[0].as_f64()?, items[1].as_f64()?))
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        [self.x, self.y].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PointVisitor;

        impl<'de> Visitor<'de> for PointVisitor {
            type Value = Point;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a coordinate [x, y] or [x, y, z]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Point, A::Error> {
                let x: f64 = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let y: f64 = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if seq.next_element::<f64>()?.is_some() && seq.next_element::<f64>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(Point::new(x, y))
            }
        }

        deserializer.deserialize_seq(PointVisitor)
    }
}

/// RGB color, configured as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<[u8; 3]> for Color {
    fn from(value: [u8; 3]) -> Self {
        Self::rgb(value[0], value[1], value[2])
    }
}

impl From<Color> for [u8; 3] {
    fn from(value: Color) -> Self {
        [value.r, value.g, value.b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_drops_z() {
        let p: Point = serde_json::from_str("[1.5, 2.0, 9.0]").unwrap();
        assert_eq!(p, Point::new(1.5, 2.0));
    }

    #[test]
    fn test_point_rejects_short_and_long() {
        assert!(serde_json::from_str::<Point>("[1.0]").is_err());
        assert!(serde_json::from_str::<Point>("[1.0, 2.0, 3.0, 4.0]").is_err());
    }

    #[test]
    fn test_point_from_json_value() {
        let v = serde_json::json!([3, 4, 0]);
        assert_eq!(Point::from_json(&v), Some(Point::new(3.0, 4.0)));
        assert_eq!(Point::from_json(&serde_json::json!("x")), None);
        assert_eq!(Point::from_json(&serde_json::json!([1, "y"])), None);
    }

    #[test]
    fn test_color_yaml() {
        let c: Color = serde_yaml::from_str("[10, 20, 30]").unwrap();
        assert_eq!(c, Color::rgb(10, 20, 30));
    }
}
