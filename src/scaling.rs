//! Coordinate scaling from logical workspace units to render space
//!
//! The factor is carried by value and handed to every draw call, so each
//! workspace renders with the scaling it was configured with.

use crate::{geometry::Point, Result, VizError};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    factor: f64,
}

impl Scaler {
    /// Create a scaler. The factor must be positive and finite.
    pub fn new(factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(VizError::Config(format!(
                "scaling must be a positive number, got {}",
                factor
            )));
        }
        Ok(Self { factor })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn scale_scalar(&self, value: f64) -> f64 {
        value * self.factor
    }

    pub fn scale_point(&self, point: Point) -> Point {
        Point::new(point.x * self.factor, point.y * self.factor)
    }

    /// Scale untyped telemetry data: a number, or a 2-element numeric array.
    ///
    /// Any other shape fails with [`VizError::InvalidScaleInput`].
    pub fn scale_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Number(n) => {
                let v = n
                    .as_f64()
                    .ok_or_else(|| VizError::InvalidScaleInput(value.to_string()))?;
                Ok(Value::from(self.scale_scalar(v)))
            }
            Value::Array(items) if items.len() == 2 => {
                let mut scaled = Vec::with_capacity(2);
                for item in items {
                    let v = item
                        .as_f64()
                        .ok_or_else(|| VizError::InvalidScaleInput(value.to_string()))?;
                    scaled.push(Value::from(self.scale_scalar(v)));
                }
                Ok(Value::Array(scaled))
            }
            other => Err(VizError::InvalidScaleInput(other.to_string())),
        }
    }

    /// Scale a telemetry coordinate and return it as a typed point.
    pub fn scale_coordinate(&self, value: &Value) -> Result<Point> {
        let scaled = self.scale_value(value)?;
        Point::from_json(&scaled).ok_or_else(|| VizError::InvalidScaleInput(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_and_pair() {
        let scaler = Scaler::new(2.0).unwrap();
        assert_eq!(scaler.scale_value(&json!(5)).unwrap(), json!(10.0));
        assert_eq!(scaler.scale_value(&json!([3, 4])).unwrap(), json!([6.0, 8.0]));
        assert_eq!(scaler.scale_point(Point::new(3.0, 4.0)), Point::new(6.0, 8.0));
    }

    #[test]
    fn test_rejects_other_shapes() {
        let scaler = Scaler::new(2.0).unwrap();
        for bad in [json!("x"), json!([1, 2, 3]), json!([1, "y"]), json!(null), json!({"x": 1})] {
            let err = scaler.scale_value(&bad).unwrap_err();
            assert!(matches!(err, VizError::InvalidScaleInput(_)), "{bad} should not scale");
        }
    }

    #[test]
    fn test_factor_must_be_positive() {
        assert!(Scaler::new(0.0).is_err());
        assert!(Scaler::new(-1.0).is_err());
        assert!(Scaler::new(f64::NAN).is_err());
        assert!(Scaler::new(0.5).is_ok());
    }

    #[test]
    fn test_scale_coordinate() {
        let scaler = Scaler::new(10.0).unwrap();
        assert_eq!(scaler.scale_coordinate(&json!([0.5, 1.5])).unwrap(), Point::new(5.0, 15.0));
        assert!(scaler.scale_coordinate(&json!(3)).is_err());
    }
}
