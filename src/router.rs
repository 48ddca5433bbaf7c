//! Telemetry routing
//!
//! Turns one `(exchange, binding, payload)` triple into a typed partial
//! update for exactly one entity, or a per-message error. The router never
//! touches a store; the workspace applies what it returns.

use crate::config::SubscriberKind;
use crate::geometry::Point;
use crate::personnel::PersonnelUpdate;
use crate::robot::RobotUpdate;
use crate::{Result, VizError};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

const ROBOT_FIELDS: &[&str] = &["id", "base", "shoulder", "elbow", "wrist"];
const PERSONNEL_FIELDS: &[&str] = &[
    "id",
    "x_ref_pos",
    "y_ref_pos",
    "z_ref_pos",
    "x_uwb_pos",
    "y_uwb_pos",
    "z_uwb_pos",
    "timestamp",
];

const ROBOT_ROUTE: &str = r"(?:^|\.)(?:telemetry\.robot|visual\.rmt\.robot)\.[^.]+";
const PERSONNEL_ROUTE: &str = r"(?:^|\.)(?:telemetry\.pls|visual\.plm\.personnel)\.[^.]+";

/// Message body as delivered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Undecoded bytes, expected to hold JSON.
    Bytes(Vec<u8>),
    /// Already decoded data.
    Structured(Value),
}

impl MessageBody {
    pub fn decode(self) -> Result<Value> {
        match self {
            MessageBody::Bytes(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| VizError::InvalidPayload(e.to_string()))
            }
            MessageBody::Structured(value) => Ok(value),
        }
    }
}

impl From<Vec<u8>> for MessageBody {
    fn from(value: Vec<u8>) -> Self {
        MessageBody::Bytes(value)
    }
}

impl From<Value> for MessageBody {
    fn from(value: Value) -> Self {
        MessageBody::Structured(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Robot,
    Personnel,
}

/// A validated update addressed to one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryUpdate {
    Robot { id: String, update: RobotUpdate },
    Personnel { id: String, update: PersonnelUpdate },
}

impl TelemetryUpdate {
    pub fn entity_id(&self) -> &str {
        match self {
            TelemetryUpdate::Robot { id, .. } | TelemetryUpdate::Personnel { id, .. } => id,
        }
    }
}

/// Binding key prefixes that name an entity kind.
#[derive(Debug)]
pub struct RouteRules {
    robot: Regex,
    personnel: Regex,
}

impl RouteRules {
    pub fn new() -> Result<Self> {
        Ok(Self {
            robot: Regex::new(ROBOT_ROUTE)?,
            personnel: Regex::new(PERSONNEL_ROUTE)?,
        })
    }

    /// Entity kind implied by the binding key's structural prefix.
    pub fn kind_of(&self, binding: &str) -> Option<EntityKind> {
        if self.robot.is_match(binding) {
            Some(EntityKind::Robot)
        } else if self.personnel.is_match(binding) {
            Some(EntityKind::Personnel)
        } else {
            None
        }
    }
}

/// Trailing segment of a dotted binding key.
pub fn binding_entity_id(binding: &str) -> Option<&str> {
    binding.rsplit_once('.').map(|(_, id)| id).filter(|id| !id.is_empty())
}

/// Router for one subscription. The declared kind is resolved once, when
/// the subscription is set up.
#[derive(Debug, Clone)]
pub struct TelemetryRouter {
    kind: SubscriberKind,
    rules: Arc<RouteRules>,
}

impl TelemetryRouter {
    pub fn new(kind: SubscriberKind, rules: Arc<RouteRules>) -> Self {
        Self { kind, rules }
    }

    pub fn kind(&self) -> SubscriberKind {
        self.kind
    }

    pub fn route(&self, exchange: &str, binding: &str, body: MessageBody) -> Result<TelemetryUpdate> {
        let entity = match self.kind {
            SubscriberKind::RobotTelemetry => EntityKind::Robot,
            SubscriberKind::PersonnelTelemetry => EntityKind::Personnel,
            SubscriberKind::BindingKey => self
                .rules
                .kind_of(binding)
                .ok_or_else(|| VizError::UnroutableBinding(format!("{}/{}", exchange, binding)))?,
        };
        // Only a binding that follows the structural scheme for this kind names an entity
        let embedded_id = match self.rules.kind_of(binding) {
            Some(kind) if kind == entity => binding_entity_id(binding),
            _ => None,
        };

        let payload = body.decode()?;
        let fields = payload
            .as_object()
            .ok_or_else(|| VizError::malformed(binding, "payload is not an object"))?;

        let update = match entity {
            EntityKind::Robot => {
                require_fields(binding, fields, ROBOT_FIELDS)?;
                let id = checked_id(binding, fields, embedded_id)?;
                TelemetryUpdate::Robot {
                    id,
                    update: RobotUpdate {
                        base: point_field(binding, fields, "base")?,
                        shoulder: point_field(binding, fields, "shoulder")?,
                        elbow: point_field(binding, fields, "elbow")?,
                        wrist: point_field(binding, fields, "wrist")?,
                    },
                }
            }
            EntityKind::Personnel => {
                require_fields(binding, fields, PERSONNEL_FIELDS)?;
                let id = checked_id(binding, fields, embedded_id)?;
                TelemetryUpdate::Personnel {
                    id,
                    update: personnel_update(binding, fields)?,
                }
            }
        };
        Ok(update)
    }
}

fn require_fields(binding: &str, fields: &Map<String, Value>, required: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !fields.contains_key(*name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(VizError::malformed(binding, format!("missing fields: {}", missing.join(", "))))
    }
}

fn checked_id(binding: &str, fields: &Map<String, Value>, embedded: Option<&str>) -> Result<String> {
    let id = fields
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| VizError::malformed(binding, "id is not a string"))?;
    match embedded {
        Some(expected) if expected != id => Err(VizError::IdentityMismatch {
            binding: binding.to_string(),
            expected: expected.to_string(),
            actual: id.to_string(),
        }),
        _ => Ok(id.to_string()),
    }
}

/// A coordinate field. Absent or null leaves the stored value alone.
fn point_field(binding: &str, fields: &Map<String, Value>, name: &str) -> Result<Option<Point>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Point::from_json(value)
            .map(Some)
            .ok_or_else(|| VizError::malformed(binding, format!("{} is not a coordinate", name))),
    }
}

fn number_field(binding: &str, fields: &Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| VizError::malformed(binding, format!("{} is not a number", name))),
    }
}

/// Split x/y fields projected to a point. Both must be set, or neither.
fn xy_field(binding: &str, fields: &Map<String, Value>, x: &str, y: &str) -> Result<Option<Point>> {
    match (number_field(binding, fields, x)?, number_field(binding, fields, y)?) {
        (Some(x), Some(y)) => Ok(Some(Point::new(x, y))),
        (None, None) => Ok(None),
        _ => Err(VizError::malformed(binding, format!("only one of {}/{} is set", x, y))),
    }
}

fn personnel_update(binding: &str, fields: &Map<String, Value>) -> Result<PersonnelUpdate> {
    let world_view = match fields.get("view") {
        None | Some(Value::Null) => None,
        Some(Value::Array(rays)) => Some(rays.clone()),
        Some(_) => return Err(VizError::malformed(binding, "view is not a list")),
    };
    let ref_heading = match fields.get("ref_heading") {
        None | Some(Value::Null) => None,
        Some(heading @ Value::Object(_)) => Some(heading.clone()),
        Some(_) => return Err(VizError::malformed(binding, "ref_heading is not an object")),
    };
    Ok(PersonnelUpdate {
        ref_position: xy_field(binding, fields, "x_ref_pos", "y_ref_pos")?,
        uwb_position: xy_field(binding, fields, "x_uwb_pos", "y_uwb_pos")?,
        est_position: xy_field(binding, fields, "x_est_pos", "y_est_pos")?,
        radius: number_field(binding, fields, "radius")?,
        world_view,
        ref_heading,
        // Carried for the stale gate; non-numeric stamps are kept out of it
        timestamp: fields.get("timestamp").and_then(Value::as_f64),
    })
}
