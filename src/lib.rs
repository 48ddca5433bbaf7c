//! wsviz - live 2D visualization of robotic workspaces
//!
//! Renders configured workspaces (static obstacles, robot arms, tracked
//! personnel) and keeps them current from pub/sub telemetry. The library
//! never opens a window: frames are issued as scaled primitives against a
//! [`DrawSurface`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wsviz::{JsonSurface, Visualizer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut viz = Visualizer::new("config/workspace.yaml", JsonSurface::stdout());
//!     viz.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Visualizer**: frame loop and reload controller
//! - **Workspace**: layout, robot and personnel stores, subscriptions
//! - **TelemetryRouter**: validates one message into a typed partial update
//! - **TelemetrySource**: stdin/replay lines, in-process bus, Zenoh
//! - **Scaler**: logical to render-space coordinates

pub mod app;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod personnel;
pub mod robot;
pub mod router;
pub mod scaling;
pub mod surface;
pub mod transport;
pub mod workspace;

pub use app::{Generation, LoopExit, Visualizer};
pub use config::{SceneConfig, StalePolicy, SubscriberKind, TransportConfig, WorkspaceConfig};
pub use error::{ErrorClass, Result, VizError};
pub use geometry::{Color, Point};
pub use layout::{Layout, Obstacle, ObstacleShape};
pub use personnel::{PersonnelStore, PersonnelUpdate};
pub use robot::{RobotPose, RobotStore, RobotUpdate};
pub use router::{MessageBody, RouteRules, TelemetryRouter, TelemetryUpdate};
pub use scaling::Scaler;
pub use surface::{DrawCommand, DrawSurface, JsonSurface, NullSurface, RecordingSurface, UiEvent};
pub use transport::{BindingPattern, MemoryBus, RawMessage, SubscriptionFilter, TelemetrySource};
pub use workspace::{MessageOutcome, Workspace, WorkspaceState};
