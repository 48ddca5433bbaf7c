//! Workspace aggregate
//!
//! A workspace owns its layout, both entity stores and the subscription
//! tasks feeding it. Subscription tasks never touch the stores: they forward
//! raw messages into the frame loop's inbox, waiting while it is full, and
//! the frame loop calls
//! [`Workspace::handle_message`] between draw passes.

use crate::config::{SubscriberConfig, WorkspaceConfig};
use crate::layout::Layout;
use crate::personnel::PersonnelStore;
use crate::robot::RobotStore;
use crate::router::{RouteRules, TelemetryRouter, TelemetryUpdate};
use crate::scaling::Scaler;
use crate::surface::DrawSurface;
use crate::transport::{self, MemoryBus, RawMessage, TelemetrySource};
use crate::{Result, VizError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    /// Entities and layout built, nothing subscribed.
    Constructed,
    /// Every declared subscription connected.
    Subscribed,
    /// Accepting messages and draw calls.
    Running,
    /// Subscriptions released. Late messages are dropped.
    TornDown,
}

/// A message on its way from a subscription task to the frame loop.
#[derive(Debug)]
pub struct Inbound {
    /// Position of the target workspace in the current generation.
    pub workspace: usize,
    pub router: TelemetryRouter,
    pub message: RawMessage,
}

/// Result of handing one message to a workspace.
#[derive(Debug)]
pub enum MessageOutcome {
    /// State of one entity changed.
    Applied,
    /// Valid message for an entity this workspace does not configure.
    Ignored,
    /// The message was invalid; nothing changed.
    Rejected(VizError),
    /// The workspace was not accepting messages.
    Dropped,
}

pub struct Workspace {
    id: String,
    scaler: Scaler,
    dimensions: [f64; 2],
    interval: Duration,
    layout: Layout,
    robots: RobotStore,
    personnel: PersonnelStore,
    subscribers: Vec<SubscriberConfig>,
    rules: Arc<RouteRules>,
    tasks: Vec<JoinHandle<()>>,
    state: WorkspaceState,
}

impl Workspace {
    pub fn from_config(config: &WorkspaceConfig) -> Result<Self> {
        config.validate()?;
        let workspace = Self {
            id: config.id.clone(),
            scaler: Scaler::new(config.attributes.scaling)?,
            dimensions: config.render.dimensions,
            interval: config.interval(),
            layout: Layout::from_config(config)?,
            robots: RobotStore::from_config(&config.robots),
            personnel: PersonnelStore::from_config(&config.particles, config.attributes.stale_policy),
            subscribers: config.protocol.clone(),
            rules: Arc::new(RouteRules::new()?),
            tasks: Vec::new(),
            state: WorkspaceState::Constructed,
        };
        info!(
            workspace = %workspace.id,
            robots = workspace.robots.len(),
            personnel = workspace.personnel.len(),
            obstacles = workspace.layout.obstacles().len(),
            render = %config.render.render_type,
            "Workspace constructed"
        );
        Ok(workspace)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Logical dimensions scaled into render space.
    pub fn canvas_size(&self) -> [f64; 2] {
        let [width, height] = self.dimensions;
        [self.scaler.scale_scalar(width), self.scaler.scale_scalar(height)]
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn robots(&self) -> &RobotStore {
        &self.robots
    }

    pub fn personnel(&self) -> &PersonnelStore {
        &self.personnel
    }

    /// Connect every declared subscription and start forwarding its
    /// messages into `sink`, tagged with `index`.
    ///
    /// Any connect failure aborts the subscriptions started so far and is
    /// returned to the caller as fatal.
    pub async fn connect(&mut self, index: usize, sink: mpsc::Sender<Inbound>, bus: Option<&MemoryBus>) -> Result<()> {
        if self.state != WorkspaceState::Constructed {
            return Err(VizError::Config(format!(
                "workspace '{}' cannot subscribe in state {:?}",
                self.id, self.state
            )));
        }
        for subscriber in &self.subscribers {
            let source = match transport::connect(subscriber, bus).await {
                Ok(source) => source,
                Err(e) => {
                    for task in self.tasks.drain(..) {
                        task.abort();
                    }
                    return Err(e);
                }
            };
            let name = subscriber.display_name();
            info!(workspace = %self.id, subscriber = %name, kind = ?subscriber.kind, "Subscription connected");
            self.tasks.push(tokio::spawn(forward(
                source,
                index,
                TelemetryRouter::new(subscriber.kind, Arc::clone(&self.rules)),
                sink.clone(),
                name,
            )));
        }
        self.state = WorkspaceState::Subscribed;
        Ok(())
    }

    /// Open the workspace for messages and draw calls.
    pub fn start(&mut self) {
        if self.state == WorkspaceState::Subscribed {
            self.state = WorkspaceState::Running;
            info!(workspace = %self.id, "Workspace running");
        }
    }

    /// Route one message and apply it to the matching store.
    ///
    /// Invalid messages are logged here and reported back; they never
    /// change state.
    pub fn handle_message(&mut self, router: &TelemetryRouter, message: RawMessage) -> MessageOutcome {
        if self.state != WorkspaceState::Running {
            warn!(
                workspace = %self.id,
                state = ?self.state,
                binding = %message.binding,
                "Dropping message for workspace that is not running"
            );
            return MessageOutcome::Dropped;
        }

        let RawMessage { exchange, binding, body } = message;
        let applied = router
            .route(&exchange, &binding, body)
            .and_then(|update| match update {
                TelemetryUpdate::Robot { id, update } => Ok(self.robots.update(&id, &update)),
                TelemetryUpdate::Personnel { id, update } => self.personnel.update(&id, &update),
            });

        match applied {
            Ok(true) => MessageOutcome::Applied,
            Ok(false) => MessageOutcome::Ignored,
            Err(e) => {
                warn!(workspace = %self.id, exchange = %exchange, binding = %binding, error = %e, "Rejected telemetry");
                MessageOutcome::Rejected(e)
            }
        }
    }

    /// Render the current snapshot: layout, then robots, then personnel.
    pub fn draw(&self, surface: &mut dyn DrawSurface) {
        if self.state == WorkspaceState::TornDown {
            return;
        }
        self.layout.draw(surface, &self.scaler);
        self.robots.draw(surface, &self.scaler);
        self.personnel.draw(surface, &self.scaler);
    }

    /// Release every subscription. The workspace accepts nothing afterwards.
    pub fn teardown(&mut self) {
        if self.state == WorkspaceState::TornDown {
            return;
        }
        self.abort_tasks();
        self.state = WorkspaceState::TornDown;
        info!(workspace = %self.id, "Workspace torn down");
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn forward(
    mut source: Box<dyn TelemetrySource>,
    workspace: usize,
    router: TelemetryRouter,
    sink: mpsc::Sender<Inbound>,
    name: String,
) {
    while let Some(message) = source.next_message().await {
        let inbound = Inbound {
            workspace,
            router: router.clone(),
            message,
        };
        // A full inbox holds this source back rather than losing the newest sample
        if sink.send(inbound).await.is_err() {
            debug!(subscriber = %name, "Inbox closed, stopping subscription");
            break;
        }
    }
    debug!(subscriber = %name, "Subscription finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use crate::geometry::Point;
    use crate::robot::RobotPose;
    use crate::surface::{DrawCommand, RecordingSurface};
    use serde_json::json;

    const SCENE: &str = r#"
scene:
  workspaces:
    - id: cell
      render: { dimensions: [20, 20], color: [255, 255, 255], type: "2d" }
      attributes: { scaling: 2.0, stale_policy: reject }
      robots:
        - id: arm1
          base: [0, 0]
          render: { color: [0, 0, 255], joint_width: 4, base_width: 6, base_shoulder: 3, shoulder_elbow: 2 }
      particles:
        - id: w1
          render:
            ref_pos_color: [0, 255, 0]
            uwb_pos_color: [255, 0, 0]
            est_pos_color: [0, 0, 255]
            ray_cast_color: [100, 100, 100]
            size: 4
      protocol:
        - kind: binding_key
          exchange: telemetry
          bindings: ["telemetry.#"]
          transport: { type: memory }
"#;

    fn workspace() -> Workspace {
        let config = SceneConfig::load_from_str(SCENE).unwrap();
        Workspace::from_config(&config.scene.workspaces[0]).unwrap()
    }

    fn running() -> Workspace {
        let mut ws = workspace();
        ws.state = WorkspaceState::Running;
        ws
    }

    fn router() -> TelemetryRouter {
        TelemetryRouter::new(
            crate::config::SubscriberKind::BindingKey,
            Arc::new(RouteRules::new().unwrap()),
        )
    }

    fn arm1_message() -> RawMessage {
        RawMessage::new(
            "telemetry",
            "telemetry.robot.arm1",
            json!({"id": "arm1", "base": [1, 1], "shoulder": [2, 2], "elbow": [3, 3], "wrist": [4, 4]}),
        )
    }

    #[test]
    fn test_canvas_size_is_scaled_dimensions() {
        assert_eq!(workspace().canvas_size(), [40.0, 40.0]);
    }

    #[test]
    fn test_end_to_end_robot_update_and_draw() {
        let mut ws = running();
        assert!(matches!(ws.handle_message(&router(), arm1_message()), MessageOutcome::Applied));

        assert_eq!(
            ws.robots().get("arm1").unwrap().pose(),
            &RobotPose {
                base: Point::new(1.0, 1.0),
                shoulder: Point::new(2.0, 2.0),
                elbow: Point::new(3.0, 3.0),
                wrist: Point::new(4.0, 4.0),
            }
        );

        let mut surface = RecordingSurface::new();
        ws.draw(&mut surface);
        let lines: Vec<(Point, Point)> = surface
            .pending()
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::Line { start, end, .. } => Some((*start, *end)),
                _ => None,
            })
            .collect();
        assert_eq!(
            lines,
            vec![
                (Point::new(2.0, 2.0), Point::new(4.0, 4.0)),
                (Point::new(4.0, 4.0), Point::new(6.0, 6.0)),
                (Point::new(6.0, 6.0), Point::new(8.0, 8.0)),
            ]
        );
        assert!(surface
            .pending()
            .iter()
            .any(|cmd| matches!(cmd, DrawCommand::Circle { center, .. } if *center == Point::new(8.0, 8.0))));
    }

    #[test]
    fn test_ghost_and_mismatch_leave_state_alone() {
        let mut ws = running();
        let before = *ws.robots().get("arm1").unwrap().pose();

        let ghost = RawMessage::new(
            "telemetry",
            "telemetry.robot.ghost",
            json!({"id": "ghost", "base": [9, 9], "shoulder": [9, 9], "elbow": [9, 9], "wrist": [9, 9]}),
        );
        assert!(matches!(ws.handle_message(&router(), ghost), MessageOutcome::Ignored));

        let crossed = RawMessage::new(
            "telemetry",
            "telemetry.robot.arm1",
            json!({"id": "R3", "base": [9, 9], "shoulder": [9, 9], "elbow": [9, 9], "wrist": [9, 9]}),
        );
        assert!(matches!(
            ws.handle_message(&router(), crossed),
            MessageOutcome::Rejected(VizError::IdentityMismatch { .. })
        ));
        assert_eq!(*ws.robots().get("arm1").unwrap().pose(), before);
    }

    #[test]
    fn test_personnel_without_timestamp_rejected() {
        let mut ws = running();
        let message = RawMessage::new(
            "telemetry",
            "telemetry.pls.w1",
            json!({
                "id": "w1",
                "x_ref_pos": 1, "y_ref_pos": 1, "z_ref_pos": 0,
                "x_uwb_pos": 1, "y_uwb_pos": 1, "z_uwb_pos": 0
            }),
        );
        assert!(matches!(ws.handle_message(&router(), message), MessageOutcome::Rejected(_)));
        assert_eq!(ws.personnel().get("w1").unwrap().ref_center(), None);
    }

    #[test]
    fn test_stale_personnel_rejected() {
        let mut ws = running();
        let at = |ts: f64, x: f64| {
            RawMessage::new(
                "telemetry",
                "telemetry.pls.w1",
                json!({
                    "id": "w1",
                    "x_ref_pos": x, "y_ref_pos": 1, "z_ref_pos": 0,
                    "x_uwb_pos": x, "y_uwb_pos": 1, "z_uwb_pos": 0,
                    "timestamp": ts
                }),
            )
        };
        assert!(matches!(ws.handle_message(&router(), at(10.0, 1.0)), MessageOutcome::Applied));
        assert!(matches!(
            ws.handle_message(&router(), at(9.0, 5.0)),
            MessageOutcome::Rejected(VizError::StaleTelemetry { .. })
        ));
        assert_eq!(ws.personnel().get("w1").unwrap().ref_center(), Some(Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_messages_dropped_unless_running() {
        let mut ws = workspace();
        assert!(matches!(ws.handle_message(&router(), arm1_message()), MessageOutcome::Dropped));

        ws.state = WorkspaceState::Running;
        ws.teardown();
        assert_eq!(ws.state(), WorkspaceState::TornDown);
        assert!(matches!(ws.handle_message(&router(), arm1_message()), MessageOutcome::Dropped));

        let mut surface = RecordingSurface::new();
        ws.draw(&mut surface);
        assert!(surface.pending().is_empty());
    }

    #[tokio::test]
    async fn test_connect_forwards_bus_messages() {
        let bus = MemoryBus::default();
        let (tx, mut rx) = mpsc::channel(16);
        let mut ws = workspace();
        ws.connect(3, tx, Some(&bus)).await.unwrap();
        assert_eq!(ws.state(), WorkspaceState::Subscribed);
        ws.start();
        assert_eq!(ws.state(), WorkspaceState::Running);

        bus.publish("telemetry", "telemetry.robot.arm1", json!({"id": "arm1"}));
        bus.publish("elsewhere", "telemetry.robot.arm1", json!({"id": "arm1"}));
        let inbound = rx.recv().await.unwrap();
        assert_eq!(inbound.workspace, 3);
        assert_eq!(inbound.message.exchange, "telemetry");

        ws.teardown();
        assert_eq!(ws.state(), WorkspaceState::TornDown);
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let (tx, _rx) = mpsc::channel(1);
        let mut ws = workspace();
        let err = ws.connect(0, tx, None).await.unwrap_err();
        assert_eq!(err.class(), crate::ErrorClass::Fatal);
        assert_eq!(ws.state(), WorkspaceState::Constructed);
    }
}
