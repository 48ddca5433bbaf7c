//! Frame loop and reconfiguration
//!
//! Everything that mutates or reads entity state runs on the task driving
//! [`Visualizer::run`]. Each tick:
//! 1. drain display events, stopping at once on quit
//! 2. tear down and rebuild when a reload was requested
//! 3. apply queued telemetry
//! 4. draw every workspace and present the frame
//! 5. wait for the next tick, applying telemetry as it arrives

use crate::config::SceneConfig;
use crate::surface::{DrawSurface, UiEvent};
use crate::transport::MemoryBus;
use crate::workspace::{Inbound, Workspace};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the shared inbox between subscription tasks and the frame loop
pub const MESSAGE_CHANNEL_CAPACITY: usize = 4096;

/// Why a generation of workspaces stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Reload,
    Quit,
}

/// Workspaces built from one read of the configuration.
pub struct Generation {
    workspaces: Vec<Workspace>,
    inbox: mpsc::Receiver<Inbound>,
    inbox_open: bool,
    interval: Duration,
}

impl Generation {
    /// Build and connect every configured workspace.
    pub async fn build(config: &SceneConfig, bus: Option<&MemoryBus>) -> Result<Self> {
        let mut workspaces = config
            .scene
            .workspaces
            .iter()
            .map(Workspace::from_config)
            .collect::<Result<Vec<_>>>()?;

        let (sender, inbox) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        for (index, workspace) in workspaces.iter_mut().enumerate() {
            workspace.connect(index, sender.clone(), bus).await?;
        }
        drop(sender);
        for workspace in &mut workspaces {
            workspace.start();
        }

        // Several workspaces share one loop; the most demanding interval wins
        let interval = workspaces
            .iter()
            .map(Workspace::interval)
            .min()
            .unwrap_or(Duration::ZERO);

        Ok(Self {
            workspaces,
            inbox,
            inbox_open: true,
            interval,
        })
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Render-space size that fits every workspace.
    pub fn canvas_size(&self) -> [f64; 2] {
        self.workspaces
            .iter()
            .map(Workspace::canvas_size)
            .fold([0.0_f64, 0.0_f64], |[w, h], [ww, wh]| [w.max(ww), h.max(wh)])
    }

    fn dispatch(&mut self, inbound: Inbound) {
        let Inbound {
            workspace,
            router,
            message,
        } = inbound;
        match self.workspaces.get_mut(workspace) {
            Some(target) => {
                target.handle_message(&router, message);
            }
            None => warn!(workspace, binding = %message.binding, "Dropping message for unknown workspace"),
        }
    }

    /// Apply everything already queued without waiting.
    pub fn drain_inbox(&mut self) -> usize {
        let mut applied = 0;
        while self.inbox_open {
            match self.inbox.try_recv() {
                Ok(inbound) => {
                    self.dispatch(inbound);
                    applied += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("All subscriptions finished");
                    self.inbox_open = false;
                }
            }
        }
        applied
    }

    /// Wait out one frame interval, applying messages as they arrive.
    async fn wait_for_tick(&mut self) {
        if self.interval.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        let deadline = tokio::time::sleep_until(Instant::now() + self.interval);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return,
                inbound = self.inbox.recv(), if self.inbox_open => match inbound {
                    Some(inbound) => self.dispatch(inbound),
                    None => {
                        debug!("All subscriptions finished");
                        self.inbox_open = false;
                    }
                },
            }
        }
    }

    fn draw(&self, surface: &mut dyn DrawSurface) {
        for workspace in &self.workspaces {
            workspace.draw(surface);
        }
    }

    pub fn teardown(&mut self) {
        for workspace in &mut self.workspaces {
            workspace.teardown();
        }
        self.inbox.close();
    }
}

/// Owns the display surface and the current generation of workspaces.
pub struct Visualizer<S: DrawSurface> {
    config_path: PathBuf,
    surface: S,
    reload: Arc<AtomicBool>,
    bus: Option<MemoryBus>,
    frame_limit: Option<u64>,
    frames: u64,
}

impl<S: DrawSurface> Visualizer<S> {
    pub fn new(config_path: impl AsRef<Path>, surface: S) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            surface,
            reload: Arc::new(AtomicBool::new(false)),
            bus: None,
            frame_limit: None,
            frames: 0,
        }
    }

    /// Attach an in-process bus for subscribers using the memory transport.
    pub fn with_bus(mut self, bus: MemoryBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Stop after presenting this many frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Flag that requests a teardown and rebuild at the next tick.
    pub fn reload_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reload)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Run until quit. Reloads rebuild every workspace from the
    /// configuration file; a configuration that no longer loads is fatal.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let config = SceneConfig::load_from_path(&self.config_path)?;
            let mut generation = Generation::build(&config, self.bus.as_ref()).await?;
            let [width, height] = generation.canvas_size();
            self.surface.set_canvas(width, height);
            info!(
                config = %self.config_path.display(),
                workspaces = generation.workspaces().len(),
                interval_ms = generation.interval().as_millis() as u64,
                "Visualization running"
            );

            let exit = self.run_generation(&mut generation).await?;
            match exit {
                LoopExit::Reload => {
                    generation.teardown();
                    info!("Reloading configuration");
                }
                LoopExit::Quit => {
                    info!(frames = self.frames, "Quit requested");
                    return Ok(());
                }
            }
        }
    }

    async fn run_generation(&mut self, generation: &mut Generation) -> Result<LoopExit> {
        loop {
            if self.surface.poll_events().contains(&UiEvent::Quit) {
                return Ok(LoopExit::Quit);
            }
            if self.reload.swap(false, Ordering::SeqCst) {
                return Ok(LoopExit::Reload);
            }

            generation.drain_inbox();
            generation.draw(&mut self.surface);
            self.surface.present()?;
            self.frames += 1;

            if self.frame_limit.is_some_and(|limit| self.frames >= limit) {
                return Ok(LoopExit::Quit);
            }
            generation.wait_for_tick().await;
        }
    }
}
