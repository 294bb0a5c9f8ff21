// SPDX-License-Identifier: CEPL-1.0
//! Window host: one winit window and a non-blocking message pump.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tracing::{debug, info};
use vkp_core::ShutdownSignal;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

/// Pumps spent waiting for the first `resumed` before giving up.
const MAX_STARTUP_PUMPS: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Events that end the session.
pub fn is_shutdown_event(event: &WindowEvent) -> bool {
    matches!(event, WindowEvent::CloseRequested | WindowEvent::Destroyed)
}

struct Host {
    spec: WindowSpec,
    window: Option<Window>,
    create_error: Option<winit::error::OsError>,
    shutdown: ShutdownSignal,
    processed: usize,
}

impl ApplicationHandler for Host {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.spec.title.clone())
            .with_inner_size(LogicalSize::new(self.spec.width, self.spec.height))
            .with_resizable(false);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let size = window.inner_size();
                info!("window created ({}x{})", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != id) {
            return;
        }
        self.processed += 1;
        if is_shutdown_event(&event) {
            info!("{event:?}");
            self.shutdown.request();
        }
    }
}

pub struct Platform {
    event_loop: EventLoop<()>,
    host: Host,
}

impl Platform {
    /// Opens the window. Returns once it exists.
    pub fn new(spec: WindowSpec, shutdown: ShutdownSignal) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let mut platform = Platform {
            event_loop,
            host: Host {
                spec,
                window: None,
                create_error: None,
                shutdown,
                processed: 0,
            },
        };

        for _ in 0..MAX_STARTUP_PUMPS {
            if let PumpStatus::Exit(code) = platform
                .event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut platform.host)
            {
                return Err(anyhow!("event loop exited ({code}) before the window opened"));
            }
            if let Some(e) = platform.host.create_error.take() {
                return Err(anyhow!("create_window: {e}"));
            }
            if platform.host.window.is_some() {
                return Ok(platform);
            }
        }
        Err(anyhow!("window was not created"))
    }

    /// Drains pending window messages without blocking and returns how many
    /// were handled.
    pub fn pump(&mut self) -> usize {
        let before = self.host.processed;
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.host);
        if let PumpStatus::Exit(code) = status {
            debug!("event loop exit ({code})");
            self.host.shutdown.request();
        }
        self.host.processed - before
    }

    pub fn window(&self) -> Result<&Window> {
        self.host
            .window
            .as_ref()
            .ok_or_else(|| anyhow!("window is gone"))
    }

    pub fn inner_size(&self) -> Result<(u32, u32)> {
        let size = self.window()?.inner_size();
        Ok((size.width.max(1), size.height.max(1)))
    }
}
