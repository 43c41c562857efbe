use anyhow::Result;
use std::thread;
use std::time::{Duration, Instant};

use crate::battery::{BatteryState, SharedBattery, ShutdownSignal};
use crate::canvas::{Canvas, FontState};
use crate::config::MonitorConfig;
use crate::device::{Display, InputEvent, InputSource};
use crate::renderer::{self, Scene, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::watcher::ChangeWatcher;

/// Sleeps until the next tick boundary. An overrun tick re-anchors the
/// schedule instead of bursting to catch up.
pub struct FrameClock {
    period: Duration,
    next: Instant,
}

impl FrameClock {
    pub fn new(period: Duration) -> Self {
        Self { period, next: Instant::now() + period }
    }

    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.next = now + self.period;
        }
    }
}

pub struct RenderLoop<D: Display, I: InputSource> {
    config: MonitorConfig,
    display: D,
    input: I,
    font: Option<FontState>,
    shared: SharedBattery,
    shutdown: ShutdownSignal,
    canvas: Canvas,
    max_frames: Option<u64>,
    frames: u64,
    present_failing: bool,
}

impl<D: Display, I: InputSource> RenderLoop<D, I> {
    pub fn new(
        config: MonitorConfig,
        display: D,
        input: I,
        font: Option<FontState>,
        shared: SharedBattery,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        Ok(Self {
            config,
            display,
            input,
            font,
            shared,
            shutdown,
            canvas: Canvas::new(SCREEN_WIDTH, SCREEN_HEIGHT)?,
            max_frames: None,
            frames: 0,
            present_failing: false,
        })
    }

    /// Exit cleanly after `max` frames.
    pub fn with_max_frames(mut self, max: Option<u64>) -> Self {
        self.max_frames = max;
        self
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[cfg(test)]
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Run until exit intent, then stop `watcher` and wait for it.
    pub fn run(&mut self, watcher: &mut ChangeWatcher) -> Result<()> {
        let mut clock = FrameClock::new(self.config.display.frame_period());
        log::info!("Rendering at up to {} fps", self.config.display.fps);

        loop {
            if let Some(reason) = self.exit_intent() {
                log::info!("Exiting: {}", reason);
                break;
            }
            if self.max_frames.is_some_and(|max| self.frames >= max) {
                log::info!("Rendered {} frames, exiting", self.frames);
                break;
            }

            let state = self.shared.snapshot();
            self.draw(&state);
            self.frames += 1;

            clock.wait();
        }

        self.shutdown.trigger();
        if let Err(e) = watcher.stop(self.config.watch.shutdown_timeout()) {
            log::warn!("{}", e);
        }
        Ok(())
    }

    /// Drain all pending input; report why the loop should end, if it should.
    fn exit_intent(&mut self) -> Option<&'static str> {
        let keys = &self.config.keys;
        let mut reason = None;
        for event in self.input.poll_events() {
            let this = match event {
                InputEvent::Quit => Some("terminate requested"),
                InputEvent::KeyDown(code) if code == keys.confirm => Some("confirm key pressed"),
                InputEvent::KeyDown(code) if code == keys.cancel => Some("cancel key pressed"),
                InputEvent::KeyDown(_) => None,
            };
            reason = reason.or(this);
        }
        if reason.is_none() && self.shutdown.is_set() {
            reason = Some("shutdown signalled");
        }
        reason
    }

    fn draw(&mut self, state: &BatteryState) {
        let scene = Scene::from_state(state);
        renderer::render(&mut self.canvas, &scene, &self.config.theme, &self.config.display, self.font.as_ref());

        match self.display.present(&self.canvas) {
            Ok(()) => {
                if self.present_failing {
                    log::info!("Display recovered");
                    self.present_failing = false;
                }
            }
            Err(e) => {
                if !self.present_failing {
                    log::warn!("Failed to present frame: {:#}", e);
                    self.present_failing = true;
                }
            }
        }
    }
}
