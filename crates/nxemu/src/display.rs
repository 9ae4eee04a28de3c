//! Windowed frontend.
//!
//! Drives the session at the display refresh rate using winit for window
//! management and softbuffer for software presentation. Keyboard input is
//! mapped onto the emulated controller; each tick polls a snapshot, runs
//! one designated-core batch, and feeds the resulting command buffers and
//! audio frames into the translator and the playback queue.

use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::{Duration, Instant};

use nxemu_hw::specs::display;
use softbuffer::{Context, Surface};
use tracing::{info, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::Window;

use crate::audio::AudioQueue;
use crate::gpu::{CommandTranslator, Framebuffer, GpuError, OffscreenTarget, PresentTarget};
use crate::input::InputSampler;
use crate::scheduler::{CoreEvent, CoreState};
use crate::session::EmulatorSession;

/// Presents frames into a softbuffer window surface.
struct SoftbufferTarget {
    surface: Surface<Rc<Window>, Rc<Window>>,
}

impl SoftbufferTarget {
    fn new(window: Rc<Window>) -> Result<Self, GpuError> {
        let context = Context::new(window.clone())
            .map_err(|e| GpuError::UnsupportedDevice(e.to_string()))?;
        let mut surface = Surface::new(&context, window)
            .map_err(|e| GpuError::UnsupportedDevice(e.to_string()))?;
        surface
            .resize(
                NonZeroU32::new(display::WIDTH).unwrap(),
                NonZeroU32::new(display::HEIGHT).unwrap(),
            )
            .map_err(|e| GpuError::UnsupportedDevice(e.to_string()))?;
        Ok(Self { surface })
    }
}

impl PresentTarget for SoftbufferTarget {
    fn present(&mut self, fb: &Framebuffer) -> Result<(), GpuError> {
        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| GpuError::Present(e.to_string()))?;
        let len = buffer.len().min(fb.pixels.len());
        buffer[..len].copy_from_slice(&fb.pixels[..len]);
        buffer.present().map_err(|e| GpuError::Present(e.to_string()))
    }
}

/// Windowed emulator application.
pub struct EmulatorApp {
    session: Option<EmulatorSession>,
    translator: Option<CommandTranslator>,
    audio: AudioQueue,
    input: InputSampler,
    window: Option<Rc<Window>>,
    next_tick: Instant,
}

impl EmulatorApp {
    pub fn new(session: EmulatorSession) -> Self {
        Self {
            session: Some(session),
            translator: None,
            audio: AudioQueue::default(),
            input: InputSampler::new(),
            window: None,
            next_tick: Instant::now(),
        }
    }

    fn tick_interval() -> Duration {
        Duration::from_secs(1) / display::REFRESH_RATE_HZ
    }

    fn handle_key(&mut self, code: KeyCode, pressed: bool) {
        // Any mapped key counts as a connected controller.
        self.input.set_connected(true);
        let raw = self.input.raw_mut();
        let axis = if pressed { 1.0 } else { 0.0 };
        match code {
            KeyCode::KeyX => raw.a = pressed,
            KeyCode::KeyZ => raw.b = pressed,
            KeyCode::KeyS => raw.x = pressed,
            KeyCode::KeyA => raw.y = pressed,
            KeyCode::KeyQ => raw.l = pressed,
            KeyCode::KeyW => raw.r = pressed,
            KeyCode::Digit1 => raw.zl = pressed,
            KeyCode::Digit2 => raw.zr = pressed,
            KeyCode::Enter => raw.plus = pressed,
            KeyCode::Backspace => raw.minus = pressed,
            KeyCode::Escape => raw.home = pressed,
            KeyCode::KeyC => raw.capture = pressed,
            KeyCode::ArrowLeft => raw.left_stick.x = -axis,
            KeyCode::ArrowRight => raw.left_stick.x = axis,
            KeyCode::ArrowUp => raw.left_stick.y = axis,
            KeyCode::ArrowDown => raw.left_stick.y = -axis,
            _ => {}
        }
    }

    /// Run one outer tick and route its events.
    fn tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.run_cycle(&self.input.poll()).is_err() {
            return;
        }

        while let Some(event) = session.poll_event() {
            match event {
                CoreEvent::Commands { buffer, .. } => {
                    if let Some(translator) = self.translator.as_mut()
                        && let Err(e) = translator.translate_and_submit(&buffer)
                    {
                        warn!(%e, "frame dropped");
                    }
                }
                CoreEvent::Audio { frame, .. } => self.audio.enqueue(frame),
                CoreEvent::Fault { core, fault } => warn!(core, %fault, "core stopped"),
                CoreEvent::Halted { core } => info!(core, "core halted"),
            }
        }
        // Latency is bounded by the queue; playback itself is the host
        // audio device's side of the frontend.
        while self.audio.queued_blocks() > 2 {
            self.audio.dequeue();
        }
    }

    fn all_cores_stopped(&self) -> bool {
        let Some(session) = self.session.as_ref() else {
            return true;
        };
        (0..session.core_count()).all(|core| {
            matches!(
                session.core_state(core),
                Some(CoreState::Halted | CoreState::Faulted)
            )
        })
    }

    fn finish(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut session) = self.session.take() {
            session.log_final_state();
            session.shutdown();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for EmulatorApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = Rc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("nxemu")
                        .with_inner_size(winit::dpi::PhysicalSize::new(
                            display::WIDTH,
                            display::HEIGHT,
                        )),
                )
                .unwrap(),
        );

        // A host without a usable surface keeps emulating headless.
        let target: Box<dyn PresentTarget> = match SoftbufferTarget::new(window.clone()) {
            Ok(target) => Box::new(target),
            Err(e) => {
                warn!(%e, "continuing without graphics output");
                Box::new(OffscreenTarget::default())
            }
        };
        self.translator = Some(CommandTranslator::new(target));
        self.window = Some(window.clone());
        self.next_tick = Instant::now();

        window.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("window closed");
                self.finish(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.handle_key(code, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(translator) = self.translator.as_mut()
                    && let Err(e) = translator.present_current()
                {
                    warn!(%e, "redraw failed");
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_tick {
            self.tick();
            self.next_tick = now + Self::tick_interval();
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }

        if self.all_cores_stopped() {
            info!("all cores stopped");
            self.finish(event_loop);
            return;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }
}

pub fn run(session: EmulatorSession) -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = EmulatorApp::new(session);
    event_loop.run_app(&mut app)?;
    Ok(())
}
