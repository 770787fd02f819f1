//! Desktop playback of rod simulation snapshots.
//!
//! Usage: `rodviz [SNAPSHOT_DIR] [--grouping FILE] [--config FILE] [--record DIR]`
//!
//! Without a snapshot directory a short synthetic run is played. With
//! `--record`, every displayed frame is written to `DIR` as a numbered PNG.
//!
//! Controls:
//! - Space/P: Toggle playback
//! - Left/Right: Step one frame (Shift: ten frames)
//! - Home/End: First/last built frame
//! - [/]: Decrease/increase playback speed
//! - Middle-drag: Scrub through built frames
//! - X/Y/Z: Toggle axes
//! - 1/2/3: Turntable, arcball, fly camera (Tab cycles)
//! - Left-drag: Orbit (turntable, arcball)
//! - WASD/E/Q + right-drag: Move and look (fly)
//! - Scroll wheel: Zoom
//! - C: Cycle tube color override
//! - Escape: Quit
//!
//! Gamepad Controls:
//! - A/Start: Toggle playback
//! - B/Back: Back to first frame
//! - DPad Left/Right: Step one frame
//! - LT/RT: Decrease/increase playback speed
//! - Y: Reset camera
//! - Sticks: Move and look

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use gilrs::{Axis, Button, Event as GilrsEvent, Gilrs};
use glam::Vec3;
use rodviz_core::{
    AxisDirection, AxisStyle, CameraMode, Color, FrameMeshBundle, FrameProducer, GroupSpec,
    GroupingConfig, MeshBuilder, ObjectKind, PlaybackController, ProducerEvent, ProducerHandle,
    RodSystem, SceneState, SnapshotRecorder, SnapshotStore, Viewer, ViewerConfig,
    VisualizationDataset,
};
use rodviz_wgpu::{Camera, FrameCapture, Renderer, ViewerError};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};
use winit::window::{Window, WindowId};

const DEADZONE: f32 = 0.15;
const DEMO_STEPS: u64 = 600;

fn apply_deadzone(value: f32) -> f32 {
    if value.abs() < DEADZONE {
        0.0
    } else {
        (value - value.signum() * DEADZONE) / (1.0 - DEADZONE)
    }
}

#[derive(Debug, Default)]
struct Args {
    snapshots: Option<PathBuf>,
    grouping: Option<PathBuf>,
    config: Option<PathBuf>,
    record: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--grouping" => args.grouping = iter.next().map(PathBuf::from),
                "--config" => args.config = iter.next().map(PathBuf::from),
                "--record" => args.record = iter.next().map(PathBuf::from),
                other if other.starts_with("--") => {
                    tracing::warn!(flag = other, "ignoring unknown flag");
                }
                _ => args.snapshots = Some(PathBuf::from(arg)),
            }
        }
        args
    }
}

/// Synthetic rod for the demo run: a wobbling helix or a breathing ring.
struct DemoRod {
    points: Vec<Vec3>,
    radii: Vec<f32>,
}

impl DemoRod {
    fn helix(t: f32) -> Self {
        let n = 48;
        let points = (0..n)
            .map(|i| {
                let s = i as f32 / (n - 1) as f32;
                let a = s * 4.0 * std::f32::consts::TAU + t;
                Vec3::new(a.cos() * 0.3, s * 2.0, a.sin() * 0.3 + 0.1 * (t + s * 6.0).sin())
            })
            .collect();
        let radii = (0..n - 1)
            .map(|i| 0.03 + 0.02 * (i as f32 / n as f32 * std::f32::consts::PI).sin())
            .collect();
        Self { points, radii }
    }

    fn ring(t: f32) -> Self {
        let n = 32;
        let r = 0.8 + 0.1 * t.sin();
        let points = (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                Vec3::new(a.cos() * r, 1.0, a.sin() * r)
            })
            .collect();
        Self {
            points,
            radii: vec![0.04; n - 1],
        }
    }
}

impl RodSystem for DemoRod {
    fn centerline(&self) -> &[Vec3] {
        &self.points
    }

    fn radii(&self) -> &[f32] {
        &self.radii
    }
}

fn demo_grouping() -> GroupingConfig {
    GroupingConfig::new()
        .with_group(
            "helices",
            GroupSpec {
                kind: ObjectKind::Rod,
                objects: vec!["helix".into()],
                color: Color::GREEN,
                closed: false,
            },
        )
        .with_group(
            "rings",
            GroupSpec {
                kind: ObjectKind::Rod,
                objects: vec!["ring".into()],
                color: Color::VIOLET,
                closed: true,
            },
        )
}

fn demo_dataset() -> rodviz_core::Result<VisualizationDataset> {
    let mut recorder = SnapshotRecorder::new(4);
    let dt = 0.01;
    for step in 0..DEMO_STEPS {
        let time = step as f64 * dt;
        let t = time as f32 * 3.0;
        recorder.make_callback("helix", &DemoRod::helix(t), time, step)?;
        recorder.make_callback("ring", &DemoRod::ring(t), time, step)?;
    }
    recorder.into_dataset(Some(&demo_grouping()))
}

fn load_dataset(args: &Args) -> rodviz_core::Result<VisualizationDataset> {
    let Some(dir) = &args.snapshots else {
        tracing::info!("no snapshot directory given, playing synthetic run");
        return demo_dataset();
    };
    let grouping = args
        .grouping
        .as_ref()
        .map(GroupingConfig::load)
        .transpose()?;
    SnapshotStore::open(dir)?.load_dataset(grouping.as_ref())
}

struct App {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    gilrs: Option<Gilrs>,
    producer: Option<ProducerHandle>,
    capture: Option<FrameCapture>,
    /// Frame index last written by `capture`.
    last_captured: Option<usize>,
    playback: PlaybackController,
    scene: SceneState,
    modifiers: ModifiersState,
    scrubbing: bool,
    cursor_x: f64,
    last_frame: Instant,
    fps_frames: u32,
    fps_since: Instant,
    last_title: String,
}

impl App {
    fn new(
        config: ViewerConfig,
        dataset: &VisualizationDataset,
        producer: ProducerHandle,
        capture: Option<FrameCapture>,
    ) -> Self {
        let mut playback = PlaybackController::new(producer.cache(), config.tick_interval());
        playback.set_speed(config.speed);

        let mut scene = SceneState::new(dataset);
        scene.set_camera_mode(config.camera_mode);
        if config.show_axes {
            for direction in AxisDirection::ALL {
                scene.add_axis(direction, None, AxisStyle::default());
            }
        }

        Self {
            config,
            window: None,
            renderer: None,
            gilrs: None,
            producer: Some(producer),
            capture,
            last_captured: None,
            playback,
            scene,
            modifiers: ModifiersState::default(),
            scrubbing: false,
            cursor_x: 0.0,
            last_frame: Instant::now(),
            fps_frames: 0,
            fps_since: Instant::now(),
            last_title: String::new(),
        }
    }

    fn show(&mut self, frame: Option<Arc<FrameMeshBundle>>) {
        if let Some(frame) = frame {
            self.scene.render(&frame);
        }
    }

    fn reset_camera(&mut self) {
        if let Some(renderer) = &mut self.renderer {
            renderer.camera = Camera::new(self.scene.camera_mode(), self.scene.camera_fit());
        }
    }

    fn set_camera_mode(&mut self, mode: CameraMode) {
        self.scene.set_camera_mode(mode);
        self.reset_camera();
        tracing::info!(%mode, "camera mode");
    }

    fn toggle_playback(&mut self) {
        let frame = self.playback.toggle(Instant::now());
        self.show(frame);
        tracing::info!(state = %self.playback.state(), "playback");
    }

    fn step(&mut self, forward: bool) {
        let frame = if self.modifiers.shift_key() {
            let current = self.playback.current_frame();
            let target = if forward {
                current + 10
            } else {
                current.saturating_sub(10)
            };
            self.playback.pause();
            self.playback.seek(target)
        } else if forward {
            self.playback.step_forward()
        } else {
            self.playback.step_backward()
        };
        self.show(frame);
    }

    fn seek_end(&mut self) {
        if let Some(bounds) = self.playback.bounds() {
            let frame = self.playback.seek(*bounds.end());
            self.show(frame);
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        match key {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::Space | KeyCode::KeyP => self.toggle_playback(),
            KeyCode::ArrowRight => self.step(true),
            KeyCode::ArrowLeft => self.step(false),
            KeyCode::Home => {
                let frame = self.playback.seek(0);
                self.show(frame);
            }
            KeyCode::End => self.seek_end(),
            KeyCode::BracketLeft => {
                self.playback.slower();
                tracing::info!(speed = %self.playback.speed(), "playback speed");
            }
            KeyCode::BracketRight => {
                self.playback.faster();
                tracing::info!(speed = %self.playback.speed(), "playback speed");
            }
            KeyCode::KeyX | KeyCode::KeyY | KeyCode::KeyZ => {
                let direction = match key {
                    KeyCode::KeyX => AxisDirection::X,
                    KeyCode::KeyY => AxisDirection::Y,
                    _ => AxisDirection::Z,
                };
                if let Some(visible) = self.scene.toggle_axis(direction) {
                    tracing::info!(?direction, visible, "axis");
                }
            }
            KeyCode::Digit1 => self.set_camera_mode(CameraMode::Turntable),
            KeyCode::Digit2 => self.set_camera_mode(CameraMode::Arcball),
            KeyCode::Digit3 => self.set_camera_mode(CameraMode::Fly),
            KeyCode::Tab => {
                let mode = self.scene.camera_mode().cycle();
                self.set_camera_mode(mode);
            }
            KeyCode::KeyC => {
                let color = self.scene.cycle_color_override();
                tracing::info!(?color, "color override");
            }
            _ => {}
        }
    }

    fn scrub_to(&mut self, x: f64) {
        let (Some(renderer), Some(bounds)) = (&self.renderer, self.playback.bounds()) else {
            return;
        };
        let width = renderer.size().width.max(1) as f64;
        let last = *bounds.end();
        let target = ((x / width).clamp(0.0, 1.0) * last as f64).round() as usize;
        if target != self.playback.current_frame() {
            let frame = self.playback.seek(target);
            self.show(frame);
        }
    }

    fn update_gamepad(&mut self) {
        let Some(gilrs) = &mut self.gilrs else {
            return;
        };

        let mut pressed = Vec::new();
        while let Some(GilrsEvent { id, event, .. }) = gilrs.next_event() {
            if let gilrs::EventType::ButtonPressed(btn, _) = event {
                pressed.push(btn);
            }
            tracing::debug!("Gamepad {:?} event: {:?}", id, event);
        }

        let mut sticks = None;
        for (_id, gamepad) in gilrs.gamepads() {
            if !gamepad.is_connected() {
                continue;
            }
            sticks = Some((
                apply_deadzone(gamepad.value(Axis::LeftStickX)),
                apply_deadzone(-gamepad.value(Axis::LeftStickY)),
                apply_deadzone(gamepad.value(Axis::RightStickX)),
                apply_deadzone(gamepad.value(Axis::RightStickY)),
            ));
            // Only use first connected gamepad
            break;
        }

        for btn in pressed {
            match btn {
                Button::South | Button::Start => self.toggle_playback(),
                Button::East | Button::Select => {
                    let frame = self.playback.seek(0);
                    self.show(frame);
                }
                Button::DPadRight => {
                    let frame = self.playback.step_forward();
                    self.show(frame);
                }
                Button::DPadLeft => {
                    let frame = self.playback.step_backward();
                    self.show(frame);
                }
                Button::LeftTrigger => self.playback.slower(),
                Button::RightTrigger => self.playback.faster(),
                Button::North => {
                    self.reset_camera();
                    tracing::info!("Camera reset");
                }
                _ => {}
            }
        }

        if let (Some((mx, my, lx, ly)), Some(renderer)) = (sticks, &mut self.renderer) {
            renderer.camera.set_gamepad_move(mx, my);
            renderer.camera.set_gamepad_look(lx, ly);
        }
    }

    fn drain_producer(&mut self) {
        let Some(producer) = &mut self.producer else {
            return;
        };
        for event in producer.poll_events() {
            match event {
                ProducerEvent::FrameAppended {
                    frame_index,
                    frames_ready,
                } => {
                    tracing::trace!(frame_index, frames_ready, "frame ready");
                    // Show the first frame as soon as it exists.
                    if frame_index == 0 && self.scene.frame_index().is_none() {
                        let frame = self.playback.current();
                        self.show(frame);
                    }
                }
                ProducerEvent::Completed(completion) => match completion.error() {
                    Some(error) => tracing::error!(
                        frames = completion.frames(),
                        %error,
                        "mesh generation stopped"
                    ),
                    None => tracing::info!(frames = completion.frames(), "mesh generation done"),
                },
            }
        }
    }

    fn update_title(&mut self) {
        let status = self.playback.status();
        let building = if status.build_complete { "" } else { " | building" };
        let title = format!(
            "rodviz | {} | frame {}/{} ({}) | {} {}{}",
            self.scene.time_label(),
            status.current_frame,
            status.frames_ready,
            status.total_frames,
            status.state,
            status.speed,
            building,
        );
        if title != self.last_title {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
            self.last_title = title;
        }
    }

    fn shutdown(&mut self) {
        if let Some(capture) = self.capture.take() {
            tracing::info!(
                frames = capture.frames_written(),
                dir = %capture.dir().display(),
                "frame recording finished"
            );
        }
        if let Some(producer) = self.producer.take() {
            producer.cancel();
            let completion = producer.join();
            tracing::info!(frames = completion.frames(), "frame producer stopped");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("rodviz")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        // Initialize gilrs for gamepad support
        match Gilrs::new() {
            Ok(gilrs) => {
                for (_id, gamepad) in gilrs.gamepads() {
                    tracing::info!("Gamepad found: {} ({:?})", gamepad.name(), gamepad.power_info());
                }
                self.gilrs = Some(gilrs);
            }
            Err(e) => {
                tracing::warn!("Failed to initialize gamepad support: {}", e);
            }
        }

        let camera = Camera::new(self.scene.camera_mode(), self.scene.camera_fit());
        match pollster::block_on(Renderer::new(window, self.config.background, camera)) {
            Ok(mut renderer) => {
                if let Some(capture) = &self.capture {
                    match renderer.enable_capture() {
                        Ok(()) => tracing::info!(dir = %capture.dir().display(), "recording frames"),
                        Err(e) => {
                            tracing::error!("Frame recording unavailable: {}", e);
                            self.capture = None;
                        }
                    }
                }
                self.renderer = Some(renderer);
            }
            Err(e) => {
                tracing::error!("Failed to create renderer: {}", e);
                event_loop.exit();
                return;
            }
        }

        self.last_frame = Instant::now();
        self.fps_since = self.last_frame;
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.renderer.is_none() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size);
                }
            }

            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if state == ElementState::Pressed && !repeat {
                    self.handle_key(event_loop, key);
                }

                // Forward to camera
                if let Some(renderer) = &mut self.renderer {
                    renderer.camera.handle_keyboard(key, state);
                }
            }

            WindowEvent::MouseInput { button, state, .. } => {
                if button == MouseButton::Middle {
                    self.scrubbing = state == ElementState::Pressed;
                    if self.scrubbing {
                        self.playback.pause();
                        self.scrub_to(self.cursor_x);
                    }
                } else if let Some(renderer) = &mut self.renderer {
                    renderer.camera.handle_mouse_button(button, state);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_x = position.x;
                if self.scrubbing {
                    self.scrub_to(position.x);
                }
                if let Some(renderer) = &mut self.renderer {
                    renderer.camera.handle_mouse_motion(position.x, position.y);
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => y,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                if let Some(renderer) = &mut self.renderer {
                    renderer.camera.handle_scroll(scroll);
                }
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - self.last_frame).as_secs_f32();
                self.last_frame = now;

                self.drain_producer();
                self.update_gamepad();

                let frame = self.playback.tick(now);
                self.show(frame);

                let displayed = self.scene.frame_index();
                let capture = self.capture.is_some()
                    && displayed.is_some()
                    && displayed != self.last_captured;

                if let Some(renderer) = &mut self.renderer {
                    renderer.camera.update(dt);
                    renderer.sync_scene(&self.scene);

                    match renderer.render(capture) {
                        Ok(Some(image)) => {
                            if let Some(recorder) = &mut self.capture {
                                match recorder.save(&image) {
                                    Ok(_) => self.last_captured = displayed,
                                    Err(e) => {
                                        tracing::error!("Stopping frame recording: {}", e);
                                        self.capture = None;
                                    }
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(ViewerError::Surface(wgpu::SurfaceError::Lost)) => {
                            renderer.resize(renderer.size());
                        }
                        Err(ViewerError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                            tracing::error!("Out of GPU memory");
                            self.shutdown();
                            event_loop.exit();
                            return;
                        }
                        Err(e) => {
                            tracing::warn!("Render error: {:?}", e);
                        }
                    }
                }

                self.update_title();

                self.fps_frames += 1;
                let elapsed = now - self.fps_since;
                if elapsed.as_secs_f32() >= 1.0 {
                    let fps = self.fps_frames as f32 / elapsed.as_secs_f32();
                    tracing::debug!("render rate: {:.1} fps", fps);
                    self.fps_frames = 0;
                    self.fps_since = now;
                }

                // Request next frame
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn run() -> Result<(), ViewerError> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    config.apply_env();
    tracing::debug!(?config, "viewer config");

    let dataset = Arc::new(load_dataset(&args)?);
    tracing::info!(
        objects = dataset.object_count(),
        frames = dataset.frame_count(),
        "dataset loaded"
    );

    let producer = FrameProducer::spawn(MeshBuilder::new(config.tube()), Arc::clone(&dataset))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let capture = args.record.as_ref().map(FrameCapture::new).transpose()?;

    let mut app = App::new(config, &dataset, producer, capture);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("rodviz");
    tracing::info!("Controls:");
    tracing::info!("  Space/P - Toggle playback");
    tracing::info!("  Left/Right - Step (Shift: 10 frames)");
    tracing::info!("  Home/End - First/last frame");
    tracing::info!("  [/] - Playback speed");
    tracing::info!("  Middle-drag - Scrub");
    tracing::info!("  X/Y/Z - Toggle axes");
    tracing::info!("  1/2/3, Tab - Camera mode");
    tracing::info!("  C - Color override");
    tracing::info!("  --record DIR - Save displayed frames as PNGs");
    tracing::info!("  Escape - Quit");

    if let Err(e) = run() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
