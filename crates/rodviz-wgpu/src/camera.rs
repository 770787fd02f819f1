//! Cameras for 3D navigation: turntable, arcball and fly.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec2, Vec3};
use rodviz_core::{CameraFit, CameraMode};
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

const MAX_PITCH: f32 = FRAC_PI_2 - 0.01;

/// Mouse drag tracking shared by the orbiting cameras.
#[derive(Debug, Default, Clone, Copy)]
struct Drag {
    active: bool,
    last: Option<(f64, f64)>,
}

impl Drag {
    fn button(&mut self, pressed: bool) {
        self.active = pressed;
        if !pressed {
            self.last = None;
        }
    }

    /// Movement since the last event while dragging.
    fn motion(&mut self, x: f64, y: f64) -> Option<Vec2> {
        if !self.active {
            return None;
        }
        let delta = self
            .last
            .map(|(lx, ly)| Vec2::new((x - lx) as f32, (y - ly) as f32));
        self.last = Some((x, y));
        delta
    }
}

/// Perspective parameters scaled to the scene.
#[derive(Debug, Clone, Copy)]
struct Lens {
    fov: f32,
    near: f32,
    far: f32,
}

impl Lens {
    fn for_fit(fit: CameraFit) -> Self {
        Self {
            fov: std::f32::consts::FRAC_PI_4,
            near: fit.radius * 0.01,
            far: fit.radius * 100.0,
        }
    }

    fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }
}

/// Orbits a target around the vertical axis; elevation is clamped.
pub struct TurntableCamera {
    pub target: Vec3,
    pub distance: f32,
    /// Rotation around the vertical axis, radians
    pub azimuth: f32,
    /// Angle above the horizontal plane, radians
    pub elevation: f32,
    pub sensitivity: f32,
    lens: Lens,
    drag: Drag,
    gamepad_look: Vec2,
    min_distance: f32,
}

impl TurntableCamera {
    pub fn from_fit(fit: CameraFit) -> Self {
        Self {
            target: fit.center,
            distance: fit.radius * 2.5,
            azimuth: 0.0,
            elevation: 0.4,
            sensitivity: 0.005,
            lens: Lens::for_fit(fit),
            drag: Drag::default(),
            gamepad_look: Vec2::ZERO,
            min_distance: fit.radius * 0.05,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let (sa, ca) = self.azimuth.sin_cos();
        let (se, ce) = self.elevation.sin_cos();
        self.target + self.distance * Vec3::new(ce * sa, se, ce * ca)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.azimuth -= dx * self.sensitivity;
        self.elevation = (self.elevation + dy * self.sensitivity).clamp(-MAX_PITCH, MAX_PITCH);
    }

    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance * (1.0 - delta * 0.1))
            .clamp(self.min_distance, self.lens.far * 0.5);
    }
}

/// Free rotation around a target, without a preferred up direction.
pub struct ArcballCamera {
    pub target: Vec3,
    pub distance: f32,
    pub rotation: Quat,
    pub sensitivity: f32,
    lens: Lens,
    drag: Drag,
    gamepad_look: Vec2,
    min_distance: f32,
}

impl ArcballCamera {
    pub fn from_fit(fit: CameraFit) -> Self {
        Self {
            target: fit.center,
            distance: fit.radius * 2.5,
            rotation: Quat::from_rotation_x(-0.4),
            sensitivity: 0.005,
            lens: Lens::for_fit(fit),
            drag: Drag::default(),
            gamepad_look: Vec2::ZERO,
            min_distance: fit.radius * 0.05,
        }
    }

    pub fn eye(&self) -> Vec3 {
        self.target + self.rotation * Vec3::Z * self.distance
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, self.up())
    }

    /// Rotate by a screen-space drag.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        let yaw = Quat::from_axis_angle(self.rotation * Vec3::Y, -dx * self.sensitivity);
        let pitch = Quat::from_axis_angle(self.rotation * Vec3::X, -dy * self.sensitivity);
        self.rotation = (yaw * pitch * self.rotation).normalize();
    }

    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance * (1.0 - delta * 0.1))
            .clamp(self.min_distance, self.lens.far * 0.5);
    }
}

/// First-person fly camera with WASD + mouse + gamepad controls.
pub struct FlyCamera {
    /// Camera position in world space
    pub position: Vec3,
    /// Yaw angle in radians (horizontal rotation)
    pub yaw: f32,
    /// Pitch angle in radians (vertical rotation)
    pub pitch: f32,
    /// Movement speed (units per second)
    pub speed: f32,
    /// Mouse sensitivity
    pub sensitivity: f32,
    /// Gamepad stick sensitivity
    pub gamepad_sensitivity: f32,
    lens: Lens,

    // Keyboard state
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    drag: Drag,

    // Gamepad analog input (-1.0 to 1.0)
    gamepad_move: Vec2,
    gamepad_look: Vec2,
}

impl FlyCamera {
    /// Start outside the scene, looking at its center along -Z.
    pub fn from_fit(fit: CameraFit) -> Self {
        Self {
            position: fit.center + Vec3::Z * fit.radius * 2.5,
            yaw: -FRAC_PI_2,
            pitch: 0.0,
            speed: fit.radius,
            sensitivity: 0.002,
            gamepad_sensitivity: 2.0,
            lens: Lens::for_fit(fit),
            forward: false,
            backward: false,
            left: false,
            right: false,
            up: false,
            down: false,
            drag: Drag::default(),
            gamepad_move: Vec2::ZERO,
            gamepad_look: Vec2::ZERO,
        }
    }

    /// Get the camera's forward direction.
    pub fn direction(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    /// Get the camera's right direction.
    pub fn right(&self) -> Vec3 {
        self.direction().cross(Vec3::Y).normalize()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction(), Vec3::Y)
    }

    fn look(&mut self, dyaw: f32, dpitch: f32) {
        self.yaw += dyaw;
        self.pitch = (self.pitch + dpitch).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Move according to held keys and stick input.
    pub fn update(&mut self, dt: f32) {
        if self.gamepad_look.length_squared() > 0.0 {
            let look = self.gamepad_look * self.gamepad_sensitivity * dt;
            self.look(look.x, -look.y);
        }

        let mut input = Vec3::ZERO;
        let axis = |pos: bool, neg: bool| pos as i32 as f32 - neg as i32 as f32;
        input.z += axis(self.forward, self.backward) + self.gamepad_move.y;
        input.x += axis(self.right, self.left) + self.gamepad_move.x;
        input.y += axis(self.up, self.down);

        if input.length_squared() > 0.0 {
            let velocity = (self.direction() * input.z + self.right() * input.x + Vec3::Y * input.y)
                .normalize_or_zero()
                * self.speed
                * dt;
            self.position += velocity;
        }
    }

    /// Handle keyboard input.
    pub fn handle_keyboard(&mut self, key: KeyCode, state: ElementState) {
        let pressed = state == ElementState::Pressed;

        match key {
            KeyCode::KeyW => self.forward = pressed,
            KeyCode::KeyS => self.backward = pressed,
            KeyCode::KeyA => self.left = pressed,
            KeyCode::KeyD => self.right = pressed,
            KeyCode::KeyE => self.up = pressed,
            KeyCode::KeyQ => self.down = pressed,
            KeyCode::Equal | KeyCode::NumpadAdd if pressed => self.speed *= 1.5,
            KeyCode::Minus | KeyCode::NumpadSubtract if pressed => self.speed /= 1.5,
            _ => {}
        }
    }
}

/// The active camera, one per [`CameraMode`].
pub enum Camera {
    Turntable(TurntableCamera),
    Arcball(ArcballCamera),
    Fly(FlyCamera),
}

impl Camera {
    /// A camera of the given kind framing `fit`.
    pub fn new(mode: CameraMode, fit: CameraFit) -> Self {
        match mode {
            CameraMode::Turntable => Camera::Turntable(TurntableCamera::from_fit(fit)),
            CameraMode::Arcball => Camera::Arcball(ArcballCamera::from_fit(fit)),
            CameraMode::Fly => Camera::Fly(FlyCamera::from_fit(fit)),
        }
    }

    pub fn mode(&self) -> CameraMode {
        match self {
            Camera::Turntable(_) => CameraMode::Turntable,
            Camera::Arcball(_) => CameraMode::Arcball,
            Camera::Fly(_) => CameraMode::Fly,
        }
    }

    pub fn eye(&self) -> Vec3 {
        match self {
            Camera::Turntable(c) => c.eye(),
            Camera::Arcball(c) => c.eye(),
            Camera::Fly(c) => c.position,
        }
    }

    /// Unit view direction.
    pub fn forward(&self) -> Vec3 {
        match self {
            Camera::Turntable(c) => (c.target - c.eye()).normalize_or(Vec3::NEG_Z),
            Camera::Arcball(c) => (c.target - c.eye()).normalize_or(Vec3::NEG_Z),
            Camera::Fly(c) => c.direction(),
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        match self {
            Camera::Turntable(c) => c.view_matrix(),
            Camera::Arcball(c) => c.view_matrix(),
            Camera::Fly(c) => c.view_matrix(),
        }
    }

    fn lens(&self) -> &Lens {
        match self {
            Camera::Turntable(c) => &c.lens,
            Camera::Arcball(c) => &c.lens,
            Camera::Fly(c) => &c.lens,
        }
    }

    /// Get the combined view-projection matrix.
    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.lens().projection(aspect) * self.view_matrix()
    }

    /// Advance continuous input (held keys, sticks).
    pub fn update(&mut self, dt: f32) {
        match self {
            Camera::Turntable(c) => {
                let look = c.gamepad_look * dt * 400.0;
                c.orbit(look.x, look.y);
            }
            Camera::Arcball(c) => {
                let look = c.gamepad_look * dt * 400.0;
                c.rotate(look.x, look.y);
            }
            Camera::Fly(c) => c.update(dt),
        }
    }

    pub fn handle_keyboard(&mut self, key: KeyCode, state: ElementState) {
        if let Camera::Fly(c) = self {
            c.handle_keyboard(key, state);
        }
    }

    /// Orbiting cameras drag with the left button, the fly camera looks with
    /// the right one.
    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        let pressed = state == ElementState::Pressed;
        match (self, button) {
            (Camera::Turntable(c), MouseButton::Left) => c.drag.button(pressed),
            (Camera::Arcball(c), MouseButton::Left) => c.drag.button(pressed),
            (Camera::Fly(c), MouseButton::Right) => c.drag.button(pressed),
            _ => {}
        }
    }

    pub fn handle_mouse_motion(&mut self, x: f64, y: f64) {
        match self {
            Camera::Turntable(c) => {
                if let Some(d) = c.drag.motion(x, y) {
                    c.orbit(d.x, d.y);
                }
            }
            Camera::Arcball(c) => {
                if let Some(d) = c.drag.motion(x, y) {
                    c.rotate(d.x, d.y);
                }
            }
            Camera::Fly(c) => {
                if let Some(d) = c.drag.motion(x, y) {
                    let s = c.sensitivity;
                    c.look(d.x * s, -d.y * s);
                }
            }
        }
    }

    /// Zoom the orbiting cameras; scale the fly camera's speed.
    pub fn handle_scroll(&mut self, delta: f32) {
        match self {
            Camera::Turntable(c) => c.zoom(delta),
            Camera::Arcball(c) => c.zoom(delta),
            Camera::Fly(c) => {
                c.speed = (c.speed * (1.0 + delta * 0.1)).max(1e-3);
            }
        }
    }

    /// Set gamepad left stick input for movement.
    pub fn set_gamepad_move(&mut self, x: f32, y: f32) {
        if let Camera::Fly(c) = self {
            c.gamepad_move = Vec2::new(x, y);
        }
    }

    /// Set gamepad right stick input for looking.
    pub fn set_gamepad_look(&mut self, x: f32, y: f32) {
        let look = Vec2::new(x, y);
        match self {
            Camera::Turntable(c) => c.gamepad_look = look,
            Camera::Arcball(c) => c.gamepad_look = look,
            Camera::Fly(c) => c.gamepad_look = look,
        }
    }
}
