//! Keyboard and mouse state for the camera controls.

use glam::{Vec2, Vec3};
use hashbrown::HashSet;
use vkrt_render::Camera;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Speed multiplier while Shift is held.
pub const SPRINT_MULTIPLIER: f32 = 4.0;
/// Radians of rotation per pixel of mouse drag.
pub const MOUSE_SENSITIVITY: f32 = 0.003;

/// Pressed keys plus the mouse drag accumulated since the last update.
#[derive(Debug, Default)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
    rotating: bool,
    cursor: Option<(f64, f64)>,
    drag: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a window event.
    pub fn process_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => self.press(key),
                    ElementState::Released => self.release(key),
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.rotating = state.is_pressed();
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(position.x, position.y);
            }
            WindowEvent::Focused(false) => self.clear(),
            _ => {}
        }
    }

    pub fn press(&mut self, key: KeyCode) {
        self.pressed.insert(key);
    }

    pub fn release(&mut self, key: KeyCode) {
        self.pressed.remove(&key);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn set_rotating(&mut self, rotating: bool) {
        self.rotating = rotating;
    }

    /// Record a cursor position. Movement only counts while rotating.
    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        if let (true, Some((last_x, last_y))) = (self.rotating, self.cursor) {
            self.drag += Vec2::new((x - last_x) as f32, (y - last_y) as f32);
        }
        self.cursor = Some((x, y));
    }

    /// Drop all held keys and any pending drag.
    pub fn clear(&mut self) {
        self.pressed.clear();
        self.rotating = false;
        self.drag = Vec2::ZERO;
    }

    /// Movement request as (forward, right, up), each in -1..=1.
    pub fn movement_axes(&self) -> Vec3 {
        let axis = |positive: &[KeyCode], negative: &[KeyCode]| {
            let on = |keys: &[KeyCode]| keys.iter().any(|key| self.is_pressed(*key));
            f32::from(u8::from(on(positive))) - f32::from(u8::from(on(negative)))
        };
        Vec3::new(
            axis(&[KeyCode::KeyW, KeyCode::ArrowUp], &[KeyCode::KeyS, KeyCode::ArrowDown]),
            axis(&[KeyCode::KeyD, KeyCode::ArrowRight], &[KeyCode::KeyA, KeyCode::ArrowLeft]),
            axis(&[KeyCode::Space], &[KeyCode::ControlLeft, KeyCode::ControlRight]),
        )
    }

    pub fn sprinting(&self) -> bool {
        self.is_pressed(KeyCode::ShiftLeft) || self.is_pressed(KeyCode::ShiftRight)
    }

    /// Move and turn `camera` for a frame of `dt` seconds, consuming the drag.
    pub fn update_camera(&mut self, camera: &mut Camera, speed: f32, dt: f32) {
        let drag = std::mem::take(&mut self.drag);
        if drag != Vec2::ZERO {
            camera.rotate(-drag.x * MOUSE_SENSITIVITY, -drag.y * MOUSE_SENSITIVITY);
        }

        let axes = self.movement_axes();
        if axes != Vec3::ZERO {
            let speed = if self.sprinting() {
                speed * SPRINT_MULTIPLIER
            } else {
                speed
            };
            let step = axes.normalize() * speed * dt;
            camera.translate(step.x, step.y, step.z);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_at_origin() -> Camera {
        let mut camera = Camera::default();
        camera.position = Vec3::ZERO;
        camera
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut input = InputState::new();
        input.press(KeyCode::KeyW);
        input.press(KeyCode::KeyS);
        input.press(KeyCode::KeyD);
        assert_eq!(input.movement_axes(), Vec3::new(0.0, 1.0, 0.0));

        input.release(KeyCode::KeyS);
        assert_eq!(input.movement_axes(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn forward_moves_along_view_direction() {
        let mut input = InputState::new();
        let mut camera = camera_at_origin();
        input.press(KeyCode::KeyW);

        input.update_camera(&mut camera, 2.0, 0.5);
        assert_relative_eq!(camera.position.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn shift_sprints() {
        let mut input = InputState::new();
        let mut camera = camera_at_origin();
        input.press(KeyCode::Space);
        input.press(KeyCode::ShiftLeft);

        input.update_camera(&mut camera, 1.0, 1.0);
        assert_relative_eq!(camera.position.y, SPRINT_MULTIPLIER, epsilon = 1e-6);
    }

    #[test]
    fn drag_rotates_only_while_button_held() {
        let mut input = InputState::new();
        let mut camera = camera_at_origin();

        input.cursor_moved(0.0, 0.0);
        input.cursor_moved(100.0, 0.0);
        input.update_camera(&mut camera, 1.0, 0.0);
        assert_eq!(camera.yaw(), 0.0);

        input.set_rotating(true);
        input.cursor_moved(200.0, 50.0);
        input.update_camera(&mut camera, 1.0, 0.0);
        assert_relative_eq!(camera.yaw(), -100.0 * MOUSE_SENSITIVITY, epsilon = 1e-6);
        assert_relative_eq!(camera.pitch(), -50.0 * MOUSE_SENSITIVITY, epsilon = 1e-6);

        // The drag was consumed.
        input.update_camera(&mut camera, 1.0, 0.0);
        assert_relative_eq!(camera.yaw(), -100.0 * MOUSE_SENSITIVITY, epsilon = 1e-6);
    }

    #[test]
    fn losing_focus_releases_keys() {
        let mut input = InputState::new();
        input.press(KeyCode::KeyA);
        input.set_rotating(true);

        input.process_window_event(&WindowEvent::Focused(false));
        assert!(!input.is_pressed(KeyCode::KeyA));
        assert_eq!(input.movement_axes(), Vec3::ZERO);
    }
}
