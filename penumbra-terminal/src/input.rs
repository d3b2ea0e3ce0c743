/// Keyboard and mouse handling for the terminal frontend
use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use penumbra_core::FrameInput;

/// Movement input added per key press. Terminals report presses and
/// auto-repeats but not releases, so every event is one discrete step.
pub const KEY_STEP: f32 = 20.0;
/// Look input added per arrow key press.
pub const LOOK_STEP: f32 = 100.0;
/// Look input per cell of mouse drag.
const DRAG_STEP: (f32, f32) = (15.0, 30.0);

/// Accumulates terminal events between frames into one [`FrameInput`].
#[derive(Debug, Clone, Default)]
pub struct InputMapper {
    pending: FrameInput,
    sprint_toggled: bool,
    last_drag: Option<(u16, u16)>,
}

impl InputMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: &Event) {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: &KeyEvent) {
        let shifted = key.modifiers.contains(KeyModifiers::SHIFT);
        let input = &mut self.pending;

        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => input.quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                input.quit = true
            }
            KeyCode::Char('f') | KeyCode::Char('F') => input.reposition_light = true,
            KeyCode::Char('r') | KeyCode::Char('R') => {
                self.sprint_toggled = !self.sprint_toggled;
                log::debug!("sprint {}", if self.sprint_toggled { "on" } else { "off" });
            }
            KeyCode::Char(c) => {
                let (forward, right, up) = match c.to_ascii_lowercase() {
                    'w' => (1.0, 0.0, 0.0),
                    's' => (-1.0, 0.0, 0.0),
                    'd' => (0.0, 1.0, 0.0),
                    'a' => (0.0, -1.0, 0.0),
                    ' ' => (0.0, 0.0, 1.0),
                    'c' => (0.0, 0.0, -1.0),
                    _ => return,
                };
                input.forward += forward * KEY_STEP;
                input.right += right * KEY_STEP;
                input.up += up * KEY_STEP;
                input.sprint |= shifted || c.is_ascii_uppercase();
            }
            KeyCode::Left => input.look_x -= LOOK_STEP,
            KeyCode::Right => input.look_x += LOOK_STEP,
            KeyCode::Up => input.look_y += LOOK_STEP,
            KeyCode::Down => input.look_y -= LOOK_STEP,
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: &MouseEvent) {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.last_drag = Some((mouse.column, mouse.row))
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some((column, row)) = self.last_drag {
                    self.pending.look_x += (mouse.column as f32 - column as f32) * DRAG_STEP.0;
                    // dragging upwards looks up
                    self.pending.look_y += (row as f32 - mouse.row as f32) * DRAG_STEP.1;
                }
                self.last_drag = Some((mouse.column, mouse.row));
            }
            MouseEventKind::Up(_) => self.last_drag = None,
            _ => {}
        }
    }

    /// Input gathered since the last call.
    pub fn take(&mut self) -> FrameInput {
        let mut input = std::mem::take(&mut self.pending);
        input.sprint |= self.sprint_toggled;
        input
    }
}
