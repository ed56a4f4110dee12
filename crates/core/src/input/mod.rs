/// Pointer and keyboard input forwarded by the host window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Click,
    Touch { contacts: u32 },
    Key { key: String, shift: bool },
}

impl InputEvent {
    /// Shift+D, or a touch with at least three contacts.
    pub fn toggles_debug(&self) -> bool {
        match self {
            InputEvent::Key { key, shift } => *shift && key == "D",
            InputEvent::Touch { contacts } => *contacts >= 3,
            InputEvent::Click => false,
        }
    }

    /// Clicks and touches count as a pointer gesture.
    pub fn is_pointer(&self) -> bool {
        matches!(self, InputEvent::Click | InputEvent::Touch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: &str, shift: bool) -> InputEvent {
        InputEvent::Key {
            key: key.to_string(),
            shift,
        }
    }

    #[test]
    fn debug_toggle_gestures() {
        assert!(key("D", true).toggles_debug());
        assert!(!key("D", false).toggles_debug());
        assert!(!key("d", true).toggles_debug());
        assert!(InputEvent::Touch { contacts: 3 }.toggles_debug());
        assert!(!InputEvent::Touch { contacts: 2 }.toggles_debug());
        assert!(!InputEvent::Click.toggles_debug());
    }

    #[test]
    fn pointer_gestures() {
        assert!(InputEvent::Click.is_pointer());
        assert!(InputEvent::Touch { contacts: 1 }.is_pointer());
        assert!(!key("D", true).is_pointer());
    }
}
