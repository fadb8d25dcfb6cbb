use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

/// Minibuffer editing while in command, search or filter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    Insert(char),
    Backspace,
    DeleteWord,
    Submit,
    Cancel,
    ToggleRegex,
    ToggleCase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitAnswer {
    Confirm,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Click { column: u16, row: u16 },
    ScrollUp,
    ScrollDown,
}

pub fn map_input_key(mode: InputMode, key: KeyEvent) -> Option<EditAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let pattern_entry = matches!(mode, InputMode::Search | InputMode::Filter);
    match key.code {
        KeyCode::Esc => Some(EditAction::Cancel),
        KeyCode::Enter => Some(EditAction::Submit),
        KeyCode::Backspace => Some(EditAction::Backspace),
        KeyCode::Char('c') if ctrl => Some(EditAction::Cancel),
        KeyCode::Char('m') | KeyCode::Char('j') if ctrl => Some(EditAction::Submit),
        KeyCode::Char('w') if ctrl => Some(EditAction::DeleteWord),
        KeyCode::Char('r') if ctrl && pattern_entry => Some(EditAction::ToggleRegex),
        KeyCode::Char('t') if ctrl && pattern_entry => Some(EditAction::ToggleCase),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(EditAction::Insert(c))
        }
        _ => None,
    }
}

/// Keys honoured while the "really quit?" gate is armed. Everything else is
/// swallowed.
pub fn map_quit_gate_key(key: KeyEvent) -> Option<QuitAnswer> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('y') | KeyCode::Char('Y') => Some(QuitAnswer::Confirm),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(QuitAnswer::Decline),
        _ => None,
    }
}

pub fn map_mouse(event: MouseEvent) -> Option<MouseAction> {
    match event.kind {
        MouseEventKind::Down(MouseButton::Left) => Some(MouseAction::Click {
            column: event.column,
            row: event.row,
        }),
        MouseEventKind::ScrollUp => Some(MouseAction::ScrollUp),
        MouseEventKind::ScrollDown => Some(MouseAction::ScrollDown),
        _ => None,
    }
}

/// Ctrl-W: drop trailing whitespace, then the word before it.
pub fn delete_word(input: &mut String) {
    let trimmed = input.trim_end().len();
    input.truncate(trimmed);
    let cut = input
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(index, c)| index + c.len_utf8())
        .unwrap_or(0);
    input.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::{EditAction, MouseAction, QuitAnswer, delete_word, map_input_key, map_mouse, map_quit_gate_key};
    use crate::app::InputMode;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

    #[test]
    fn input_mode_maps_char() {
        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(map_input_key(InputMode::Command, key), Some(EditAction::Insert('a')));
        let key = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(map_input_key(InputMode::Search, key), Some(EditAction::Insert('A')));
    }

    #[test]
    fn pattern_toggles_only_apply_to_search_and_filter() {
        let ctrl_r = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert_eq!(map_input_key(InputMode::Search, ctrl_r), Some(EditAction::ToggleRegex));
        assert_eq!(map_input_key(InputMode::Filter, ctrl_r), Some(EditAction::ToggleRegex));
        assert_eq!(map_input_key(InputMode::Command, ctrl_r), None);

        let ctrl_t = KeyEvent::new(KeyCode::Char('t'), KeyModifiers::CONTROL);
        assert_eq!(map_input_key(InputMode::Filter, ctrl_t), Some(EditAction::ToggleCase));
    }

    #[test]
    fn input_mode_maps_ctrl_m_and_ctrl_j_to_submit() {
        for c in ['m', 'j'] {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL);
            assert_eq!(map_input_key(InputMode::Command, key), Some(EditAction::Submit));
        }
    }

    #[test]
    fn quit_gate_ignores_unrelated_keys() {
        let key = |c| KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);
        assert_eq!(map_quit_gate_key(key('q')), Some(QuitAnswer::Confirm));
        assert_eq!(map_quit_gate_key(key('y')), Some(QuitAnswer::Confirm));
        assert_eq!(map_quit_gate_key(key('n')), Some(QuitAnswer::Decline));
        assert_eq!(
            map_quit_gate_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)),
            Some(QuitAnswer::Decline)
        );
        assert_eq!(map_quit_gate_key(key('j')), None);
    }

    #[test]
    fn left_click_and_wheel_are_mapped() {
        let event = |kind| MouseEvent {
            kind,
            column: 4,
            row: 7,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(
            map_mouse(event(MouseEventKind::Down(MouseButton::Left))),
            Some(MouseAction::Click { column: 4, row: 7 })
        );
        assert_eq!(map_mouse(event(MouseEventKind::ScrollDown)), Some(MouseAction::ScrollDown));
        assert_eq!(map_mouse(event(MouseEventKind::Moved)), None);
    }

    #[test]
    fn delete_word_removes_last_word_and_trailing_space() {
        let mut input = "logs web ".to_string();
        delete_word(&mut input);
        assert_eq!(input, "logs ");
        delete_word(&mut input);
        assert_eq!(input, "");
        delete_word(&mut input);
        assert_eq!(input, "");
    }
}
