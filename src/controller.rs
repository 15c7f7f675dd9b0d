use std::time::Duration;
use tracing::trace;

use crate::backend::OptimizationBackend;
use crate::domain::{AppConfig, InvError, Message};
use crate::model::Model;
use crate::state::StateStore;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event<S: StateStore, B: OptimizationBackend>(
        &self,
        model: &Model<S, B>,
    ) -> Result<Option<Message>, InvError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(self.handle_key(key));
                }
                Event::Resize(width, height) => {
                    return Ok(Some(Message::Resize(width as usize, height as usize)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Up | KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down | KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left | KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right | KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::Home | KeyCode::Char('g'), _) => Some(Message::MoveBeginning),
            (KeyCode::End | KeyCode::Char('G'), _) => Some(Message::MoveEnd),
            (KeyCode::PageDown | KeyCode::Char('n'), _) => Some(Message::NextPage),
            (KeyCode::PageUp | KeyCode::Char('p'), _) => Some(Message::PreviousPage),
            (KeyCode::Char('z'), _) => Some(Message::CyclePageSize),
            (KeyCode::Tab, _) => Some(Message::NextFile),
            (KeyCode::BackTab, _) => Some(Message::PreviousFile),
            (KeyCode::Char('s'), _) => Some(Message::SortAscending),
            (KeyCode::Char('S'), _) => Some(Message::SortDescending),
            (KeyCode::Char('/'), _) => Some(Message::Filter),
            (KeyCode::Char('c'), _) => Some(Message::ClearFilter),
            (KeyCode::Char('e'), _) => Some(Message::EditCell),
            (KeyCode::Char('i'), _) => Some(Message::ToggleIndex),
            (KeyCode::Char('y'), _) => Some(Message::CopyCell),
            (KeyCode::Char('Y'), _) => Some(Message::CopyRow),
            (KeyCode::Char('o'), _) => Some(Message::Optimize),
            (KeyCode::Char('r'), _) => Some(Message::ShowResults),
            (KeyCode::Char('x'), _) => Some(Message::ExportResults),
            (KeyCode::Char('d'), _) => Some(Message::DeleteFile),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode, modifiers: KeyModifiers) -> Option<Message> {
        Controller::new(&AppConfig::default()).handle_key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn maps_keys_to_messages() {
        assert_eq!(map(KeyCode::Char('s'), KeyModifiers::NONE), Some(Message::SortAscending));
        assert_eq!(map(KeyCode::Char('S'), KeyModifiers::SHIFT), Some(Message::SortDescending));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::NONE), Some(Message::ClearFilter));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(Message::Quit));
        assert_eq!(map(KeyCode::PageDown, KeyModifiers::NONE), Some(Message::NextPage));
        assert_eq!(map(KeyCode::BackTab, KeyModifiers::SHIFT), Some(Message::PreviousFile));
        assert_eq!(map(KeyCode::Char('Q'), KeyModifiers::SHIFT), None);
    }
}
