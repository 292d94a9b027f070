//! Outward-facing collaborators: the view sink and key bindings.

use meshplay_protocol::Direction;
use tokio::sync::mpsc;

use crate::{ElementSnapshot, GameStatus};

/// Receives state changes for display. Calls are one-way notifications;
/// a view never feeds back into the protocol.
pub trait GameView {
    /// Called once per game, when every player is known.
    fn set_up_view(&mut self, elements: &[ElementSnapshot]);

    /// Called each time an element's location or state changes.
    fn draw_element(&mut self, element: &ElementSnapshot);

    fn status_did_change(&mut self, _status: GameStatus) {}
}

/// What a [`ChannelView`] posts to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    SetUp(Vec<ElementSnapshot>),
    Draw(ElementSnapshot),
    Status(GameStatus),
}

/// A view that posts every update to a channel owned by the UI task.
#[derive(Debug, Clone)]
pub struct ChannelView {
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl ChannelView {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }

    fn post(&self, event: ViewEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("view receiver dropped");
        }
    }
}

impl GameView for ChannelView {
    fn set_up_view(&mut self, elements: &[ElementSnapshot]) {
        self.post(ViewEvent::SetUp(elements.to_vec()));
    }

    fn draw_element(&mut self, element: &ElementSnapshot) {
        self.post(ViewEvent::Draw(element.clone()));
    }

    fn status_did_change(&mut self, status: GameStatus) {
        self.post(ViewEvent::Status(status));
    }
}

/// Maps raw key names to player directions.
pub trait KeyBindings {
    fn direction_for(&self, key: &str) -> Option<Direction>;
}

/// Arrow keys plus WASD.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowKeys;

impl KeyBindings for ArrowKeys {
    fn direction_for(&self, key: &str) -> Option<Direction> {
        match key.to_ascii_lowercase().as_str() {
            "up" | "w" => Some(Direction::Up),
            "down" | "s" => Some(Direction::Down),
            "left" | "a" => Some(Direction::Left),
            "right" | "d" => Some(Direction::Right),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrow_keys_maps_names_and_wasd() {
        let keys = ArrowKeys;
        assert_eq!(keys.direction_for("Up"), Some(Direction::Up));
        assert_eq!(keys.direction_for("a"), Some(Direction::Left));
        assert_eq!(keys.direction_for("space"), None);
    }

    #[test]
    fn test_channel_view_posts_in_order() {
        let (mut view, mut rx) = ChannelView::new();
        view.set_up_view(&[]);
        view.status_did_change(GameStatus::Playing);

        assert_eq!(rx.try_recv().unwrap(), ViewEvent::SetUp(Vec::new()));
        assert_eq!(
            rx.try_recv().unwrap(),
            ViewEvent::Status(GameStatus::Playing)
        );
    }
}
