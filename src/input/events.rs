use crate::core::viewport::ViewportState;
use crate::engine::MapEngine;
use serde::{Deserialize, Serialize};

/// Movement and zoom lifecycle events emitted by the map engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportEventKind {
    MoveStart,
    Move,
    MoveEnd,
    ZoomStart,
    Zoom,
    ZoomEnd,
}

impl ViewportEventKind {
    pub const ALL: [ViewportEventKind; 6] = [
        ViewportEventKind::MoveStart,
        ViewportEventKind::Move,
        ViewportEventKind::MoveEnd,
        ViewportEventKind::ZoomStart,
        ViewportEventKind::Zoom,
        ViewportEventKind::ZoomEnd,
    ];

    /// Event name as used by web map engines, e.g. `moveend`
    pub fn name(&self) -> &'static str {
        match self {
            ViewportEventKind::MoveStart => "movestart",
            ViewportEventKind::Move => "move",
            ViewportEventKind::MoveEnd => "moveend",
            ViewportEventKind::ZoomStart => "zoomstart",
            ViewportEventKind::Zoom => "zoom",
            ViewportEventKind::ZoomEnd => "zoomend",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether the gesture that produced this event is over
    pub fn is_end(&self) -> bool {
        matches!(self, ViewportEventKind::MoveEnd | ViewportEventKind::ZoomEnd)
    }
}

impl std::fmt::Display for ViewportEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A movement or zoom event together with the viewport it produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportEvent {
    pub kind: ViewportEventKind,
    pub viewport: ViewportState,
}

impl ViewportEvent {
    pub fn new(kind: ViewportEventKind, viewport: ViewportState) -> Self {
        Self { kind, viewport }
    }

    /// Event carrying the engine's current view, for adapters that
    /// receive bare event names from the engine
    pub fn from_engine(kind: ViewportEventKind, engine: &impl MapEngine) -> Self {
        Self::new(kind, engine.viewport())
    }

    pub fn moved(viewport: ViewportState) -> Self {
        Self::new(ViewportEventKind::Move, viewport)
    }

    pub fn move_end(viewport: ViewportState) -> Self {
        Self::new(ViewportEventKind::MoveEnd, viewport)
    }

    pub fn zoomed(viewport: ViewportState) -> Self {
        Self::new(ViewportEventKind::Zoom, viewport)
    }

    pub fn zoom_end(viewport: ViewportState) -> Self {
        Self::new(ViewportEventKind::ZoomEnd, viewport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ViewportEventKind::ALL {
            assert_eq!(ViewportEventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ViewportEventKind::from_name("click"), None);
    }

    #[test]
    fn serde_uses_engine_names() {
        let json = serde_json::to_string(&ViewportEventKind::MoveEnd).unwrap();
        assert_eq!(json, "\"moveend\"");
        assert!(ViewportEventKind::ZoomEnd.is_end());
        assert!(!ViewportEventKind::Zoom.is_end());
    }

    #[test]
    fn from_engine_reads_current_view() {
        use crate::core::geo::LatLng;
        use crate::engine::memory::InMemoryEngine;

        let start = ViewportState::from_center_span(LatLng::new(30.0, -97.0), 1.0, 1.0, 8.0).unwrap();
        let engine = InMemoryEngine::new(start);
        let moved = ViewportState::from_center_span(LatLng::new(30.5, -97.5), 1.0, 1.0, 9.0).unwrap();
        engine.set_viewport(moved);

        let kind = ViewportEventKind::from_name("moveend").unwrap();
        let event = ViewportEvent::from_engine(kind, &engine);
        assert_eq!(event, ViewportEvent::move_end(moved));
    }
}
