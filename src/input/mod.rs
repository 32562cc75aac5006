pub mod dispatcher;
pub mod events;

// Re-export the essential types
pub use dispatcher::{DebounceTimer, DispatcherHandle, DispatcherSnapshot, ViewportDispatcher};
pub use events::{ViewportEvent, ViewportEventKind};
