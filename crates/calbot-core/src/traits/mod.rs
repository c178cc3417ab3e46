//! Collaborator traits the lifecycle engine is written against.

pub mod render;
pub mod settings;
pub mod sink;
pub mod store;

pub use render::Renderer;
pub use settings::{ChannelSettingsProvider, ScheduleOrdering};
pub use sink::MessageSink;
pub use store::EntryStore;
