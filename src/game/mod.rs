//! Game simulation modules

pub mod combat;
pub mod dispatch;
pub mod map;
pub mod math;
pub mod physics;
pub mod player;
pub mod registry;
pub mod room;
pub mod snapshot;

pub use dispatch::{Outbound, RoomEvent};
pub use registry::{RegistrySettings, RoomHandle, RoomRegistry, RoomSummary};
pub use room::RoomSettings;
