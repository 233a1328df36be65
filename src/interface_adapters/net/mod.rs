// Network adapter modules split by the observer WebSocket vs the control HTTP routes.

pub mod api;
pub mod client;

pub use api::{
    command_handler, config_handler, connect_handler, disconnect_handler, race_handler,
    status_handler, terrain_handler, test_handler,
};
pub use client::{spawn_feed_serializer, ws_handler};
