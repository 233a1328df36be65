// Interface adapters: device protocol, transports and the control/observer network surface.

pub mod http;
pub mod net;
pub mod protocol;
pub mod serial;
pub mod state;
pub mod telemetry;
