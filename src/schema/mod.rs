//! Schema layer: the shapes the downstream runtime consumes.
//!
//! Field names mirror the runtime's schema exactly; serialization order is
//! handled by the renderer. It owns:
//! - connections and module specs (the init payload)
//! - run-control commands and their addressed payloads
//! - per-module configuration payloads

pub mod cmd;
pub mod conf;
pub mod conn;

pub use cmd::{CmdData, CmdId, Init, RcCommand};
pub use conf::{ModuleConf, Payload};
pub use conn::{ConnectionId, ConnectionRef, ModSpec, Plugin, QueueKind, ServiceType};
