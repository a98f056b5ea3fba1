//! Host-facing contract and stdio bridge for native shell integration.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod stdio;

pub use channel::{HostCommandClient, HostCommandServer, HostHandler, command_channel};
pub use contract::{CommandEnvelope, CommandName, EventEnvelope, EventName, ResponseEnvelope};
pub use handler::{BuddyHost, EventSynthesizer, ShellCapturePlatform};
