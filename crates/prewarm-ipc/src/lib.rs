//! Wire protocol between the `prewarm` launcher and its resident server.

pub mod error;
pub mod fdpass;
pub mod request;
pub mod wire;

pub use error::{Direction, ProtocolError};
pub use fdpass::{DescriptorChannel, LoopbackChannel};
pub use request::{
    EnvMode, Environment, LaunchContext, LaunchRequest, LaunchResult, ReceivedStdio, StdioFds,
};
