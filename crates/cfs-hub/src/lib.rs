pub mod proxy;
pub mod registry;
pub mod server;
pub mod splice;

pub use registry::{ControlMessage, PublishedVolume, Registry};
pub use server::{run, HubState};

pub const DEFAULT_HUB_TOKEN: &str = "dummysecret";
