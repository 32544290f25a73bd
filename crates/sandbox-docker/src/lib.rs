mod config;
mod factory;
mod prerequisites;
mod sandbox;

pub use config::DockerConfig;
pub use factory::{DockerFactory, SANDBOX_LABEL};
pub use sandbox::DockerSandbox;
