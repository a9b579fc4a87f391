pub mod config;
pub mod node;
pub mod protocol;
pub mod routing;

pub use config::Config;
pub use node::Node;
pub use protocol::Message;
pub use routing::{NodeEvent, RoutingEngine};
