//! Generated gRPC client/server code for the node-agent RPC surface, shared
//! by the controller (client) and agent (server) binaries.

#[path = "node_agent.rs"]
mod generated;

pub use generated::{AddressInfo, CleanupInfo, Ping, Pong, Result};
pub use generated::node_agent_client;
pub use generated::node_agent_server;
