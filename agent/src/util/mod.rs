pub mod interface_store;
pub mod kernel;
pub mod observer;
pub mod rpc_server;
