// Transport abstraction — the network collaborator the engine fetches pages through.

pub mod http_transport;
pub mod traits;
