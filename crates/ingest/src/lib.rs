pub mod mapper;
pub mod otlp;
pub mod pubsub;
pub mod server;
pub mod sink;
