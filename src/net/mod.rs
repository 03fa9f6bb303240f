//! Network egress: transport boundary and the packet producer.

pub mod producer;
pub mod transport;

pub use producer::{ConnectionState, NetworkProducer, ProducerConfig, ProducerStats};
pub use transport::{PacketTransport, TcpTransport};
