//! Message queue plumbing for nsqd.
//!
//! - [`protocol`]: the TCP wire codec used by consumers
//! - [`consumer`]: subscription management and delivery policy
//! - [`publisher`]: the [`Publisher`](crate::traits::Publisher) over nsqd's HTTP API
//! - [`simple_process`]: the handler that logs messages from the demo topic

pub mod consumer;
pub mod protocol;
pub mod publisher;
pub mod simple_process;

pub use consumer::{ConsumerConfig, ConsumerManager, DeliveryPolicy, MessageHandler};
pub use protocol::{Command, Frame, MessageId, NsqCodec, NsqMessage, ProtocolError};
pub use publisher::NsqPublisher;
pub use simple_process::SimpleProcess;
