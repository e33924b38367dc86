//! `stackdemo` core: the uniform response envelope, example domain entities,
//! and queue naming rules. Free of I/O so both the server and tools can share it.

pub mod duration;
pub mod envelope;
pub mod payment;
pub mod queue;
pub mod visitor;

pub use duration::{format_duration, parse_duration, DurationParseError};
pub use envelope::Envelope;
pub use payment::{OrderDirection, OrderError, OrderField, Payment, PaymentOrder, PAYMENT_LIMIT};
pub use queue::{ChannelName, NameError, QueueMessage, TopicName};
pub use visitor::VisitorCount;
