pub mod attr;
pub mod decode;
pub mod dump;
pub mod error;
pub mod flow;
pub mod message;
pub mod schema;
pub mod socket;

pub use dump::{DumpSession, Transport};
pub use error::DecodeError;
pub use flow::Flow;
