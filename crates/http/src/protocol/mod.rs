//! Protocol types shared between the codec and the connection layer.

mod error;
mod message;

pub use error::FetchError;
pub use message::{Message, PayloadItem, PayloadSize, RequestHead, ResponseHead};
