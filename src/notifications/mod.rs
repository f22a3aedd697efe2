pub mod senders;

pub use senders::{Notifier, SenderError};
