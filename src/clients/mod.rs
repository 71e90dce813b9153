pub mod mail;

pub use mail::{Dispatch, MailClient};
