pub mod chat;
pub mod document;
pub mod user;

pub use chat::*;
pub use document::*;
pub use user::*;
