//! Type definitions

pub mod import;
pub mod messages;
pub mod reference;
pub mod user;

pub use import::*;
pub use messages::*;
pub use reference::*;
pub use user::*;
