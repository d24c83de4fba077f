//! Request handlers.

pub mod health;
pub mod jobs;
pub mod upload;
pub mod video;

pub use health::*;
pub use jobs::*;
pub use upload::*;
pub use video::*;
