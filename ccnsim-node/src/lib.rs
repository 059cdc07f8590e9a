pub mod content_store;
pub mod decision;
pub mod forwarding;
pub mod pit;
pub mod repository;
pub mod stats;
pub mod strategy;

pub use content_store::*;
pub use decision::*;
pub use forwarding::*;
pub use pit::*;
pub use repository::*;
pub use stats::*;
pub use strategy::*;
