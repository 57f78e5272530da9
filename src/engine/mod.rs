pub mod dispatch;
pub mod fare;
pub mod lifecycle;
pub mod registry;
pub mod sweeper;
