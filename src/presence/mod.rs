pub mod reconciler;
pub mod record;
pub mod registry;
pub mod store;
pub mod sweeper;
