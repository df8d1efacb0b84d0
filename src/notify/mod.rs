pub mod broadcaster;
pub mod events;
pub mod store;
pub mod transport;
