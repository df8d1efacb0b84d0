pub mod faults;
pub mod observability;
pub mod telemetry;
