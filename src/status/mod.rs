pub mod aggregate;

pub use aggregate::{aggregate_status, ContainerStatus};
