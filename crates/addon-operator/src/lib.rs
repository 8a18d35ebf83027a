pub mod error;
pub mod health;
pub mod k8s;
pub mod metrics;
pub mod operator;
pub mod resources;
pub mod version;

pub use operator::{operator, RunOptions};
