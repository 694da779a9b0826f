mod builder;
mod telemetry;

pub use builder::*;
pub use telemetry::*;

#[cfg(test)]
mod telemetry_test;
