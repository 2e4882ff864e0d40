//! Foundation module - math types and logging

pub mod logging;
pub mod math;
