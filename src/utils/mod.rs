//! The `utils` module provides definitions shared across the `datastream`
//! application: the error taxonomy and logging initialisation.

pub mod error;
pub mod logging;
