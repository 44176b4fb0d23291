//! Domain Layer
//!
//! Entities, value objects and the ports the application services depend on.

pub mod entities;
pub mod ports;
pub mod value_objects;
