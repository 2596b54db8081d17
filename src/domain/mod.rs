//! Domain types of the rental flow and the ports it talks through.

pub mod money;
pub mod ports;
pub mod rental;
pub mod role;
pub mod scooter;
pub mod tariff;
