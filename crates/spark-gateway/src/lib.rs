pub mod connection;
pub mod delivery;
pub mod gate;
pub mod hub;
