pub mod admission;
pub mod gate;
pub mod message;
