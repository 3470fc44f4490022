pub mod cli;
pub mod defense;
pub mod vigil;
