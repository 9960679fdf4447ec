//! Highway Simulation Library
//!
//! Lane-discipline traffic simulation and a Monte-Carlo jam-probability sweep.

pub mod simulation;
