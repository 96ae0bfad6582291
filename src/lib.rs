//! Front-end pieces of the WaterWorld sandbox: the headless run modes and
//! the agent worker.

pub mod runner;
pub mod worker;
