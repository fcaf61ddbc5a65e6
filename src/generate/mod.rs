pub mod request;
pub mod runner;
pub mod synth;
