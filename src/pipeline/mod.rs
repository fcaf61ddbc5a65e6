pub mod orchestrator;
pub mod outputs;
