pub mod adapter;
pub mod base;
pub mod safetensors;
pub mod weights;
