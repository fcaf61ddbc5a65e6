#![allow(dead_code)]

use std::path::{Path, PathBuf};

use inklayer::{ModelSet, PipelineConfig};

pub const RAIN_PROMPT: &str = "a girl with blue hair standing in rain";

/// Write a weights container with `header` as its JSON header and no tensor data.
pub fn write_container(path: &Path, header: &str) {
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    std::fs::write(path, bytes).unwrap();
}

/// Weight files for a run, laid out under one scratch directory.
pub struct Weights {
    pub dir: tempfile::TempDir,
}

impl Weights {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.ckpt"), vec![0x5au8; 4096]).unwrap();
        write_container(
            &dir.path().join("lineart_adapter.safetensors"),
            r#"{"__metadata__":{"control_type":"lineart"},"control.in.weight":{"dtype":"F16","shape":[8],"data_offsets":[0,0]}}"#,
        );
        write_container(
            &dir.path().join("flat_lora.safetensors"),
            r#"{"__metadata__":{"ss_network_alpha":"2"},"unet.attn.lora_down.weight":{"dtype":"F16","shape":[4,320],"data_offsets":[0,0]},"unet.attn.lora_up.weight":{"dtype":"F16","shape":[320,4],"data_offsets":[0,0]}}"#,
        );
        write_container(
            &dir.path().join("flat_embedding.safetensors"),
            r#"{"__metadata__":{"name":"flatstyle"},"emb_params":{"dtype":"F32","shape":[2,768],"data_offsets":[0,0]}}"#,
        );
        std::fs::write(dir.path().join("corrupt.safetensors"), b"\x10\0\0\0\0\0\0\0{broken").unwrap();
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn model_set(&self, overlay: Option<&str>) -> ModelSet {
        ModelSet {
            base_model: self.path("base.ckpt"),
            structural_adapter: self.path("lineart_adapter.safetensors"),
            flat_color_overlay: overlay.map(|name| self.path(name)),
        }
    }
}

pub fn config(width: u32, height: u32, seed: Option<u64>) -> PipelineConfig {
    PipelineConfig {
        width,
        height,
        seed,
        device_budget_bytes: 16 * 1024 * 1024,
        ..PipelineConfig::default()
    }
}
