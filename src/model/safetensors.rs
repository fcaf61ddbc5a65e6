//! Header-only reader for `safetensors` weight containers.
//!
//! Layout: an 8-byte little-endian header length, a JSON header mapping tensor names to
//! `{dtype, shape, data_offsets}` (plus an optional `__metadata__` string map), then raw data.
//! Tensor data is never read here; loaders only need names, shapes and metadata.

use std::{
    collections::BTreeMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::foundation::error::{InklayerError, InklayerResult};

/// Upper bound on the JSON header size; larger values mean a corrupt or hostile file.
const MAX_HEADER_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data_offsets: (usize, usize),
}

#[derive(Clone, Debug)]
pub struct SafetensorsHeader {
    pub path: PathBuf,
    pub tensors: BTreeMap<String, TensorInfo>,
    pub metadata: BTreeMap<String, String>,
    /// Total file size in bytes.
    pub file_len: u64,
}

impl SafetensorsHeader {
    pub fn tensor(&self, name: &str) -> Option<&TensorInfo> {
        self.tensors.get(name)
    }
}

/// Read and validate the header of the container at `path`.
///
/// A missing file is a configuration error; anything structurally wrong with the container is a
/// weight-format error.
pub fn read_header(path: &Path) -> InklayerResult<SafetensorsHeader> {
    let mut f = open_existing(path, "weights")?;
    let file_len = f
        .metadata()
        .with_context(|| format!("stat weights '{}'", path.display()))?
        .len();

    let corrupt = |why: String| {
        InklayerError::weight_format(format!("'{}' is not a valid container: {why}", path.display()))
    };

    if file_len < 8 {
        return Err(corrupt(format!("file too small ({file_len} bytes)")));
    }
    let mut len_bytes = [0u8; 8];
    f.read_exact(&mut len_bytes)
        .with_context(|| format!("read weights '{}'", path.display()))?;
    let header_len = u64::from_le_bytes(len_bytes);
    if header_len > MAX_HEADER_BYTES || 8 + header_len > file_len {
        return Err(corrupt(format!(
            "header length {header_len} exceeds file size {file_len}"
        )));
    }

    let mut header_bytes = vec![0u8; header_len as usize];
    f.read_exact(&mut header_bytes)
        .with_context(|| format!("read weights '{}'", path.display()))?;
    let header_json =
        std::str::from_utf8(&header_bytes).map_err(|e| corrupt(format!("header utf-8: {e}")))?;
    let value: serde_json::Value =
        serde_json::from_str(header_json).map_err(|e| corrupt(format!("header json: {e}")))?;
    let serde_json::Value::Object(obj) = value else {
        return Err(corrupt("header is not a json object".to_string()));
    };

    let data_len = (file_len - 8 - header_len) as usize;
    let mut tensors = BTreeMap::new();
    let mut metadata = BTreeMap::new();

    for (name, entry) in obj {
        if name == "__metadata__" {
            let serde_json::Value::Object(meta) = entry else {
                return Err(corrupt("__metadata__ is not an object".to_string()));
            };
            for (k, v) in meta {
                if let serde_json::Value::String(s) = v {
                    metadata.insert(k, s);
                }
            }
            continue;
        }

        let info = parse_tensor_entry(&entry)
            .ok_or_else(|| corrupt(format!("malformed tensor entry '{name}'")))?;
        let (start, end) = info.data_offsets;
        if start > end || end > data_len {
            return Err(corrupt(format!(
                "tensor '{name}' offsets [{start}, {end}) outside data section of {data_len} bytes"
            )));
        }
        tensors.insert(name, info);
    }

    Ok(SafetensorsHeader {
        path: path.to_path_buf(),
        tensors,
        metadata,
        file_len,
    })
}

/// Open `path`, mapping absence to a configuration error naming `what`.
pub(crate) fn open_existing(path: &Path, what: &str) -> InklayerResult<File> {
    if !path.is_file() {
        return Err(InklayerError::configuration(format!(
            "{what} file not found: '{}'",
            path.display()
        )));
    }
    Ok(File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?)
}

fn parse_tensor_entry(entry: &serde_json::Value) -> Option<TensorInfo> {
    let dtype = entry.get("dtype")?.as_str()?.to_string();
    let shape = entry
        .get("shape")?
        .as_array()?
        .iter()
        .map(|d| d.as_u64().map(|d| d as usize))
        .collect::<Option<Vec<_>>>()?;
    let offsets = entry.get("data_offsets")?.as_array()?;
    if offsets.len() != 2 {
        return None;
    }
    let start = offsets[0].as_u64()? as usize;
    let end = offsets[1].as_u64()? as usize;
    Some(TensorInfo {
        dtype,
        shape,
        data_offsets: (start, end),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/model/safetensors.rs"]
mod tests;
