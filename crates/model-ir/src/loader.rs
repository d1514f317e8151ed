// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model loading from a JSON graph document or a SafeTensors container.
//!
//! Two encodings are accepted. A SafeTensors container (8-byte header
//! length followed by a JSON header) carries the document in its metadata
//! under `"graph"`, with constants and bundled test inputs stored as
//! `const.<name>` and `testcase.<i>.<input>` tensors. Anything else whose
//! first non-whitespace byte is `{` is read as a bare JSON
//! [`GraphDocument`].
//!
//! With [`LoadConfig::shared_mem`] a path source is memory-mapped and parsed
//! in place instead of being read into an owned buffer.

use crate::document::{GraphDocument, TensorData, SUPPORTED_FORMAT_VERSION};
use crate::graph::{Loaded, ModelGraph, Validated, VarId};
use crate::{ModelError, OpKind};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tensor_core::{Shape, Tensor};

/// Metadata key holding the graph document inside a SafeTensors header.
const GRAPH_KEY: &str = "graph";

/// Metadata key holding the container format version.
const VERSION_KEY: &str = "format_version";

const CONST_PREFIX: &str = "const.";
const TESTCASE_PREFIX: &str = "testcase.";

/// Where model bytes come from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for ModelSource {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for ModelSource {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

impl From<Vec<u8>> for ModelSource {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// Loader options.
#[derive(Debug, Clone, Default)]
pub struct LoadConfig {
    /// Memory-map path sources instead of reading them into memory.
    pub shared_mem: bool,
}

/// One bundled set of input tensors, in declared-input order.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub inputs: Vec<(String, Tensor)>,
}

/// Everything a load produces.
#[derive(Debug)]
pub struct LoadResult {
    pub graph: ModelGraph<Validated>,
    /// Host input tensors keyed by name, zero-filled at load time.
    pub inputs: BTreeMap<String, Tensor>,
    /// Declared outputs in document order.
    pub outputs: Vec<(String, VarId)>,
    pub testcases: Vec<TestCase>,
}

impl LoadResult {
    /// Resolves a declared output name.
    pub fn output_var(&self, name: &str) -> Option<VarId> {
        self.outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }

    pub fn testcase_num(&self) -> usize {
        self.testcases.len()
    }
}

/// Loads models into a [`LoadResult`].
///
/// # Example
/// ```no_run
/// use model_ir::{GraphLoader, LoadConfig, ModelSource};
/// use std::path::PathBuf;
///
/// let loaded = GraphLoader::load(
///     ModelSource::Path(PathBuf::from("model.json")),
///     &LoadConfig::default(),
/// ).unwrap();
/// println!("{}", loaded.graph.summary());
/// ```
pub struct GraphLoader;

impl GraphLoader {
    pub fn load(source: ModelSource, config: &LoadConfig) -> Result<LoadResult, ModelError> {
        match source {
            ModelSource::Bytes(bytes) => Self::load_bytes(&bytes),
            ModelSource::Path(path) if config.shared_mem => {
                let file = std::fs::File::open(&path)?;
                // The mapping lives only for the duration of the parse; every
                // tensor is copied out before it is dropped.
                let mmap = unsafe { memmap2::Mmap::map(&file) }?;
                tracing::debug!("mapped '{}' ({} bytes)", path.display(), mmap.len());
                Self::load_bytes(&mmap)
            }
            ModelSource::Path(path) => {
                let bytes = std::fs::read(&path)?;
                tracing::debug!("read '{}' ({} bytes)", path.display(), bytes.len());
                Self::load_bytes(&bytes)
            }
        }
    }

    /// Parses a model held in memory.
    pub fn load_bytes(bytes: &[u8]) -> Result<LoadResult, ModelError> {
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        let (doc, payloads) = match first {
            None => return Err(ModelError::malformed("empty model")),
            _ if has_safetensors_framing(bytes) => parse_safetensors(bytes)?,
            Some(b'{') => (parse_json(bytes)?, Payloads::default()),
            Some(_) => parse_safetensors(bytes)?,
        };
        let result = build(doc, payloads)?;
        tracing::info!(
            "loaded {} ({} outputs, {} test cases)",
            result.graph.summary(),
            result.outputs.len(),
            result.testcases.len(),
        );
        Ok(result)
    }

    /// Serializes a document into a SafeTensors container.
    ///
    /// Constant values and test cases are moved from the document into the
    /// tensor section; the rest is stored as header metadata.
    pub fn write_container(doc: &GraphDocument) -> Result<Vec<u8>, ModelError> {
        let mut header = doc.clone();
        let mut payloads: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();

        for c in &mut header.constants {
            let values = c.values.take().ok_or_else(|| {
                ModelError::malformed(format!("constant '{}' has no values", c.name))
            })?;
            payloads.push((
                format!("{CONST_PREFIX}{}", c.name),
                c.shape.dims().to_vec(),
                to_le_bytes(&values),
            ));
        }
        for (i, case) in std::mem::take(&mut header.testcases).into_iter().enumerate() {
            for (input, data) in case {
                payloads.push((
                    format!("{TESTCASE_PREFIX}{i}.{input}"),
                    data.shape.dims().to_vec(),
                    to_le_bytes(&data.values),
                ));
            }
        }

        let mut views = Vec::with_capacity(payloads.len());
        for (name, shape, bytes) in &payloads {
            let view =
                safetensors::tensor::TensorView::new(safetensors::Dtype::F32, shape.clone(), bytes)?;
            views.push((name.clone(), view));
        }

        let mut metadata = HashMap::new();
        metadata.insert(GRAPH_KEY.to_string(), serde_json::to_string(&header)?);
        metadata.insert(VERSION_KEY.to_string(), doc.format_version.to_string());
        Ok(safetensors::serialize(views, &Some(metadata))?)
    }
}

// ── Decoding ───────────────────────────────────────────────────────

/// Tensor payloads pulled from a SafeTensors tensor section.
#[derive(Default)]
struct Payloads {
    constants: HashMap<String, TensorData>,
    testcases: BTreeMap<usize, BTreeMap<String, TensorData>>,
}

#[derive(serde::Deserialize)]
struct VersionHeader {
    format_version: Option<u32>,
}

/// Whether `bytes` start with a plausible SafeTensors header: a little-endian
/// length that fits the buffer, followed by `{`.
fn has_safetensors_framing(bytes: &[u8]) -> bool {
    let Some(prefix) = bytes.get(..8) else {
        return false;
    };
    let mut len = [0u8; 8];
    len.copy_from_slice(prefix);
    let n = u64::from_le_bytes(len);
    n > 0 && n <= (bytes.len() - 8) as u64 && bytes[8] == b'{'
}

fn check_version(found: u32) -> Result<(), ModelError> {
    if found != SUPPORTED_FORMAT_VERSION {
        return Err(ModelError::VersionMismatch {
            found,
            supported: SUPPORTED_FORMAT_VERSION,
        });
    }
    Ok(())
}

fn parse_json(bytes: &[u8]) -> Result<GraphDocument, ModelError> {
    let header: VersionHeader = serde_json::from_slice(bytes)?;
    let found = header
        .format_version
        .ok_or_else(|| ModelError::malformed("graph document has no format_version"))?;
    check_version(found)?;
    Ok(serde_json::from_slice(bytes)?)
}

fn parse_safetensors(bytes: &[u8]) -> Result<(GraphDocument, Payloads), ModelError> {
    let (_, header) = safetensors::SafeTensors::read_metadata(bytes)?;
    let meta = header
        .metadata()
        .as_ref()
        .ok_or_else(|| ModelError::malformed("SafeTensors container has no metadata"))?;

    let version = meta
        .get(VERSION_KEY)
        .ok_or_else(|| ModelError::malformed("container metadata has no format_version"))?;
    let found: u32 = version
        .parse()
        .map_err(|_| ModelError::malformed(format!("invalid format_version '{version}'")))?;
    check_version(found)?;

    let graph = meta
        .get(GRAPH_KEY)
        .ok_or_else(|| ModelError::malformed("container metadata has no graph document"))?;
    let doc: GraphDocument = serde_json::from_str(graph)?;

    let st = safetensors::SafeTensors::deserialize(bytes)?;
    let mut payloads = Payloads::default();
    for (name, view) in st.tensors() {
        if view.dtype() != safetensors::Dtype::F32 {
            return Err(ModelError::malformed(format!(
                "tensor '{name}' has dtype {:?}, only F32 is supported",
                view.dtype()
            )));
        }
        let data = TensorData {
            shape: Shape::new(view.shape().to_vec()),
            values: from_le_bytes(view.data()),
        };

        if let Some(cname) = name.strip_prefix(CONST_PREFIX) {
            payloads.constants.insert(cname.to_string(), data);
        } else if let Some(rest) = name.strip_prefix(TESTCASE_PREFIX) {
            let (index, input) = rest
                .split_once('.')
                .and_then(|(i, input)| Some((i.parse::<usize>().ok()?, input)))
                .ok_or_else(|| ModelError::malformed(format!("bad test case tensor name '{name}'")))?;
            payloads
                .testcases
                .entry(index)
                .or_default()
                .insert(input.to_string(), data);
        } else {
            tracing::warn!("ignoring unrecognised container tensor '{name}'");
        }
    }

    Ok((doc, payloads))
}

fn to_le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ── Graph construction ─────────────────────────────────────────────

fn tensor_from(name: &str, data: TensorData) -> Result<Tensor, ModelError> {
    Tensor::from_vec(data.shape, data.values)
        .map_err(|e| ModelError::malformed(format!("tensor '{name}': {e}")))
}

fn build(doc: GraphDocument, mut payloads: Payloads) -> Result<LoadResult, ModelError> {
    let mut graph: ModelGraph<Loaded> = ModelGraph::new(doc.name.clone());

    for decl in &doc.inputs {
        graph.add_input(&decl.name, decl.shape.clone())?;
    }

    for decl in doc.constants {
        let data = match decl.values {
            Some(values) => TensorData {
                shape: decl.shape.clone(),
                values,
            },
            None => payloads.constants.remove(&decl.name).ok_or_else(|| {
                ModelError::malformed(format!("constant '{}' has no values", decl.name))
            })?,
        };
        if data.shape != decl.shape {
            return Err(ModelError::malformed(format!(
                "constant '{}' declared as {} but stored as {}",
                decl.name, decl.shape, data.shape
            )));
        }
        let value = tensor_from(&decl.name, data)?;
        graph.add_const(&decl.name, value)?;
    }

    for decl in &doc.operators {
        let mut kind = OpKind::from_str_loose(&decl.op).ok_or_else(|| {
            ModelError::malformed(format!(
                "operator '{}' has unknown type '{}'",
                decl.name, decl.op
            ))
        })?;
        if let OpKind::AddUpdate(param) = &mut kind {
            *param = decl.add_update_param().map_err(|e| {
                ModelError::malformed(format!("operator '{}' attrs: {e}", decl.name))
            })?;
        }
        let operands: Vec<&str> = decl.inputs.iter().map(String::as_str).collect();
        let op = graph.add_op(&decl.name, kind, &operands, &decl.output)?;
        if let Some(algos) = &decl.algorithms {
            graph.restrict_algorithms(op, algos.clone())?;
        }
    }

    let graph = graph.validate()?;
    let inputs: BTreeMap<String, Tensor> = doc
        .inputs
        .iter()
        .map(|decl| (decl.name.clone(), Tensor::zeros(decl.shape.clone())))
        .collect();

    let mut outputs: Vec<(String, VarId)> = Vec::with_capacity(doc.outputs.len());
    for name in &doc.outputs {
        let var = graph.var_by_name(name).ok_or_else(|| {
            ModelError::malformed(format!("declared output '{name}' is not a graph tensor"))
        })?;
        if outputs.iter().any(|(n, _)| n == name) {
            return Err(ModelError::malformed(format!("output '{name}' declared twice")));
        }
        outputs.push((name.clone(), var));
    }

    let raw_cases: Vec<BTreeMap<String, TensorData>> = if doc.testcases.is_empty() {
        let expected: Vec<usize> = (0..payloads.testcases.len()).collect();
        let found: Vec<usize> = payloads.testcases.keys().copied().collect();
        if found != expected {
            return Err(ModelError::malformed(format!(
                "test case indices {found:?} are not contiguous from 0"
            )));
        }
        payloads.testcases.into_values().collect()
    } else {
        doc.testcases
    };

    let mut testcases = Vec::with_capacity(raw_cases.len());
    for (i, mut case) in raw_cases.into_iter().enumerate() {
        let mut case_inputs = Vec::with_capacity(doc.inputs.len());
        for decl in &doc.inputs {
            let data = case.remove(&decl.name).ok_or_else(|| {
                ModelError::malformed(format!("test case {i} is missing input '{}'", decl.name))
            })?;
            if data.shape != decl.shape {
                return Err(ModelError::malformed(format!(
                    "test case {i} input '{}' has shape {}, expected {}",
                    decl.name, data.shape, decl.shape
                )));
            }
            case_inputs.push((decl.name.clone(), tensor_from(&decl.name, data)?));
        }
        if let Some(extra) = case.keys().next() {
            return Err(ModelError::malformed(format!(
                "test case {i} provides undeclared input '{extra}'"
            )));
        }
        testcases.push(TestCase { inputs: case_inputs });
    }

    Ok(LoadResult {
        graph,
        inputs,
        outputs,
        testcases,
    })
}
