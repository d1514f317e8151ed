// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Parses command-line input literals into named tensors.
//!
//! Accepted forms:
//!
//! | Literal                  | Result                                   |
//! |--------------------------|------------------------------------------|
//! | `x=1,2,3`                | `x`, shape `[3]`                         |
//! | `x:2x2=1,2,3,4`          | `x`, shape `[2, 2]`                      |
//! | `x=@input.json`          | `{"shape": [..], "values": [..]}` or a flat array |
//! | `x:1x3=@input.json`      | flat array from file, reshaped           |

use crate::RuntimeError;
use model_ir::document::TensorData;
use std::path::Path;
use tensor_core::{Shape, Tensor};

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum InputFile {
    Shaped(TensorData),
    Flat(Vec<f32>),
}

fn invalid(detail: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidInput(detail.into())
}

/// Parses one `name[:shape]=values` literal.
pub fn parse_input(literal: &str) -> Result<(String, Tensor), RuntimeError> {
    let (lhs, rhs) = literal
        .split_once('=')
        .ok_or_else(|| invalid(format!("'{literal}' is not of the form name=values")))?;
    let (name, shape) = match lhs.split_once(':') {
        Some((name, dims)) => (name.trim(), Some(parse_shape(dims)?)),
        None => (lhs.trim(), None),
    };
    if name.is_empty() {
        return Err(invalid(format!("'{literal}' has an empty input name")));
    }

    let rhs = rhs.trim();
    let (file_shape, values) = match rhs.strip_prefix('@') {
        Some(path) => read_file(Path::new(path))?,
        None => (None, parse_values(rhs)?),
    };

    let shape = match (shape, file_shape) {
        (Some(s), _) => s,
        (None, Some(s)) => s,
        (None, None) => Shape::vector(values.len()),
    };
    let tensor = Tensor::from_vec(shape, values)
        .map_err(|e| invalid(format!("input '{name}': {e}")))?;
    Ok((name.to_string(), tensor))
}

fn parse_shape(dims: &str) -> Result<Shape, RuntimeError> {
    let dims = dims.trim();
    if dims.is_empty() || dims == "scalar" {
        return Ok(Shape::scalar());
    }
    dims.split(['x', 'X', ','])
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .map_err(|_| invalid(format!("bad dimension '{d}' in shape '{dims}'")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Shape::new)
        .and_then(|shape| match shape.checked_num_elements() {
            Some(_) => Ok(shape),
            None => Err(invalid(format!("shape '{dims}' has too many elements"))),
        })
}

fn parse_values(list: &str) -> Result<Vec<f32>, RuntimeError> {
    let list = list.trim_start_matches('[').trim_end_matches(']');
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|_| invalid(format!("bad value '{}'", v.trim())))
        })
        .collect()
}

fn read_file(path: &Path) -> Result<(Option<Shape>, Vec<f32>), RuntimeError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| invalid(format!("cannot read '{}': {e}", path.display())))?;
    let parsed: InputFile = serde_json::from_str(&text)
        .map_err(|e| invalid(format!("'{}': {e}", path.display())))?;
    Ok(match parsed {
        InputFile::Shaped(data) => (Some(data.shape), data.values),
        InputFile::Flat(values) => (None, values),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal() {
        let (name, t) = parse_input("x=1, 2.5,-3").unwrap();
        assert_eq!(name, "x");
        assert_eq!(t.shape(), &Shape::vector(3));
        assert_eq!(t.values(), &[1.0, 2.5, -3.0]);
    }

    #[test]
    fn test_shaped_literal() {
        let (_, t) = parse_input("w:2x2=[1,2,3,4]").unwrap();
        assert_eq!(t.shape(), &Shape::matrix(2, 2));
    }

    #[test]
    fn test_scalar_literal() {
        let (_, t) = parse_input("s:scalar=7").unwrap();
        assert_eq!(t.shape(), &Shape::scalar());
        assert_eq!(t.values(), &[7.0]);
    }

    #[test]
    fn test_shape_value_count_mismatch() {
        assert!(parse_input("w:2x2=1,2,3").is_err());
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let err = parse_input("x:4294967296x4294967296=1").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidInput(ref m) if m.contains("too many")));
    }

    #[test]
    fn test_malformed_literals() {
        assert!(parse_input("x").is_err());
        assert!(parse_input("=1,2").is_err());
        assert!(parse_input("x=1,two").is_err());
        assert!(parse_input("x:2xq=1,2").is_err());
    }

    #[test]
    fn test_file_literals() {
        let dir = std::env::temp_dir().join("lar_data_parser_test");
        std::fs::create_dir_all(&dir).unwrap();
        let shaped = dir.join("shaped.json");
        std::fs::write(&shaped, r#"{ "shape": [1, 2], "values": [5, 6] }"#).unwrap();
        let flat = dir.join("flat.json");
        std::fs::write(&flat, "[1, 2, 3]").unwrap();

        let (_, t) = parse_input(&format!("a=@{}", shaped.display())).unwrap();
        assert_eq!(t.shape(), &Shape::matrix(1, 2));

        let (_, t) = parse_input(&format!("b:3x1=@{}", flat.display())).unwrap();
        assert_eq!(t.shape(), &Shape::matrix(3, 1));
        assert_eq!(t.values(), &[1.0, 2.0, 3.0]);

        assert!(parse_input("c=@/nonexistent/in.json").is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
