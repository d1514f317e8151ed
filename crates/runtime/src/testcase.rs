// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Feeds bundled test inputs into the graph's inputs, one case per run.

use model_ir::TestCase;
use std::collections::BTreeMap;
use tensor_core::Tensor;

/// A restartable cursor over a model's bundled test cases.
#[derive(Debug, Clone, Default)]
pub struct TestCaseInputInjector {
    cases: Vec<TestCase>,
    cursor: usize,
}

impl TestCaseInputInjector {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases, cursor: 0 }
    }

    /// Total number of bundled cases, fixed at load time.
    pub fn testcase_num(&self) -> usize {
        self.cases.len()
    }

    /// Cases not yet yielded.
    pub fn remaining(&self) -> usize {
        self.cases.len() - self.cursor
    }

    /// Yields the next case, or `None` once all have been consumed.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&TestCase> {
        let case = self.cases.get(self.cursor)?;
        self.cursor += 1;
        Some(case)
    }

    /// Copies the next case into `inputs` and returns its index.
    pub fn inject(&mut self, inputs: &mut BTreeMap<String, Tensor>) -> Option<usize> {
        let index = self.cursor;
        let case = self.next()?;
        for (name, value) in &case.inputs {
            match inputs.get_mut(name) {
                Some(slot) => slot.copy_from(&value.view()),
                None => {
                    inputs.insert(name.clone(), value.clone());
                }
            }
        }
        tracing::debug!("injected test case {index}");
        Some(index)
    }

    /// Restarts the sequence from the first case.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|i| TestCase {
                inputs: vec![(
                    "x".to_string(),
                    Tensor::from_f32(Shape::vector(2), &[i as f32, -(i as f32)]).unwrap(),
                )],
            })
            .collect()
    }

    #[test]
    fn test_yields_each_case_then_none() {
        let mut inj = TestCaseInputInjector::new(cases(3));
        assert_eq!(inj.testcase_num(), 3);
        for i in 0..3 {
            let case = inj.next().unwrap();
            assert_eq!(case.inputs[0].1.values()[0], i as f32);
        }
        assert!(inj.next().is_none());
        assert!(inj.next().is_none());
        assert_eq!(inj.remaining(), 0);
    }

    #[test]
    fn test_reset_restarts() {
        let mut inj = TestCaseInputInjector::new(cases(2));
        inj.next();
        inj.next();
        inj.reset();
        assert_eq!(inj.remaining(), 2);
        assert_eq!(inj.next().unwrap().inputs[0].1.values()[0], 0.0);
    }

    #[test]
    fn test_inject_overwrites_inputs() {
        let mut inj = TestCaseInputInjector::new(cases(2));
        let mut inputs = BTreeMap::new();
        inputs.insert("x".to_string(), Tensor::zeros(Shape::vector(2)));
        assert_eq!(inj.inject(&mut inputs), Some(0));
        assert_eq!(inj.inject(&mut inputs), Some(1));
        assert_eq!(inputs["x"].values(), &[1.0, -1.0]);
        assert_eq!(inj.inject(&mut inputs), None);
    }

    #[test]
    fn test_no_cases() {
        let mut inj = TestCaseInputInjector::default();
        assert_eq!(inj.testcase_num(), 0);
        assert!(inj.next().is_none());
    }
}
