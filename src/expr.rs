//! Arithmetic expressions over named variables — the `op` monitor kind.
//!
//! Backed by `evalexpr`, which plays the role GNU libmatheval plays in the
//! original (`rb_libmatheval.c`): build the tree once, query its free
//! variables without evaluating, then evaluate repeatedly against whatever
//! dependency values this pass produced.

use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value as EvalValue};
use tracing::{error, warn};

use crate::error::EvalError;
use crate::value::{Reduction, Value};

/// A parsed, reusable arithmetic expression.
#[derive(Debug)]
pub struct Expression {
    src: String,
    tree: Node,
}

impl Expression {
    pub fn parse(src: &str) -> Result<Self, EvalError> {
        let tree = evalexpr::build_operator_tree(src).map_err(|source| EvalError::Parse {
            expr: src.to_owned(),
            source,
        })?;
        Ok(Self {
            src: src.to_owned(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.src
    }

    /// The expression's free variable names, queryable without evaluating
    /// it — this is what the dependency resolver uses.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tree.iter_variable_identifiers().map(String::from).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Evaluate this expression against `deps` — a slice of (name, value)
    /// pairs, one per free variable, already resolved by the engine.
    ///
    /// If any dependency is a `Vector`, every vector dependency must share
    /// the same child count; the result is an element-wise `Vector` of
    /// that length, with `reduction` applied (if requested) over its
    /// present elements. If all dependencies are scalars, the result is a
    /// single `Number`. Non-finite results are rejected with a warning.
    pub fn evaluate(
        &self,
        deps: &[(String, Value)],
        reduction: Option<Reduction>,
    ) -> Option<Value> {
        let mut common_len: Option<usize> = None;
        for (name, v) in deps {
            if let Value::Vector { children, .. } = v {
                match common_len {
                    None => common_len = Some(children.len()),
                    Some(len) if len != children.len() => {
                        let err = EvalError::SizeMismatch {
                            a: len,
                            b: children.len(),
                        };
                        error!("op `{}`, operand `{}`: {}", self.src, name, err);
                        return None;
                    }
                    _ => {}
                }
            }
        }

        match common_len {
            Some(len) => {
                let mut children = Vec::with_capacity(len);
                for i in 0..len {
                    children.push(self.evaluate_scalar_at(deps, Some(i)));
                }
                let reduction = reduction
                    .and_then(|r| r.reduce(children.iter().filter_map(|c| *c)));
                Some(Value::Vector {
                    children,
                    reduction,
                })
            }
            None => self
                .evaluate_scalar_at(deps, None)
                .map(Value::Number),
        }
    }

    /// Evaluate at a single vector index (or as a pure scalar if `index`
    /// is `None`). Returns `None` if any required operand's slot at this
    /// index is absent, or if the numeric result isn't finite.
    fn evaluate_scalar_at(&self, deps: &[(String, Value)], index: Option<usize>) -> Option<f64> {
        let mut ctx = HashMapContext::new();
        for (name, v) in deps {
            let scalar = match (v, index) {
                (Value::Vector { children, .. }, Some(i)) => children[i]?,
                (Value::Vector { .. }, None) => return None,
                (other, _) => other.as_f64(),
            };
            ctx.set_value(name.clone(), EvalValue::Float(scalar)).ok()?;
        }
        let result = match self.tree.eval_with_context(&ctx) {
            Ok(v) => v,
            Err(source) => {
                error!("op `{}`: {}", self.src, EvalError::Evaluation(source));
                return None;
            }
        };
        let n = match result {
            EvalValue::Float(f) => f,
            EvalValue::Int(i) => i as f64,
            other => {
                warn!("op `{}` evaluated to a non-numeric result: {:?}", self.src, other);
                return None;
            }
        };
        if !n.is_finite() {
            warn!("op `{}`: {}", self.src, EvalError::NonFinite);
            return None;
        }
        Some(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_free_variables() {
        let e = Expression::parse("100 * load_5").unwrap();
        assert_eq!(e.variables(), vec!["load_5".to_owned()]);

        let e = Expression::parse("load_5 * load_1").unwrap();
        assert_eq!(e.variables(), vec!["load_1".to_owned(), "load_5".to_owned()]);
    }

    #[test]
    fn scalar_math() {
        let e = Expression::parse("100 * load_5").unwrap();
        let deps = vec![("load_5".to_owned(), Value::Number(2.0))];
        assert_eq!(e.evaluate(&deps, None), Some(Value::Number(200.0)));

        let e = Expression::parse("load_5 * load_1").unwrap();
        let deps = vec![
            ("load_5".to_owned(), Value::Number(2.0)),
            ("load_1".to_owned(), Value::Number(3.0)),
        ];
        assert_eq!(e.evaluate(&deps, None), Some(Value::Number(6.0)));
    }

    #[test]
    fn elementwise_with_absence_propagation() {
        let a = Value::Vector {
            children: vec![None, Some(2.0), Some(1.0), Some(0.0)],
            reduction: None,
        };
        let b = Value::Vector {
            children: vec![None, Some(6.0), Some(8.0), Some(10.0)],
            reduction: None,
        };
        let e = Expression::parse("a + b").unwrap();
        let deps = vec![("a".to_owned(), a), ("b".to_owned(), b)];
        let result = e.evaluate(&deps, Some(Reduction::Mean)).unwrap();
        match result {
            Value::Vector {
                children,
                reduction,
            } => {
                assert_eq!(children, vec![None, Some(8.0), Some(9.0), Some(10.0)]);
                assert_eq!(reduction, Some(9.0));
            }
            _ => panic!("expected vector"),
        }
    }

    #[test]
    fn mismatched_vector_lengths_fail() {
        let a = Value::Vector {
            children: vec![Some(1.0), Some(2.0)],
            reduction: None,
        };
        let b = Value::Vector {
            children: vec![Some(1.0), Some(2.0), Some(3.0)],
            reduction: None,
        };
        let e = Expression::parse("a + b").unwrap();
        let deps = vec![("a".to_owned(), a), ("b".to_owned(), b)];
        assert_eq!(e.evaluate(&deps, None), None);
    }

    #[test]
    fn non_finite_result_is_dropped() {
        let e = Expression::parse("a / b").unwrap();
        let deps = vec![
            ("a".to_owned(), Value::Number(1.0)),
            ("b".to_owned(), Value::Number(0.0)),
        ];
        assert_eq!(e.evaluate(&deps, None), None);
    }
}
