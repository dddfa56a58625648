//! Resolving `op` monitors' free variables against earlier monitors in the
//! same sensor.
//!
//! Mirrors `rb_sensor_monitor_sort_by_dependencies` in the original, but
//! simplified to the direction the original actually allows: monitors run
//! in the order they're declared, and an `op` monitor may only reference
//! monitors declared *before* it. Forward references and self-references
//! are rejected at parse time by marking the monitor unevaluable, the
//! "preferred" option `spec.md` §9 names, rather than silently evaluating
//! forward refs as absent every pass.

use std::collections::HashMap;

use tracing::warn;

use crate::monitor::Monitor;

/// For each monitor, `Some(indices)` into `monitors` for each of its free
/// variables, in the same order `Monitor::dependency_names` returns them,
/// or `None` if the monitor has no dependencies (non-`op` monitors) or if
/// any dependency failed to resolve to an earlier monitor.
pub fn resolve(monitors: &[Monitor]) -> Vec<Option<Vec<usize>>> {
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    let mut result = Vec::with_capacity(monitors.len());

    for (i, m) in monitors.iter().enumerate() {
        let names = m.dependency_names();
        if names.is_empty() {
            result.push(None);
        } else {
            let mut indices = Vec::with_capacity(names.len());
            let mut ok = true;
            for name in &names {
                match by_name.get(name.as_str()) {
                    Some(&idx) if idx < i => indices.push(idx),
                    Some(_) | None => {
                        warn!(
                            "monitor `{}`: dependency `{}` is not an earlier monitor, marking unevaluable",
                            m.name, name
                        );
                        ok = false;
                        break;
                    }
                }
            }
            result.push(if ok { Some(indices) } else { None });
        }
        by_name.insert(m.name.as_str(), i);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn monitor(v: serde_json::Value) -> Monitor {
        Monitor::from_json(&v, &Map::new()).unwrap()
    }

    #[test]
    fn resolves_backward_references() {
        let monitors = vec![
            monitor(json!({"name": "load_1", "system": "echo 1"})),
            monitor(json!({"name": "load_5", "system": "echo 5"})),
            monitor(json!({"name": "ratio", "op": "load_5 / load_1"})),
        ];
        let resolved = resolve(&monitors);
        assert_eq!(resolved[0], None);
        assert_eq!(resolved[1], None);
        // `Expression::variables()` sorts free variable names, so
        // "load_5 / load_1" yields ["load_1", "load_5"] and the indices
        // are paired positionally: load_1 -> 0, load_5 -> 1.
        assert_eq!(resolved[2], Some(vec![0, 1]));
    }

    #[test]
    fn marks_forward_reference_unevaluable() {
        let monitors = vec![
            monitor(json!({"name": "ratio", "op": "load_5 / load_1"})),
            monitor(json!({"name": "load_1", "system": "echo 1"})),
            monitor(json!({"name": "load_5", "system": "echo 5"})),
        ];
        let resolved = resolve(&monitors);
        assert_eq!(resolved[0], None);
    }

    #[test]
    fn marks_self_reference_unevaluable() {
        let monitors = vec![monitor(json!({"name": "loop", "op": "loop + 1"}))];
        let resolved = resolve(&monitors);
        assert_eq!(resolved[0], None);
    }

    #[test]
    fn partial_match_still_fails_whole_dependency_set() {
        let monitors = vec![
            monitor(json!({"name": "load_1", "system": "echo 1"})),
            monitor(json!({"name": "combo", "op": "load_1 + load_5"})),
        ];
        let resolved = resolve(&monitors);
        assert_eq!(resolved[1], None);
    }
}
