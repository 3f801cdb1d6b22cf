//! Order in which plugins are configured

use crate::error::ScanError;
use crate::plugins::Plugin;
use std::collections::{BTreeSet, HashMap};

/// Topologically sorts plugins by their `pass_before` constraints.
///
/// Among plugins free to go next the one with the lowest
/// `(pass_priority, name)` wins, so the order does not depend on how the
/// plugins were registered. Constraints naming unknown plugins are ignored.
pub fn order_plugins<'a>(plugins: &[&'a dyn Plugin]) -> Result<Vec<&'a dyn Plugin>, ScanError> {
    let index: HashMap<&str, usize> = plugins
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name(), i))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    let mut in_degree = vec![0usize; plugins.len()];
    for (i, plugin) in plugins.iter().enumerate() {
        for before in plugin.pass_before() {
            if let Some(&j) = index.get(before) {
                successors[i].push(j);
                in_degree[j] += 1;
            }
        }
    }

    let key = |i: usize| (plugins[i].pass_priority(), plugins[i].name(), i);
    let mut ready: BTreeSet<(u32, &str, usize)> = (0..plugins.len())
        .filter(|&i| in_degree[i] == 0)
        .map(key)
        .collect();

    let mut ordered = Vec::with_capacity(plugins.len());
    while let Some(first) = ready.pop_first() {
        let i = first.2;
        ordered.push(plugins[i]);
        for &j in &successors[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert(key(j));
            }
        }
    }

    if ordered.len() != plugins.len() {
        let stuck: Vec<&str> = (0..plugins.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| plugins[i].name())
            .collect();
        return Err(ScanError::usage(format!(
            "cyclic ordering constraints between plugins: {}",
            stuck.join(", ")
        )));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{PluginContext, PluginRegistry};

    struct Dummy {
        name: &'static str,
        priority: u32,
        before: &'static [&'static str],
    }

    impl Plugin for Dummy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "dummy"
        }

        fn pass_priority(&self) -> u32 {
            self.priority
        }

        fn pass_before(&self) -> &'static [&'static str] {
            self.before
        }

        fn configure(&self, _cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
            Ok(())
        }
    }

    fn names(ordered: &[&dyn Plugin]) -> Vec<&'static str> {
        ordered.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_priority_then_name() {
        let b = Dummy { name: "b", priority: 0x10, before: &[] };
        let a = Dummy { name: "a", priority: 0x10, before: &[] };
        let z = Dummy { name: "z", priority: 0x01, before: &[] };
        let ordered = order_plugins(&[&b, &a, &z]).unwrap();
        assert_eq!(names(&ordered), vec!["z", "a", "b"]);
    }

    #[test]
    fn test_pass_before_overrides_priority() {
        let gcc = Dummy { name: "gcc", priority: 0x10, before: &[] };
        let divine = Dummy { name: "divine", priority: 0x90, before: &["gcc", "missing"] };
        let ordered = order_plugins(&[&gcc, &divine]).unwrap();
        assert_eq!(names(&ordered), vec!["divine", "gcc"]);
    }

    #[test]
    fn test_cycle_is_usage_error() {
        let a = Dummy { name: "a", priority: 0x10, before: &["b"] };
        let b = Dummy { name: "b", priority: 0x10, before: &["a"] };
        let c = Dummy { name: "c", priority: 0x10, before: &[] };
        let Err(err) = order_plugins(&[&a, &b, &c]) else {
            panic!("Expected a cycle error");
        };
        assert!(matches!(err, ScanError::Usage(ref msg) if msg.contains("a, b")));
    }

    #[test]
    fn test_default_registry_order() {
        let registry = PluginRegistry::with_defaults();
        let ordered = order_plugins(&registry.plugins()).unwrap();
        let names = names(&ordered);

        assert_eq!(names[0], "valgrind");
        assert_eq!(names[1], "strace");
        assert_eq!(names.last(), Some(&"shellcheck"));

        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        for tool in ["divine", "symbiotic", "cbmc"] {
            assert!(pos(tool) < pos("gcc"));
        }
        assert!(pos("gcc") < pos("cppcheck"));
        assert!(pos("cppcheck") < pos("clang"));
        assert!(pos("clang") < pos("smatch"));
        assert!(pos("pylint") < pos("shellcheck"));
    }
}
