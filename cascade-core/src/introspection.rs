//! Graph introspection.
//!
//! Every reactive handle exposes the graph node it owns through [`Tracked`].
//! The trees returned here are snapshots: they are built from the current
//! edges and serialize to the same JSON shape as other reactive state
//! inspectors (`{"name": .., "dependencies": [..]}`).

use serde::Serialize;

use crate::collections::{MapKey, ObservableArray, ObservableMap, ObservableObject, ObservableSet};
use crate::graph::{NodeId, NodeKind, Scheduler};
use crate::reactive::{Computed, ObservableValue, Reaction, Runtime};

/// A handle that owns a node in the dependency graph.
pub trait Tracked {
    fn node_id(&self) -> NodeId;

    fn tracked_runtime(&self) -> &Runtime;

    /// The kind of node, or `None` once it has been removed.
    fn node_kind(&self) -> Option<NodeKind> {
        let graph = self.tracked_runtime().graph();
        graph.get(self.node_id()).map(|node| node.kind)
    }
}

macro_rules! impl_tracked {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Tracked for $ty {
                fn node_id(&self) -> NodeId {
                    self.id()
                }

                fn tracked_runtime(&self) -> &Runtime {
                    self.runtime()
                }
            }
        )*
    };
}

impl_tracked!(Reaction, ObservableObject);

impl<T> Tracked for ObservableValue<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn tracked_runtime(&self) -> &Runtime {
        self.runtime()
    }
}

impl<T> Tracked for Computed<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn tracked_runtime(&self) -> &Runtime {
        self.runtime()
    }
}

impl<T> Tracked for ObservableArray<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn tracked_runtime(&self) -> &Runtime {
        self.runtime()
    }
}

impl<K: MapKey, V> Tracked for ObservableMap<K, V> {
    /// The node tracking the key set.
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn tracked_runtime(&self) -> &Runtime {
        self.runtime()
    }
}

impl<T> Tracked for ObservableSet<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn tracked_runtime(&self) -> &Runtime {
        self.runtime()
    }
}

/// What a derivation reads, recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyTree>,
}

/// Who reads an observable, recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserverTree {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub observers: Vec<ObserverTree>,
}

/// Each node is listed once per parent, in first-read order.
fn unique(ids: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

fn dependency_tree(graph: &Scheduler, id: NodeId) -> DependencyTree {
    DependencyTree {
        name: graph.name(id),
        dependencies: unique(graph.dependencies(id))
            .into_iter()
            .map(|dependency| dependency_tree(graph, dependency))
            .collect(),
    }
}

fn observer_tree(graph: &Scheduler, id: NodeId) -> ObserverTree {
    ObserverTree {
        name: graph.name(id),
        observers: unique(graph.observers(id))
            .into_iter()
            .map(|observer| observer_tree(graph, observer))
            .collect(),
    }
}

impl Runtime {
    /// The dependencies of `target`. Observables have none.
    pub fn get_dependency_tree(&self, target: &impl Tracked) -> DependencyTree {
        dependency_tree(&self.graph(), target.node_id())
    }

    /// The observers of `target`. Reactions have none.
    pub fn get_observer_tree(&self, target: &impl Tracked) -> ObserverTree {
        observer_tree(&self.graph(), target.node_id())
    }

    pub fn is_computed(&self, target: &impl Tracked) -> bool {
        target.node_kind() == Some(NodeKind::Computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ObservableOptions;
    use serde_json::json;

    #[test]
    fn dependency_tree_follows_computeds() {
        let runtime = Runtime::new();
        let a = runtime.observable_box_with(1, ObservableOptions::new().name("a"));
        let b = runtime.observable_box_with(2, ObservableOptions::new().name("b"));

        let (left, right) = (a.clone(), b.clone());
        let sum = runtime.computed_with(
            move || left.get() + right.get() + left.get(),
            crate::reactive::ComputedOptions::new().name("sum"),
        );
        let reader = sum.clone();
        let autorun = runtime.autorun_named("print", move || {
            reader.get();
        });

        let tree = runtime.get_dependency_tree(&autorun);
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "name": "print",
                "dependencies": [
                    { "name": "sum", "dependencies": [{ "name": "a" }, { "name": "b" }] }
                ]
            })
        );
        assert_eq!(runtime.get_dependency_tree(&a).dependencies, vec![]);
        assert!(runtime.is_computed(&sum));
        assert!(!runtime.is_computed(&a));
    }

    #[test]
    fn observer_tree_follows_readers() {
        let runtime = Runtime::new();
        let a = runtime.observable_box_with(1, ObservableOptions::new().name("a"));

        let source = a.clone();
        let doubled = runtime.computed_with(
            move || source.get() * 2,
            crate::reactive::ComputedOptions::new().name("doubled"),
        );
        let (first, second) = (doubled.clone(), doubled.clone());
        let _one = runtime.autorun_named("one", move || {
            first.get();
        });
        let _two = runtime.autorun_named("two", move || {
            second.get();
        });

        assert_eq!(
            serde_json::to_string(&runtime.get_observer_tree(&a)).unwrap(),
            r#"{"name":"a","observers":[{"name":"doubled","observers":[{"name":"one"},{"name":"two"}]}]}"#
        );
    }

    #[test]
    fn collections_report_their_atoms() {
        let runtime = Runtime::new();
        let list = runtime.observable_array_with(
            vec![1, 2],
            crate::collections::CollectionOptions::new().name("list"),
        );
        let reader = list.clone();
        let autorun = runtime.autorun_named("sum", move || {
            reader.iter().sum::<i32>();
        });

        assert_eq!(list.node_kind(), Some(NodeKind::Observable));
        assert_eq!(
            runtime.get_dependency_tree(&autorun),
            DependencyTree {
                name: "sum".into(),
                dependencies: vec![DependencyTree {
                    name: "list".into(),
                    dependencies: vec![],
                }],
            }
        );
    }
}
