//! Adding graphs of new objects.
//!
//! An [`ObjectGraph`] stages unmanaged objects and the links between
//! them, including cycles. [`Session::add_graph`] attaches everything
//! reachable from a root in one write: rows are created first, then links
//! and list entries are filled in, so every node is created exactly once
//! however many paths lead to it.

use crate::error::{Error, Result};
use crate::object::ObjectRef;
use crate::session::Session;
use anchordb_engine::{EngineError, Identity, RowKey, TableId, Value};
use std::collections::{HashMap, VecDeque};

/// A node in an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Target {
    Node(NodeId),
    Managed { identity: Identity, row: RowKey },
}

impl Target {
    fn managed(object: &ObjectRef) -> Self {
        Self::Managed {
            identity: object.session().identity().clone(),
            row: object.row_key(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    table: String,
    values: Vec<(String, Value)>,
    links: Vec<(String, Target)>,
    lists: Vec<(String, Vec<Target>)>,
}

/// Unmanaged objects waiting to be added.
///
/// Builder methods panic if given a [`NodeId`] that this graph did not
/// hand out.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    nodes: Vec<Node>,
}

impl ObjectGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a new object of `table`.
    pub fn node(&mut self, table: impl Into<String>) -> NodeId {
        self.nodes.push(Node {
            table: table.into(),
            values: Vec::new(),
            links: Vec::new(),
            lists: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Sets a scalar property on a staged object.
    pub fn set(&mut self, node: NodeId, property: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let property = property.into();
        let value = value.into();
        let values = &mut self.nodes[node.0].values;
        match values.iter_mut().find(|(p, _)| *p == property) {
            Some(slot) => slot.1 = value,
            None => values.push((property, value)),
        }
        self
    }

    fn set_link(&mut self, node: NodeId, property: String, target: Target) -> &mut Self {
        let links = &mut self.nodes[node.0].links;
        match links.iter_mut().find(|(p, _)| *p == property) {
            Some(slot) => slot.1 = target,
            None => links.push((property, target)),
        }
        self
    }

    fn push_target(&mut self, node: NodeId, property: String, target: Target) -> &mut Self {
        let lists = &mut self.nodes[node.0].lists;
        match lists.iter_mut().find(|(p, _)| *p == property) {
            Some(slot) => slot.1.push(target),
            None => lists.push((property, vec![target])),
        }
        self
    }

    /// Links `node.property` to another staged object.
    pub fn link(&mut self, node: NodeId, property: impl Into<String>, target: NodeId) -> &mut Self {
        assert!(target.0 < self.nodes.len(), "unknown node {target:?}");
        self.set_link(node, property.into(), Target::Node(target))
    }

    /// Links `node.property` to an object that is already managed.
    pub fn link_existing(&mut self, node: NodeId, property: impl Into<String>, target: &ObjectRef) -> &mut Self {
        self.set_link(node, property.into(), Target::managed(target))
    }

    /// Appends a staged object to the list `node.property`.
    pub fn push(&mut self, node: NodeId, property: impl Into<String>, target: NodeId) -> &mut Self {
        assert!(target.0 < self.nodes.len(), "unknown node {target:?}");
        self.push_target(node, property.into(), Target::Node(target))
    }

    /// Appends an already managed object to the list `node.property`.
    pub fn push_existing(&mut self, node: NodeId, property: impl Into<String>, target: &ObjectRef) -> &mut Self {
        self.push_target(node, property.into(), Target::managed(target))
    }

    /// Returns the number of staged objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Staged objects reachable from `root`, breadth first, each once.
    #[must_use]
    pub fn reachable(&self, root: NodeId) -> Vec<NodeId> {
        if root.0 >= self.nodes.len() {
            return Vec::new();
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        seen[root.0] = true;
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let node = &self.nodes[id.0];
            let targets = node
                .links
                .iter()
                .map(|(_, t)| t)
                .chain(node.lists.iter().flat_map(|(_, ts)| ts.iter()));
            for target in targets {
                if let Target::Node(next) = target {
                    if !seen[next.0] {
                        seen[next.0] = true;
                        queue.push_back(*next);
                    }
                }
            }
        }
        order
    }
}

/// The managed objects created by [`Session::add_graph`].
#[derive(Debug, Clone)]
pub struct AttachedGraph {
    root: ObjectRef,
    objects: HashMap<NodeId, ObjectRef>,
}

impl AttachedGraph {
    /// Returns the object created for the root.
    #[must_use]
    pub fn root(&self) -> &ObjectRef {
        &self.root
    }

    /// Returns the object created for `node`, if it was reachable.
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&ObjectRef> {
        self.objects.get(&node)
    }

    /// Returns the number of objects created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing was created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Session {
    /// Adds every staged object reachable from `root`. Must be called
    /// inside a write.
    ///
    /// On error, rows created so far stay in the write; roll it back to
    /// discard them.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if `root` is not part of `graph`, or a
    ///   link points at an object from another store
    /// - engine errors for unknown tables, type mismatches or duplicate
    ///   primary keys
    pub fn add_graph(&self, graph: &ObjectGraph, root: NodeId) -> Result<AttachedGraph> {
        let order = graph.reachable(root);
        if order.is_empty() {
            return Err(Error::invalid_state(format!("{root:?} is not part of the graph")));
        }
        let identity = self.identity().clone();

        let rows = self.with_batch(|batch| {
            let mut rows: HashMap<NodeId, (TableId, RowKey)> = HashMap::with_capacity(order.len());
            for id in &order {
                let node = &graph.nodes[id.0];
                let table = batch
                    .view()
                    .table_id(&node.table)
                    .ok_or_else(|| EngineError::table_not_found(&node.table))?;
                let row = batch.create_row(table, node.values.iter().cloned())?;
                rows.insert(*id, (table, row));
            }

            let resolve = |target: &Target| -> Result<RowKey> {
                match target {
                    Target::Node(id) => rows
                        .get(id)
                        .map(|(_, row)| *row)
                        .ok_or_else(|| Error::invalid_state(format!("{id:?} was not attached"))),
                    Target::Managed { identity: owner, row } if *owner == identity => Ok(*row),
                    Target::Managed { identity: owner, .. } => Err(Error::invalid_state(format!(
                        "linked object belongs to {owner}, not {identity}"
                    ))),
                }
            };
            for id in &order {
                let node = &graph.nodes[id.0];
                let (table, row) = rows[id];
                for (property, target) in &node.links {
                    batch.set_value(table, row, property, Value::Link(resolve(target)?))?;
                }
                for (property, targets) in &node.lists {
                    for target in targets {
                        let key = resolve(target)?;
                        let len = batch.list(table, row, property)?.len();
                        batch.list_insert(table, row, property, len, key)?;
                    }
                }
            }
            Ok(rows)
        })?;

        let objects: HashMap<NodeId, ObjectRef> = rows
            .into_iter()
            .map(|(id, (table, row))| (id, ObjectRef::new(self.clone(), table, row)))
            .collect();
        let root = objects
            .get(&root)
            .cloned()
            .ok_or_else(|| Error::invalid_state("root was not attached"))?;
        Ok(AttachedGraph { root, objects })
    }
}
