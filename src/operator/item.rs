//! Work items produced by notification sources and consumed by the
//! operator's worker pool.

use std::fmt;

use kube::Resource;

/// Coordinates of a registered resource kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Derive the coordinates of a statically typed Kubernetes resource.
    pub fn of<K>() -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new(K::group(&()), K::version(&()), K::kind(&()))
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

/// Uniquely addresses one resource instance for its lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.gvk, self.namespace, self.name)
    }
}

/// The notification that produced an item. Informational only: the queue
/// deduplicates on identity, and handlers re-read the resource anyway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => write!(f, "add"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// One unit of work: a triggering operation plus the identity it concerns.
/// Constructed fresh per notification and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Item {
    operation: Operation,
    identity: ResourceIdentity,
}

impl Item {
    pub fn new(operation: Operation, identity: ResourceIdentity) -> Self {
        Self { operation, identity }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.identity)
    }
}
