//! Entity identifiers and well-known entity labels.
//!
//! The sink treats [`EntityId`] as an opaque key. The constructors and label
//! constants here exist for producers and for the entity catalog queries,
//! which classify entities by their `type` label.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SinkError};
use crate::types::Labels;

/// Label holding the entity type (see [`EntityType`]).
pub const LABEL_ENTITY_TYPE: &str = "type";
/// Label holding the namespace of namespaced entities.
pub const LABEL_NAMESPACE: &str = "namespace_name";
/// Label holding the pod name of pods and pod containers.
pub const LABEL_POD_NAME: &str = "pod_name";
/// Label holding the node name of nodes and the hosting node of other entities.
pub const LABEL_NODE_NAME: &str = "nodename";
/// Label holding the container name of containers.
pub const LABEL_CONTAINER_NAME: &str = "container_name";

/// An opaque, comparable key identifying a monitored entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a validated entity id.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::InvalidEntityId` if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SinkError::InvalidEntityId {
                reason: "entity id cannot be empty".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Key of a node.
    #[must_use]
    pub fn node(node: &str) -> Self {
        Self(format!("node:{node}"))
    }

    /// Key of a namespace.
    #[must_use]
    pub fn namespace(namespace: &str) -> Self {
        Self(format!("namespace:{namespace}"))
    }

    /// Key of a pod.
    #[must_use]
    pub fn pod(namespace: &str, pod: &str) -> Self {
        Self(format!("namespace:{namespace}/pod:{pod}"))
    }

    /// Key of a container running inside a pod.
    #[must_use]
    pub fn pod_container(namespace: &str, pod: &str, container: &str) -> Self {
        Self(format!("namespace:{namespace}/pod:{pod}/container:{container}"))
    }

    /// Key of a system container running directly on a node.
    #[must_use]
    pub fn node_container(node: &str, container: &str) -> Self {
        Self(format!("node:{node}/container:{container}"))
    }

    /// Key of the whole cluster.
    #[must_use]
    pub fn cluster() -> Self {
        Self("cluster".to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id and returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The kind of entity, as carried in the [`LABEL_ENTITY_TYPE`] label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// A cluster node.
    Node,
    /// A namespace.
    Namespace,
    /// A pod.
    Pod,
    /// A container inside a pod.
    PodContainer,
    /// A system container running directly on a node.
    SystemContainer,
    /// The cluster as a whole.
    Cluster,
}

impl EntityType {
    /// Returns the label value for this type.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Namespace => "ns",
            Self::Pod => "pod",
            Self::PodContainer => "pod_container",
            Self::SystemContainer => "sys_container",
            Self::Cluster => "cluster",
        }
    }

    /// Parses a label value into a type.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "node" => Some(Self::Node),
            "ns" => Some(Self::Namespace),
            "pod" => Some(Self::Pod),
            "pod_container" => Some(Self::PodContainer),
            "sys_container" => Some(Self::SystemContainer),
            "cluster" => Some(Self::Cluster),
            _ => None,
        }
    }

    /// Reads the type from a set of entity labels.
    #[must_use]
    pub fn of(labels: &Labels) -> Option<Self> {
        labels
            .get(LABEL_ENTITY_TYPE)
            .and_then(|value| Self::from_label(value))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
