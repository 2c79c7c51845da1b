use thiserror::Error;

use crate::spatial::NodeId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Leaf capacity must be at least 1, got {0}")]
    InvalidLeafCapacity(usize),

    #[error("Tree optimization requires a leaf capacity of 1, the tree uses {0}")]
    UnsupportedLeafCapacity(usize),

    #[error("The node adapter is already bound to another tree")]
    AdapterAlreadyBound,

    #[error("The object is not stored in the tree")]
    ObjectNotFound,

    #[error("The object is already stored in the tree")]
    ObjectAlreadyPresent,

    #[error("Node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("Node {0} is not a leaf")]
    NotALeaf(NodeId),

    #[error("Tree invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(Box<dyn std::error::Error + Send + Sync>),

    #[error("Deserialization error: {0}")]
    DeserializationError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;
