//! DeckError: Unified error type for mesh-deck public APIs
//!
//! Every condition that would end an input run is reported through this enum.
//! Errors are returned, never raised by aborting, so that all ranks of a
//! collective phase can leave it at the same point.

use thiserror::Error;

/// Unified error type for mesh-deck operations.
#[derive(Debug, Error)]
pub enum DeckError {
    /// Underlying file system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// An error reported by the reading rank and shared with every other rank.
    #[error("input deck `{path}` could not be read: {reason}")]
    DeckUnreadable { path: String, reason: String },
    /// The deck is structurally broken (duplicate section, bad include, ...).
    #[error("malformed input deck: {0}")]
    Malformed(String),
    /// A parameter line has no key/value separator.
    #[error("line `{line}` cannot be split into a key and a value")]
    KeyValue { line: String },
    /// A key appears twice in the same parameter section.
    #[error("parameter `{key}` given twice in section `{section}`")]
    DuplicateParameter { section: String, key: String },
    /// A parameter exists but does not parse into the requested type.
    #[error("parameter `{key}` = `{value}` is not a valid {expected}")]
    InvalidParameter {
        key: String,
        value: String,
        expected: &'static str,
    },
    /// A line does not match the declared schema.
    #[error("cannot read line `{line}`: {reason}\n  expected: {expected}")]
    LineDefinition {
        line: String,
        expected: String,
        reason: String,
    },
    /// A required section is absent or empty.
    #[error("required section `{0}` is missing or empty")]
    MissingSection(String),
    /// `PROBLEMTYP` names no known problem type.
    #[error("unknown problem type `{0}`")]
    UnknownProblemType(String),
    /// `SHAPEFCT` names no known spatial approximation.
    #[error("unknown shape function type `{0}`")]
    UnknownShape(String),
    /// The problem type cannot be combined with the requested approximation.
    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),
    /// Element type or cell shape unknown to the element registry.
    #[error("unknown element `{element_type} {shape}` in line `{line}`")]
    UnknownElement {
        element_type: String,
        shape: String,
        line: String,
    },
    /// Two elements share a global id.
    #[error("element {0} defined more than once")]
    DuplicateElement(i64),
    /// Two nodes share a global id.
    #[error("node {0} defined more than once")]
    DuplicateNode(i64),
    /// An element references a node that the node section never defines.
    #[error("node {node} referenced by element {element} is not defined in NODE COORDS")]
    MissingNode { node: i64, element: i64 },
    /// A `MAT` line is not of the form `MAT <id> <name>`.
    #[error("invalid material line `{0}`")]
    MalformedMaterial(String),
    /// Two materials share an id.
    #[error("more than one material with 'MAT {0}'")]
    DuplicateMaterial(i32),
    /// A material id is referenced but never defined (or not identified).
    #[error("material 'MAT {id}' with name '{name}' could not be identified")]
    UnknownMaterial { id: i32, name: String },
    /// A condition references a design object that does not exist.
    #[error("{kind} {id} not in range [0:{len}[\n{kind} condition on non existent {kind}?")]
    DesignOutOfRange {
        kind: &'static str,
        id: i64,
        len: usize,
    },
    /// A condition has an empty node cloud.
    #[error("{condition} condition {id} has no nodal cloud")]
    EmptyCondition { condition: String, id: i64 },
    /// More than one kind of multiscale material is active.
    #[error("cannot have more than one multi-scale material kind")]
    MultipleMultiscaleKinds,
    /// A command-line restart step disagrees with the deck.
    #[error("restart flags in input file ({in_file}) and command line ({given}) are non-zero and different")]
    RestartConflict { in_file: i32, given: i32 },
    /// Knot vector input is inconsistent.
    #[error("knot vector of discretization `{dis}`: {reason}")]
    KnotVector { dis: String, reason: String },
    /// A discretization was requested that the problem does not hold.
    #[error("no discretization named `{0}`")]
    UnknownDiscretization(String),
    /// Access to a problem slot that was never created.
    #[error("problem slot {0} does not exist")]
    UnknownProblemSlot(usize),
    /// A mutating operation found a discretization in the wrong state.
    #[error("discretization `{dis}`: {reason}")]
    InvalidDiscretization { dis: String, reason: String },
    /// The outer coupling loop exhausted its iteration budget.
    #[error("outer coupling loop not converged within {itmax} iterations (step {step})")]
    NonConvergence { itmax: usize, step: usize },
    /// Two interface vectors do not share the same dof layout, or a force
    /// targets a dof no rank owns.
    #[error("interface mismatch: {0}")]
    InterfaceMismatch(String),
    /// Message passing failed or returned an unexpected payload.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Graph partitioning failed.
    #[error("partitioning failed: {0}")]
    Partition(String),
    /// Failed to encode or decode serialized data.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl DeckError {
    /// Shorthand for a [`DeckError::CommError`] with a text reason.
    pub fn comm(neighbor: usize, reason: impl Into<String>) -> Self {
        DeckError::CommError {
            neighbor,
            source: reason.into().into(),
        }
    }
}

impl From<serde_json::Error> for DeckError {
    fn from(e: serde_json::Error) -> Self {
        DeckError::Serde(e.to_string())
    }
}
