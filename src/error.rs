use thiserror::Error;

/// Fatal structural failures. Geometric degeneracies are not errors in this
/// sense; they are tallied on the model and reported per composition.
#[derive(Debug, Error)]
pub enum BspError {
    /// Node cleanup found a parent whose child links do not point back at the
    /// child being promoted. The tree is corrupt and cannot be repaired.
    #[error("parent node {parent} and child node {child} are unlinked")]
    UnlinkedNode { parent: usize, child: usize },
}
