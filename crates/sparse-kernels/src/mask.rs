//! Write masks.

use crate::dtype::Scalar;
use crate::matrix::SparseMatrix;
use crate::vector::SparseVector;

/// How a mask object selects positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// Positions holding a truthy value.
    Value,
    /// Positions holding any value.
    Structure,
    /// Complement of [`MaskKind::Value`].
    ComplementedValue,
    /// Complement of [`MaskKind::Structure`].
    ComplementedStructure,
}

impl MaskKind {
    pub fn complement(self) -> Self {
        match self {
            MaskKind::Value => MaskKind::ComplementedValue,
            MaskKind::Structure => MaskKind::ComplementedStructure,
            MaskKind::ComplementedValue => MaskKind::Value,
            MaskKind::ComplementedStructure => MaskKind::Structure,
        }
    }

    pub fn is_complemented(self) -> bool {
        matches!(
            self,
            MaskKind::ComplementedValue | MaskKind::ComplementedStructure
        )
    }

    /// Whether a position whose mask entry is `entry` takes the new value.
    pub fn allows(self, entry: Option<Scalar>) -> bool {
        let hit = match self {
            MaskKind::Value | MaskKind::ComplementedValue => {
                entry.is_some_and(|v| v.is_truthy())
            }
            MaskKind::Structure | MaskKind::ComplementedStructure => entry.is_some(),
        };
        hit != self.is_complemented()
    }
}

/// A vector used as a write mask.
#[derive(Debug, Clone, Copy)]
pub struct VectorMask<'a> {
    pub vector: &'a SparseVector,
    pub kind: MaskKind,
}

impl<'a> VectorMask<'a> {
    pub fn new(vector: &'a SparseVector, kind: MaskKind) -> Self {
        Self { vector, kind }
    }

    pub fn allows(&self, index: usize) -> bool {
        self.kind.allows(self.vector.get(index))
    }
}

/// A matrix used as a write mask.
#[derive(Debug, Clone, Copy)]
pub struct MatrixMask<'a> {
    pub matrix: &'a SparseMatrix,
    pub kind: MaskKind,
}

impl<'a> MatrixMask<'a> {
    pub fn new(matrix: &'a SparseMatrix, kind: MaskKind) -> Self {
        Self { matrix, kind }
    }

    pub fn allows(&self, row: usize, col: usize) -> bool {
        self.kind.allows(self.matrix.get(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_vs_structure() {
        let zero = Some(Scalar::Int64(0));
        assert!(!MaskKind::Value.allows(zero));
        assert!(MaskKind::Structure.allows(zero));
        assert!(MaskKind::ComplementedValue.allows(zero));
        assert!(!MaskKind::ComplementedStructure.allows(zero));
        assert!(MaskKind::ComplementedStructure.allows(None));
    }
}
