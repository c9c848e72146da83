//! Partitioned write masks.

use sparse_kernels::MaskKind;

use crate::meta::Meta;
use crate::object::PartitionedObject;

/// A partitioned object used as a mask, with its selection kind.
#[derive(Debug, Clone)]
pub struct Mask {
    object: PartitionedObject,
    kind: MaskKind,
}

impl Mask {
    pub fn new(object: PartitionedObject, kind: MaskKind) -> Self {
        Self { object, kind }
    }

    pub fn object(&self) -> &PartitionedObject {
        &self.object
    }

    pub fn kind(&self) -> MaskKind {
        self.kind
    }

    pub fn meta(&self) -> &Meta {
        self.object.meta()
    }

    /// The same mask selecting the opposite positions.
    pub fn complement(&self) -> Mask {
        Mask {
            object: self.object.clone(),
            kind: self.kind.complement(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::BlockPartition;
    use sparse_kernels::DType;

    #[test]
    fn test_complement_round_trip() {
        let m = PartitionedObject::new_vector(DType::Bool, BlockPartition::trivial(3));
        let mask = m.value_mask();
        assert_eq!(mask.complement().kind(), MaskKind::ComplementedValue);
        assert_eq!(mask.complement().complement().kind(), MaskKind::Value);
        assert_eq!(mask.meta().shape(), &[3]);
    }
}
