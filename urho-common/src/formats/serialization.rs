//! Binary serialization trait for fixed-size chunk headers.
//!
//! Every fixed-size record in the model format implements
//! `BinarySerializable` so generic code (writers, readers, tests) can handle
//! them uniformly while each type keeps its own `to_bytes()` returning a
//! fixed-size array.

/// Trait for binary-serializable fixed-size records.
///
/// The trait returns `Vec<u8>` because associated consts cannot size an
/// array in a return type yet. Use the type-specific `to_bytes()` where the
/// concrete type is known.
pub trait BinarySerializable: Sized {
    /// Size of the serialized record in bytes.
    const SIZE: usize;

    /// Serialize to bytes.
    fn serialize(&self) -> Vec<u8>;

    /// Deserialize from bytes.
    ///
    /// Returns `None` if the byte slice is too short.
    fn deserialize(bytes: &[u8]) -> Option<Self>;
}

impl BinarySerializable for super::VertexBufferHeader {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for super::IndexBufferHeader {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for super::LodLevelRecord {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{IndexBufferHeader, LodLevelRecord, VertexBufferHeader};

    fn check_size<T: BinarySerializable>(value: &T) {
        assert_eq!(value.serialize().len(), T::SIZE);
        assert!(T::deserialize(&value.serialize()[..T::SIZE - 1]).is_none());
    }

    #[test]
    fn test_serialized_sizes_match_declared() {
        check_size(&VertexBufferHeader::new(8, 3));
        check_size(&IndexBufferHeader::new(36, 2));
        check_size(&LodLevelRecord::triangles(0.0, 0, 0, 0, 36));
    }

    #[test]
    fn test_trait_matches_type_specific_bytes() {
        let header = IndexBufferHeader::new(6, 4);
        assert_eq!(header.serialize(), header.to_bytes().to_vec());
        assert_eq!(IndexBufferHeader::deserialize(&header.serialize()), Some(header));
    }
}
