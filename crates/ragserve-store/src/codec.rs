//! Binary codec for the flat inner-product index file.
//!
//! Layout: 4-byte magic, u32 dimension, u64 count, then `count × dimension`
//! little-endian f32 values. The file mirrors the vectors held in
//! `documents.json`; on restart either file can rebuild the pair.

use ragserve_core::VectorStoreError;

const MAGIC: [u8; 4] = *b"RSIX";

/// Serialize vectors into the flat index format.
pub fn encode_index(dimension: usize, vectors: &[Vec<f32>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + vectors.len() * dimension * 4);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&(dimension as u32).to_le_bytes());
    out.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    for vector in vectors {
        for value in vector {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

/// Deserialize a flat index file into `(dimension, vectors)`.
pub fn decode_index(bytes: &[u8]) -> Result<(usize, Vec<Vec<f32>>), VectorStoreError> {
    if bytes.len() < 16 {
        return Err(VectorStoreError::Init("index file truncated".to_string()));
    }
    if bytes[0..4] != MAGIC {
        return Err(VectorStoreError::Init("bad index magic".to_string()));
    }

    let dimension = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let count = u64::from_le_bytes([
        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    ]) as usize;

    let expected = 16 + count * dimension * 4;
    if bytes.len() != expected {
        return Err(VectorStoreError::Init(format!(
            "index file length {} does not match header ({} vectors of dim {})",
            bytes.len(),
            count,
            dimension
        )));
    }

    let mut vectors = Vec::with_capacity(count);
    let mut offset = 16;
    for _ in 0..count {
        let mut vector = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            let raw = [
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ];
            vector.push(f32::from_le_bytes(raw));
            offset += 4;
        }
        vectors.push(vector);
    }

    Ok((dimension, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let vectors = vec![vec![1.0f32, -2.5, 0.0], vec![3.25, 4.0, 5.5]];
        let bytes = encode_index(3, &vectors);
        let (dim, decoded) = decode_index(&bytes).unwrap();

        assert_eq!(dim, 3);
        assert_eq!(decoded, vectors);
    }

    #[test]
    fn test_empty_index() {
        let bytes = encode_index(1536, &[]);
        let (dim, decoded) = decode_index(&bytes).unwrap();
        assert_eq!(dim, 1536);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_truncated_file_rejected() {
        let err = decode_index(&[1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode_index(2, &[vec![1.0, 2.0]]);
        bytes[0] = b'X';
        let err = decode_index(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut bytes = encode_index(2, &[vec![1.0, 2.0]]);
        bytes.pop();
        assert!(decode_index(&bytes).is_err());
    }
}
