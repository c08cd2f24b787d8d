//! NonNegativeInteger (NNI) codec: big-endian, 1, 2, 4 or 8 bytes.

/// Encode `value` using the shortest NNI width that holds it.
pub fn encode_nni(value: u64) -> Vec<u8> {
    if value <= u8::MAX as u64 {
        vec![value as u8]
    } else if value <= u16::MAX as u64 {
        (value as u16).to_be_bytes().to_vec()
    } else if value <= u32::MAX as u64 {
        (value as u32).to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

/// Decode an NNI. Only the four legal widths are accepted.
pub fn decode_nni(wire: &[u8]) -> Result<u64, NniError> {
    match wire.len() {
        1 => Ok(wire[0] as u64),
        2 => Ok(u16::from_be_bytes([wire[0], wire[1]]) as u64),
        4 => Ok(u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as u64),
        8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(wire);
            Ok(u64::from_be_bytes(b))
        }
        n => Err(NniError::InvalidLength(n)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NniError {
    #[error("invalid NonNegativeInteger length: {0}")]
    InvalidLength(usize),
}
