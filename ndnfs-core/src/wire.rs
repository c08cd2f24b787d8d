//! Framing: length-prefix (4 bytes LE) + bincode payload of one `Packet`.

use crate::packet::Packet;

pub const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode a packet into a single frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(packet).map_err(FrameEncodeError::Encode)?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge);
    }
    let len = payload.len() as u32;
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("cannot serialize packet: {0}")]
    Encode(#[from] bincode::Error),
    #[error("packet exceeds the frame size limit")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the packet and the number of bytes consumed.
/// Call with a partial buffer; `NeedMore` means try again once more bytes have arrived.
pub fn decode_frame(bytes: &[u8]) -> Result<(Packet, usize), FrameDecodeError> {
    let len = frame_len(bytes)?;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let packet = decode_payload(&bytes[LEN_SIZE..LEN_SIZE + len])?;
    Ok((packet, LEN_SIZE + len))
}

/// Payload length announced by a frame header.
pub fn frame_len(header: &[u8]) -> Result<usize, FrameDecodeError> {
    if header.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge);
    }
    Ok(len as usize)
}

/// Decode a frame body once its header has been stripped.
pub fn decode_payload(payload: &[u8]) -> Result<Packet, FrameDecodeError> {
    bincode::deserialize(payload).map_err(FrameDecodeError::Decode)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("incomplete frame")]
    NeedMore,
    #[error("announced frame length exceeds the limit")]
    TooLarge,
    #[error("malformed packet: {0}")]
    Decode(#[from] bincode::Error),
}
