//! Gray Paper serialization helpers consumed by the engine: natural-number
//! and fixed-length codecs, the deblob program format, the Y-format program
//! sections and the service-code preimage wrapper.

use thiserror::Error;

/// Decoding failure for program-level formats. Surfaces to the marshalling
/// invocation, which maps it to PANIC at zero gas.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated program blob")]
    Truncated,
    #[error("invalid natural-number encoding")]
    BadNatural,
    #[error("opcode bitmask shorter than code")]
    BadBitmask,
}

/// A decoded value together with the number of bytes consumed.
#[derive(Clone, Debug)]
pub struct Decoded<T> {
    pub value: T,
    pub consumed: usize,
}

impl<T> Decoded<T> {
    #[must_use]
    pub const fn new(value: T, consumed: usize) -> Self {
        Self { value, consumed }
    }
}

// ============================================================================
// Natural numbers (Gray Paper equations 30-38)
// ============================================================================

/// Decode a variable-length natural number.
#[must_use]
pub fn decode_natural(data: &[u8]) -> Option<Decoded<u64>> {
    let first = *data.first()?;
    if first == 0 {
        return Some(Decoded::new(0, 1));
    }
    if first == 0xff {
        let tail = data.get(1..9)?;
        return Some(Decoded::new(
            u64::from_le_bytes(tail.try_into().ok()?),
            9,
        ));
    }
    if first < 0x80 {
        return Some(Decoded::new(u64::from(first), 1));
    }

    // Prefix byte encodes l extra bytes: 2^8 - 2^(8-l) <= first.
    let mut l = 0usize;
    for candidate in 1..8usize {
        let min_prefix = 256u64 - (1 << (8 - candidate));
        let max_prefix = 256u64 - (1 << (8 - candidate - 1)) - 1;
        if (u64::from(first)) >= min_prefix && (u64::from(first)) <= max_prefix {
            l = candidate;
            break;
        }
    }
    if l == 0 {
        return None;
    }
    let suffix = data.get(1..1 + l)?;
    let mut low: u64 = 0;
    for (i, &b) in suffix.iter().enumerate() {
        low |= u64::from(b) << (i * 8);
    }
    let prefix_base = 256u64 - (1 << (8 - l));
    let high = (u64::from(first) - prefix_base) << (8 * l);
    Some(Decoded::new(high | low, 1 + l))
}

/// Encode a natural number. Inverse of [`decode_natural`].
#[must_use]
pub fn encode_natural(value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    if value < 0x80 {
        return vec![value as u8];
    }
    if value >= 1 << 56 {
        let mut out = vec![0xff];
        out.extend_from_slice(&value.to_le_bytes());
        return out;
    }

    let mut l = 1usize;
    while value >= 1 << (7 * (l + 1)) {
        l += 1;
    }
    let prefix = (256u64 - (1 << (8 - l))) + (value >> (8 * l));
    let mut out = vec![prefix as u8];
    out.extend_from_slice(&value.to_le_bytes()[..l]);
    out
}

// ============================================================================
// Fixed- and variable-length terms
// ============================================================================

/// Decode a little-endian fixed-length value (1-8 bytes).
#[must_use]
pub fn decode_fixed_length(data: &[u8], length: usize) -> Option<Decoded<u64>> {
    let bytes = data.get(..length)?;
    let mut value: u64 = 0;
    for (i, &b) in bytes.iter().take(8).enumerate() {
        value |= u64::from(b) << (i * 8);
    }
    Some(Decoded::new(value, length))
}

/// Encode a value as little-endian fixed length; wraps modulo 2^(8*length).
#[must_use]
pub fn encode_fixed_length(value: u64, length: usize) -> Vec<u8> {
    let le = value.to_le_bytes();
    (0..length).map(|i| le.get(i).copied().unwrap_or(0)).collect()
}

/// Decode a length-prefixed byte string: `encode(len) ‖ data`.
#[must_use]
pub fn decode_variable_length(data: &[u8]) -> Option<Decoded<Vec<u8>>> {
    let len = decode_natural(data)?;
    let start = len.consumed;
    let end = start.checked_add(len.value as usize)?;
    let bytes = data.get(start..end)?;
    Some(Decoded::new(bytes.to_vec(), end))
}

/// Encode a length-prefixed byte string.
#[must_use]
pub fn encode_variable_length(data: &[u8]) -> Vec<u8> {
    let mut out = encode_natural(data.len() as u64);
    out.extend_from_slice(data);
    out
}

/// Decode a length-prefixed sequence with a caller-supplied element decoder.
pub fn decode_variable_sequence<T, F>(data: &[u8], mut element: F) -> Option<Decoded<Vec<T>>>
where
    F: FnMut(&[u8]) -> Option<Decoded<T>>,
{
    let len = decode_natural(data)?;
    let mut rest = data.get(len.consumed..)?;
    let mut out = Vec::with_capacity(len.value as usize);
    for _ in 0..len.value {
        let item = element(rest)?;
        rest = rest.get(item.consumed..)?;
        out.push(item.value);
    }
    Some(Decoded::new(out, data.len() - rest.len()))
}

// ============================================================================
// Program blob (deblob format, Gray Paper §7.1)
// ============================================================================

/// The three sections of a program blob:
/// `E(|j|) ‖ E1(z) ‖ E(|c|) ‖ j ‖ c ‖ k` with `k` packed one bit per code byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedBlob {
    pub code: Vec<u8>,
    /// Unpacked to one byte (0/1) per code byte; `|bitmask| = |code|`.
    pub bitmask: Vec<u8>,
    pub jump_table: Vec<u32>,
    /// Octets per jump-table entry in the wire form.
    pub element_size: usize,
}

/// Decode a program blob into `(code, bitmask, jump_table)`.
pub fn decode_blob(blob: &[u8]) -> Result<DecodedBlob, DecodeError> {
    let jump_len = decode_natural(blob).ok_or(DecodeError::BadNatural)?;
    let mut offset = jump_len.consumed;

    let element_size = *blob.get(offset).ok_or(DecodeError::Truncated)? as usize;
    offset += 1;

    let code_len = decode_natural(blob.get(offset..).ok_or(DecodeError::Truncated)?)
        .ok_or(DecodeError::BadNatural)?;
    offset += code_len.consumed;
    let code_len = code_len.value as usize;

    let mut jump_table = Vec::with_capacity(jump_len.value as usize);
    for _ in 0..jump_len.value {
        let entry = blob
            .get(offset..offset + element_size)
            .ok_or(DecodeError::Truncated)?;
        let mut value: u32 = 0;
        for (i, &b) in entry.iter().take(4).enumerate() {
            value |= u32::from(b) << (i * 8);
        }
        jump_table.push(value);
        offset += element_size;
    }

    let code = blob
        .get(offset..offset + code_len)
        .ok_or(DecodeError::Truncated)?
        .to_vec();
    offset += code_len;

    // The trailing section packs one bit per code byte, LSB first.
    let packed = blob.get(offset..).unwrap_or(&[]);
    if packed.len() * 8 < code_len {
        return Err(DecodeError::BadBitmask);
    }
    let mut bitmask = vec![0u8; code_len];
    for (i, bit) in bitmask.iter_mut().enumerate() {
        *bit = (packed[i / 8] >> (i % 8)) & 1;
    }

    Ok(DecodedBlob {
        code,
        bitmask,
        jump_table,
        element_size,
    })
}

/// Encode a blob; inverse of [`decode_blob`]. Used by tests and by refine
/// guests assembled from in-memory programs.
#[must_use]
pub fn encode_blob(decoded: &DecodedBlob) -> Vec<u8> {
    let element_size = decoded.element_size.max(1);
    let mut out = encode_natural(decoded.jump_table.len() as u64);
    out.push(element_size as u8);
    out.extend_from_slice(&encode_natural(decoded.code.len() as u64));
    for &entry in &decoded.jump_table {
        out.extend_from_slice(&encode_fixed_length(u64::from(entry), element_size));
    }
    out.extend_from_slice(&decoded.code);
    let mut packed = vec![0u8; (decoded.code.len() + 7) / 8];
    for (i, &bit) in decoded.bitmask.iter().take(decoded.code.len()).enumerate() {
        if bit != 0 {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    out.extend_from_slice(&packed);
    out
}

// ============================================================================
// Program sections (Y format, Gray Paper §7.2)
// ============================================================================

/// Sections consumed by the standard program initialization:
/// `E3(|o|) ‖ E3(|w|) ‖ E2(z) ‖ E3(s) ‖ o ‖ w ‖ E4(|c|) ‖ c`.
#[derive(Clone, Debug, Default)]
pub struct DecodedProgram {
    pub ro_data: Vec<u8>,
    pub rw_data: Vec<u8>,
    /// Extra writable pages past the read-write data (`z`).
    pub heap_pages: u32,
    /// Stack size in bytes (`s`).
    pub stack_size: u32,
    /// The inner instruction blob, itself in deblob format.
    pub code: Vec<u8>,
}

/// Decode the Y-format program sections.
pub fn decode_program(blob: &[u8]) -> Result<DecodedProgram, DecodeError> {
    fn take(blob: &[u8], offset: &mut usize, len: usize) -> Result<u64, DecodeError> {
        let d = decode_fixed_length(blob.get(*offset..).ok_or(DecodeError::Truncated)?, len)
            .ok_or(DecodeError::Truncated)?;
        *offset += len;
        Ok(d.value)
    }

    let mut offset = 0usize;
    let ro_len = take(blob, &mut offset, 3)? as usize;
    let rw_len = take(blob, &mut offset, 3)? as usize;
    let heap_pages = take(blob, &mut offset, 2)? as u32;
    let stack_size = take(blob, &mut offset, 3)? as u32;

    let ro_data = blob
        .get(offset..offset + ro_len)
        .ok_or(DecodeError::Truncated)?
        .to_vec();
    offset += ro_len;
    let rw_data = blob
        .get(offset..offset + rw_len)
        .ok_or(DecodeError::Truncated)?
        .to_vec();
    offset += rw_len;

    let code_len = take(blob, &mut offset, 4)? as usize;
    let code = blob
        .get(offset..offset + code_len)
        .ok_or(DecodeError::Truncated)?
        .to_vec();

    Ok(DecodedProgram {
        ro_data,
        rw_data,
        heap_pages,
        stack_size,
        code,
    })
}

/// Unwrap a service-code preimage, `E(|m|) ‖ m ‖ code_blob`, returning the
/// metadata and the Y-format program sections it carries.
pub fn decode_program_from_preimage(
    preimage: &[u8],
) -> Result<(Vec<u8>, DecodedProgram), DecodeError> {
    let metadata = decode_variable_length(preimage).ok_or(DecodeError::Truncated)?;
    let program = decode_program(&preimage[metadata.consumed..])?;
    Ok((metadata.value, program))
}

/// Skip a preimage's metadata wrapper, returning the Y-format program blob
/// that follows it.
pub fn strip_preimage_metadata(preimage: &[u8]) -> Result<&[u8], DecodeError> {
    let metadata = decode_variable_length(preimage).ok_or(DecodeError::Truncated)?;
    Ok(&preimage[metadata.consumed..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_single_byte_values() {
        assert_eq!(encode_natural(0), vec![0]);
        assert_eq!(encode_natural(1), vec![1]);
        assert_eq!(encode_natural(127), vec![127]);
        for v in [0u64, 1, 63, 127] {
            let d = decode_natural(&encode_natural(v)).unwrap();
            assert_eq!((d.value, d.consumed), (v, 1));
        }
    }

    #[test]
    fn natural_multi_byte_values() {
        for v in [128u64, 255, 256, 1024, 0xffff, 1 << 21, (1 << 35) + 7, (1 << 56) - 1] {
            let enc = encode_natural(v);
            let d = decode_natural(&enc).unwrap();
            assert_eq!(d.value, v, "value {v:#x}");
            assert_eq!(d.consumed, enc.len());
        }
    }

    #[test]
    fn natural_full_width_uses_nine_bytes() {
        let enc = encode_natural(u64::MAX);
        assert_eq!(enc.len(), 9);
        assert_eq!(enc[0], 0xff);
        assert_eq!(decode_natural(&enc).unwrap().value, u64::MAX);
    }

    #[test]
    fn natural_rejects_truncation() {
        let mut enc = encode_natural(1 << 20);
        enc.pop();
        assert!(decode_natural(&enc).is_none());
    }

    #[test]
    fn fixed_length_wraps() {
        assert_eq!(encode_fixed_length(0x1_0203, 2), vec![0x03, 0x02]);
        assert_eq!(decode_fixed_length(&[0x03, 0x02], 2).unwrap().value, 0x0203);
    }

    #[test]
    fn blob_round_trip() {
        let blob = DecodedBlob {
            code: vec![0x00, 0x01, 0x28, 0x05, 0x00],
            bitmask: vec![1, 1, 1, 0, 0],
            jump_table: vec![2, 4],
            element_size: 2,
        };
        let decoded = decode_blob(&encode_blob(&blob)).unwrap();
        assert_eq!(decoded.code, blob.code);
        assert_eq!(decoded.bitmask, blob.bitmask);
        assert_eq!(decoded.jump_table, blob.jump_table);
    }

    #[test]
    fn blob_decode_rejects_short_bitmask() {
        let blob = DecodedBlob {
            code: vec![0; 16],
            bitmask: vec![1; 16],
            jump_table: vec![],
            element_size: 1,
        };
        let mut encoded = encode_blob(&blob);
        encoded.pop();
        assert_eq!(decode_blob(&encoded), Err(DecodeError::BadBitmask));
    }

    #[test]
    fn program_sections_round_trip() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&encode_fixed_length(3, 3)); // |o|
        blob.extend_from_slice(&encode_fixed_length(2, 3)); // |w|
        blob.extend_from_slice(&encode_fixed_length(4, 2)); // z
        blob.extend_from_slice(&encode_fixed_length(4096, 3)); // s
        blob.extend_from_slice(b"abc");
        blob.extend_from_slice(b"xy");
        blob.extend_from_slice(&encode_fixed_length(1, 4)); // |c|
        blob.push(0x00);

        let program = decode_program(&blob).unwrap();
        assert_eq!(program.ro_data, b"abc");
        assert_eq!(program.rw_data, b"xy");
        assert_eq!(program.heap_pages, 4);
        assert_eq!(program.stack_size, 4096);
        assert_eq!(program.code, vec![0x00]);
    }

    #[test]
    fn variable_sequences_thread_the_element_decoder() {
        let mut data = encode_natural(3);
        for value in [7u64, 300, 9] {
            data.extend_from_slice(&encode_natural(value));
        }
        let decoded = decode_variable_sequence(&data, decode_natural).unwrap();
        assert_eq!(decoded.value, vec![7, 300, 9]);
        assert_eq!(decoded.consumed, data.len());
    }

    #[test]
    fn preimage_unwraps_metadata() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&encode_fixed_length(0, 3));
        inner.extend_from_slice(&encode_fixed_length(0, 3));
        inner.extend_from_slice(&encode_fixed_length(0, 2));
        inner.extend_from_slice(&encode_fixed_length(0, 3));
        inner.extend_from_slice(&encode_fixed_length(0, 4));

        let mut preimage = encode_variable_length(b"meta");
        preimage.extend_from_slice(&inner);
        let (metadata, program) = decode_program_from_preimage(&preimage).unwrap();
        assert_eq!(metadata, b"meta");
        assert!(program.code.is_empty());
    }
}
