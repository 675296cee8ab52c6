//! Shared builders for tests: assemble deblob-format instruction blobs,
//! Y-format program blobs and service-code preimages from raw parts.

use crate::codec::{encode_blob, encode_fixed_length, encode_variable_length, DecodedBlob};

/// Deblob-format instruction blob from raw code/bitmask/jump-table parts.
#[must_use]
pub fn instruction_blob(code: &[u8], bitmask: &[u8], jump_table: &[u32]) -> Vec<u8> {
    encode_blob(&DecodedBlob {
        code: code.to_vec(),
        bitmask: bitmask.to_vec(),
        jump_table: jump_table.to_vec(),
        element_size: 2,
    })
}

/// Y-format program blob with empty data sections and one page of stack.
#[must_use]
pub fn program_blob(code: &[u8], bitmask: &[u8], jump_table: &[u32]) -> Vec<u8> {
    program_blob_with_sections(code, bitmask, jump_table, &[], &[], 0, 4096)
}

/// Y-format program blob: `E3(|o|) E3(|w|) E2(z) E3(s) o w E4(|c|) c`.
#[must_use]
pub fn program_blob_with_sections(
    code: &[u8],
    bitmask: &[u8],
    jump_table: &[u32],
    ro_data: &[u8],
    rw_data: &[u8],
    heap_pages: u16,
    stack_size: u32,
) -> Vec<u8> {
    let inner = instruction_blob(code, bitmask, jump_table);
    let mut blob = Vec::new();
    blob.extend_from_slice(&encode_fixed_length(ro_data.len() as u64, 3));
    blob.extend_from_slice(&encode_fixed_length(rw_data.len() as u64, 3));
    blob.extend_from_slice(&encode_fixed_length(u64::from(heap_pages), 2));
    blob.extend_from_slice(&encode_fixed_length(u64::from(stack_size), 3));
    blob.extend_from_slice(ro_data);
    blob.extend_from_slice(rw_data);
    blob.extend_from_slice(&encode_fixed_length(inner.len() as u64, 4));
    blob.extend_from_slice(&inner);
    blob
}

/// Service-code preimage: metadata wrapper around a Y-format program blob.
#[must_use]
pub fn service_preimage(metadata: &[u8], program_blob: &[u8]) -> Vec<u8> {
    let mut preimage = encode_variable_length(metadata);
    preimage.extend_from_slice(program_blob);
    preimage
}

/// A minimal program that halts immediately: JUMP_IND through r0, which the
/// initializer seeds with the halt address.
#[must_use]
pub fn halting_program_blob() -> Vec<u8> {
    program_blob(&[crate::config::OPCODE_JUMP_IND, 0x00], &[1, 0], &[])
}
