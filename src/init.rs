//! Standard program initialization (`Y`): lay out the six memory zones,
//! set page access rights and seed the register file (Gray Paper equations
//! 766-811).

use crate::codec::DecodedProgram;
use crate::config::{
    align_to_page, align_to_zone, ARGS_SEGMENT_START, HALT_ADDRESS, INIT_INPUT_SIZE, PAGE_SIZE,
    STACK_SEGMENT_END, ZONE_SIZE,
};
use crate::parser::Program;
use crate::ram::PagedRam;
use crate::types::{PageAccess, RegisterState};

/// `Y(program, argument)`: decode the instruction blob, check the layout
/// inequality and build the initial `(code, registers, RAM)`. `None` means
/// the program cannot be laid out in a 32-bit space; the caller maps that
/// to PANIC with zero gas consumed.
#[must_use]
pub fn standard_program_init(
    program: &DecodedProgram,
    argument: &[u8],
) -> Option<(Program, RegisterState, PagedRam)> {
    let code = Program::from_blob(&program.code).ok()?;

    let ro_len = program.ro_data.len() as u64;
    let rw_len = program.rw_data.len() as u64;
    let heap_tail = u64::from(program.heap_pages) * u64::from(PAGE_SIZE);
    let stack_len = u64::from(program.stack_size);

    // 5Z + ceilZ(|o|) + ceilZ(|w| + z·P) + ceilZ(s) + I <= 2^32.
    let budget = 5 * u64::from(ZONE_SIZE)
        + zone_ceil(ro_len)
        + zone_ceil(rw_len + heap_tail)
        + zone_ceil(stack_len)
        + u64::from(INIT_INPUT_SIZE);
    if budget > 1 << 32 {
        return None;
    }

    let mut ram = PagedRam::new();

    // Read-only data at the first zone boundary.
    let ro_start = ZONE_SIZE;
    if ro_len > 0 {
        ram.write_unchecked(ro_start, &program.ro_data);
        ram.set_page_access_rights(ro_start, align_to_page(ro_len as u32), PageAccess::Read, false);
    }

    // Read-write data one zone past the read-only region, then the heap
    // tail of `z` extra writable pages.
    let rw_start = 2 * ZONE_SIZE + align_to_zone(ro_len as u32);
    let rw_pages_len = align_to_page(rw_len as u32);
    if rw_len > 0 {
        ram.write_unchecked(rw_start, &program.rw_data);
    }
    if rw_pages_len + heap_tail as u32 > 0 {
        ram.set_page_access_rights(
            rw_start,
            rw_pages_len + heap_tail as u32,
            PageAccess::Write,
            false,
        );
    }
    ram.set_heap_pointer(rw_start + rw_pages_len + heap_tail as u32);

    // Stack grows down from the stack segment end.
    let stack_pages_len = align_to_page(program.stack_size);
    if stack_pages_len > 0 {
        let stack_start = STACK_SEGMENT_END - stack_pages_len;
        ram.set_page_access_rights(stack_start, stack_pages_len, PageAccess::Write, false);
    }

    // Argument data, readable, followed by an equal run of zero pages that
    // stay out of the serialized page map.
    let args_len = argument.len() as u32;
    let args_pages_len = align_to_page(args_len);
    if args_len > 0 {
        ram.write_unchecked(ARGS_SEGMENT_START, argument);
        ram.set_page_access_rights(ARGS_SEGMENT_START, args_pages_len, PageAccess::Read, false);
        ram.set_page_access_rights(
            ARGS_SEGMENT_START + args_pages_len,
            args_pages_len,
            PageAccess::Read,
            true,
        );
    }

    let mut registers: RegisterState = [0; 13];
    registers[0] = u64::from(HALT_ADDRESS);
    registers[1] = u64::from(STACK_SEGMENT_END);
    registers[7] = u64::from(ARGS_SEGMENT_START);
    registers[8] = u64::from(args_len);

    Some((code, registers, ram))
}

fn zone_ceil(size: u64) -> u64 {
    let zone = u64::from(ZONE_SIZE);
    (size + zone - 1) / zone * zone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_blob, DecodedBlob};
    use crate::config::OPCODE_TRAP;

    fn sections(ro: Vec<u8>, rw: Vec<u8>, heap_pages: u32, stack: u32) -> DecodedProgram {
        DecodedProgram {
            ro_data: ro,
            rw_data: rw,
            heap_pages,
            stack_size: stack,
            code: encode_blob(&DecodedBlob {
                code: vec![OPCODE_TRAP],
                bitmask: vec![1],
                jump_table: vec![],
                element_size: 1,
            }),
        }
    }

    #[test]
    fn registers_seed_the_argument_and_stack_pointers() {
        let (_, registers, _) = standard_program_init(&sections(vec![], vec![], 0, 0), b"abc").unwrap();
        assert_eq!(registers[0], u64::from(HALT_ADDRESS));
        assert_eq!(registers[1], u64::from(STACK_SEGMENT_END));
        assert_eq!(registers[7], u64::from(ARGS_SEGMENT_START));
        assert_eq!(registers[8], 3);
        for r in [2, 3, 4, 5, 6, 9, 10, 11, 12] {
            assert_eq!(registers[r], 0);
        }
    }

    #[test]
    fn argument_region_is_readable_not_writable() {
        let (_, _, mut ram) =
            standard_program_init(&sections(vec![], vec![], 0, 0), b"hello").unwrap();
        assert_eq!(ram.read_octets(ARGS_SEGMENT_START, 5).unwrap(), b"hello");
        // Untouched tail of the page reads zero.
        assert_eq!(ram.read_octets(ARGS_SEGMENT_START + 5, 3).unwrap(), vec![0; 3]);
        assert!(ram.write_octets(ARGS_SEGMENT_START, &[1]).is_err());
    }

    #[test]
    fn data_zones_live_at_their_boundaries() {
        let (_, _, mut ram) =
            standard_program_init(&sections(b"RO".to_vec(), b"RW".to_vec(), 1, 4096), b"").unwrap();
        assert_eq!(ram.read_octets(ZONE_SIZE, 2).unwrap(), b"RO");
        assert!(ram.write_octets(ZONE_SIZE, &[0]).is_err());

        let rw_start = 2 * ZONE_SIZE + ZONE_SIZE; // one zone of RO data
        assert_eq!(ram.read_octets(rw_start, 2).unwrap(), b"RW");
        assert!(ram.write_octets(rw_start, b"xx").is_ok());
        // The heap tail page after the RW data is writable zeros.
        assert!(ram.write_octets(rw_start + PAGE_SIZE, &[1]).is_ok());
        assert_eq!(ram.heap_pointer(), rw_start + 2 * PAGE_SIZE);

        // One page of stack below the stack segment end.
        assert!(ram.write_octets(STACK_SEGMENT_END - PAGE_SIZE, &[1]).is_ok());
        assert!(ram.write_octets(STACK_SEGMENT_END - PAGE_SIZE - 1, &[1]).is_err());
    }

    #[test]
    fn oversized_layout_is_rejected() {
        let mut program = sections(vec![], vec![], 0, 0);
        program.stack_size = u32::MAX;
        assert!(standard_program_init(&program, b"").is_none());
    }

    #[test]
    fn argument_padding_pages_stay_out_of_the_page_map(){
        let (_, _, ram) = standard_program_init(&sections(vec![], vec![], 0, 0), b"x").unwrap();
        let map = ram.page_map();
        // One argument data page; its zero-padding twin is excluded.
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].address, ARGS_SEGMENT_START);
        // The padding page is still readable.
        assert!(ram.read_octets(ARGS_SEGMENT_START + PAGE_SIZE, 8).is_ok());
    }
}
