//! Register utilities: MOVE_REG, SBRK heap growth, bit counting, narrow
//! sign/zero extension and byte reversal.

use crate::config::{
    align_to_page, MAX_MEMORY_ADDRESS, OPCODE_COUNT_SET_BITS_32, OPCODE_COUNT_SET_BITS_64,
    OPCODE_LEADING_ZERO_BITS_32, OPCODE_LEADING_ZERO_BITS_64, OPCODE_MOVE_REG,
    OPCODE_REVERSE_BYTES, OPCODE_SBRK, OPCODE_SIGN_EXTEND_16, OPCODE_SIGN_EXTEND_8,
    OPCODE_TRAILING_ZERO_BITS_32, OPCODE_TRAILING_ZERO_BITS_64, OPCODE_ZERO_EXTEND_16,
    PAGE_SIZE,
};
use crate::instructions::base::{parse_two_registers, sign_extend, InstructionHandler};
use crate::types::{InstructionContext, InstructionResult};

// Two-register form: reg_D = op(reg_A).
macro_rules! unary_reg {
    ($name:ident, $opcode:ident, $label:literal, $op:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg_d, reg_a) = parse_two_registers(context.operands);
                context.registers[reg_d as usize] = ($op)(context.registers[reg_a as usize]);
                InstructionResult::cont()
            }
        }
    };
}

unary_reg!(MoveReg, OPCODE_MOVE_REG, "MOVE_REG", |a| a);
unary_reg!(CountSetBits64, OPCODE_COUNT_SET_BITS_64, "COUNT_SET_BITS_64", |a: u64| {
    u64::from(a.count_ones())
});
unary_reg!(CountSetBits32, OPCODE_COUNT_SET_BITS_32, "COUNT_SET_BITS_32", |a: u64| {
    u64::from((a as u32).count_ones())
});
unary_reg!(LeadingZeroBits64, OPCODE_LEADING_ZERO_BITS_64, "LEADING_ZERO_BITS_64", |a: u64| {
    u64::from(a.leading_zeros())
});
unary_reg!(LeadingZeroBits32, OPCODE_LEADING_ZERO_BITS_32, "LEADING_ZERO_BITS_32", |a: u64| {
    u64::from((a as u32).leading_zeros())
});
unary_reg!(TrailingZeroBits64, OPCODE_TRAILING_ZERO_BITS_64, "TRAILING_ZERO_BITS_64", |a: u64| {
    u64::from(a.trailing_zeros())
});
unary_reg!(TrailingZeroBits32, OPCODE_TRAILING_ZERO_BITS_32, "TRAILING_ZERO_BITS_32", |a: u64| {
    u64::from((a as u32).trailing_zeros())
});
unary_reg!(SignExtend8, OPCODE_SIGN_EXTEND_8, "SIGN_EXTEND_8", |a| sign_extend(a, 1));
unary_reg!(SignExtend16, OPCODE_SIGN_EXTEND_16, "SIGN_EXTEND_16", |a| sign_extend(a, 2));
unary_reg!(ZeroExtend16, OPCODE_ZERO_EXTEND_16, "ZERO_EXTEND_16", |a| a & 0xffff);
unary_reg!(ReverseBytes, OPCODE_REVERSE_BYTES, "REVERSE_BYTES", u64::swap_bytes);

/// SBRK: `reg_D` receives the previous heap pointer and the heap grows by
/// `reg_A` bytes, allocating whole pages as the boundary is crossed.
/// `reg_A = 0` queries the pointer; growth past the addressable limit
/// yields 0.
pub struct Sbrk;

impl InstructionHandler for Sbrk {
    fn opcode(&self) -> u8 {
        OPCODE_SBRK
    }
    fn name(&self) -> &'static str {
        "SBRK"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (reg_d, reg_a) = parse_two_registers(context.operands);
        let request = context.registers[reg_a as usize];
        let current = context.ram.heap_pointer();

        if request == 0 {
            context.registers[reg_d as usize] = u64::from(current);
            return InstructionResult::cont();
        }

        let new_pointer = u64::from(current) + request;
        if new_pointer > u64::from(MAX_MEMORY_ADDRESS) {
            context.registers[reg_d as usize] = 0;
            return InstructionResult::cont();
        }
        let new_pointer = new_pointer as u32;

        let next_boundary = align_to_page(current);
        if new_pointer > next_boundary {
            let start_page = next_boundary / PAGE_SIZE;
            let end_page = align_to_page(new_pointer) / PAGE_SIZE;
            context.ram.allocate_pages(start_page, end_page - start_page);
        }
        context.ram.set_heap_pointer(new_pointer);
        context.registers[reg_d as usize] = u64::from(current);
        InstructionResult::cont()
    }
}
