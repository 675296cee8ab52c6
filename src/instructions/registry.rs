//! Opcode → handler table. Built once per process and immutable afterwards;
//! a lookup miss means an undefined opcode, which the step loop turns into
//! PANIC.

use crate::instructions::base::InstructionHandler;
use crate::instructions::{
    arithmetic, bitwise, branching, comparison, control_flow, memory, register_ops, shifts,
    system,
};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Central registry mapping opcodes to instruction handlers.
pub struct InstructionRegistry {
    handlers: HashMap<u8, Box<dyn InstructionHandler>>,
}

impl InstructionRegistry {
    fn register(&mut self, handler: Box<dyn InstructionHandler>) {
        let opcode = handler.opcode();
        let previous = self.handlers.insert(opcode, handler);
        debug_assert!(previous.is_none(), "duplicate handler for opcode {opcode}");
    }

    #[must_use]
    pub fn handler(&self, opcode: u8) -> Option<&dyn InstructionHandler> {
        self.handlers.get(&opcode).map(Box::as_ref)
    }

    #[must_use]
    pub fn registered_opcodes(&self) -> Vec<u8> {
        let mut opcodes: Vec<u8> = self.handlers.keys().copied().collect();
        opcodes.sort_unstable();
        opcodes
    }

    fn with_all_handlers() -> Self {
        let mut r = Self {
            handlers: HashMap::new(),
        };

        r.register(Box::new(control_flow::Trap));
        r.register(Box::new(control_flow::Fallthrough));
        r.register(Box::new(control_flow::Jump));
        r.register(Box::new(control_flow::JumpInd));
        r.register(Box::new(control_flow::LoadImmJump));
        r.register(Box::new(control_flow::LoadImmJumpInd));
        r.register(Box::new(system::Ecalli));

        r.register(Box::new(arithmetic::Add32));
        r.register(Box::new(arithmetic::Sub32));
        r.register(Box::new(arithmetic::Mul32));
        r.register(Box::new(arithmetic::DivU32));
        r.register(Box::new(arithmetic::DivS32));
        r.register(Box::new(arithmetic::RemU32));
        r.register(Box::new(arithmetic::RemS32));
        r.register(Box::new(arithmetic::Add64));
        r.register(Box::new(arithmetic::Sub64));
        r.register(Box::new(arithmetic::Mul64));
        r.register(Box::new(arithmetic::DivU64));
        r.register(Box::new(arithmetic::DivS64));
        r.register(Box::new(arithmetic::RemU64));
        r.register(Box::new(arithmetic::RemS64));
        r.register(Box::new(arithmetic::AddImm32));
        r.register(Box::new(arithmetic::MulImm32));
        r.register(Box::new(arithmetic::NegAddImm32));
        r.register(Box::new(arithmetic::AddImm64));
        r.register(Box::new(arithmetic::MulImm64));
        r.register(Box::new(arithmetic::NegAddImm64));
        r.register(Box::new(arithmetic::MulUpperSS));
        r.register(Box::new(arithmetic::MulUpperUU));
        r.register(Box::new(arithmetic::MulUpperSU));

        r.register(Box::new(bitwise::And));
        r.register(Box::new(bitwise::Or));
        r.register(Box::new(bitwise::Xor));
        r.register(Box::new(bitwise::AndInv));
        r.register(Box::new(bitwise::OrInv));
        r.register(Box::new(bitwise::Xnor));
        r.register(Box::new(bitwise::AndImm));
        r.register(Box::new(bitwise::OrImm));
        r.register(Box::new(bitwise::XorImm));

        r.register(Box::new(comparison::SetLtU));
        r.register(Box::new(comparison::SetLtS));
        r.register(Box::new(comparison::SetLtUImm));
        r.register(Box::new(comparison::SetLtSImm));
        r.register(Box::new(comparison::SetGtUImm));
        r.register(Box::new(comparison::SetGtSImm));
        r.register(Box::new(comparison::CmovIz));
        r.register(Box::new(comparison::CmovNz));
        r.register(Box::new(comparison::CmovIzImm));
        r.register(Box::new(comparison::CmovNzImm));
        r.register(Box::new(comparison::Min));
        r.register(Box::new(comparison::Max));
        r.register(Box::new(comparison::MinU));
        r.register(Box::new(comparison::MaxU));

        r.register(Box::new(shifts::ShloL32));
        r.register(Box::new(shifts::ShloR32));
        r.register(Box::new(shifts::SharR32));
        r.register(Box::new(shifts::ShloL64));
        r.register(Box::new(shifts::ShloR64));
        r.register(Box::new(shifts::SharR64));
        r.register(Box::new(shifts::RotL32));
        r.register(Box::new(shifts::RotL64));
        r.register(Box::new(shifts::RotR32));
        r.register(Box::new(shifts::RotR64));
        r.register(Box::new(shifts::ShloLImm32));
        r.register(Box::new(shifts::ShloRImm32));
        r.register(Box::new(shifts::SharRImm32));
        r.register(Box::new(shifts::ShloLImm64));
        r.register(Box::new(shifts::ShloRImm64));
        r.register(Box::new(shifts::SharRImm64));
        r.register(Box::new(shifts::RotR32Imm));
        r.register(Box::new(shifts::RotR64Imm));
        r.register(Box::new(shifts::ShloLImmAlt32));
        r.register(Box::new(shifts::ShloRImmAlt32));
        r.register(Box::new(shifts::SharRImmAlt32));
        r.register(Box::new(shifts::ShloLImmAlt64));
        r.register(Box::new(shifts::ShloRImmAlt64));
        r.register(Box::new(shifts::SharRImmAlt64));
        r.register(Box::new(shifts::RotR32ImmAlt));
        r.register(Box::new(shifts::RotR64ImmAlt));

        r.register(Box::new(branching::BranchEqImm));
        r.register(Box::new(branching::BranchNeImm));
        r.register(Box::new(branching::BranchLtUImm));
        r.register(Box::new(branching::BranchLeUImm));
        r.register(Box::new(branching::BranchGeUImm));
        r.register(Box::new(branching::BranchGtUImm));
        r.register(Box::new(branching::BranchLtSImm));
        r.register(Box::new(branching::BranchLeSImm));
        r.register(Box::new(branching::BranchGeSImm));
        r.register(Box::new(branching::BranchGtSImm));
        r.register(Box::new(branching::BranchEq));
        r.register(Box::new(branching::BranchNe));
        r.register(Box::new(branching::BranchLtU));
        r.register(Box::new(branching::BranchLtS));
        r.register(Box::new(branching::BranchGeU));
        r.register(Box::new(branching::BranchGeS));

        r.register(Box::new(register_ops::MoveReg));
        r.register(Box::new(register_ops::Sbrk));
        r.register(Box::new(register_ops::CountSetBits64));
        r.register(Box::new(register_ops::CountSetBits32));
        r.register(Box::new(register_ops::LeadingZeroBits64));
        r.register(Box::new(register_ops::LeadingZeroBits32));
        r.register(Box::new(register_ops::TrailingZeroBits64));
        r.register(Box::new(register_ops::TrailingZeroBits32));
        r.register(Box::new(register_ops::SignExtend8));
        r.register(Box::new(register_ops::SignExtend16));
        r.register(Box::new(register_ops::ZeroExtend16));
        r.register(Box::new(register_ops::ReverseBytes));

        r.register(Box::new(memory::LoadImm64));
        r.register(Box::new(memory::LoadImm));
        r.register(Box::new(memory::LoadU8));
        r.register(Box::new(memory::LoadI8));
        r.register(Box::new(memory::LoadU16));
        r.register(Box::new(memory::LoadI16));
        r.register(Box::new(memory::LoadU32));
        r.register(Box::new(memory::LoadI32));
        r.register(Box::new(memory::LoadU64));
        r.register(Box::new(memory::StoreU8));
        r.register(Box::new(memory::StoreU16));
        r.register(Box::new(memory::StoreU32));
        r.register(Box::new(memory::StoreU64));
        r.register(Box::new(memory::StoreImmU8));
        r.register(Box::new(memory::StoreImmU16));
        r.register(Box::new(memory::StoreImmU32));
        r.register(Box::new(memory::StoreImmU64));
        r.register(Box::new(memory::StoreImmIndU8));
        r.register(Box::new(memory::StoreImmIndU16));
        r.register(Box::new(memory::StoreImmIndU32));
        r.register(Box::new(memory::StoreImmIndU64));
        r.register(Box::new(memory::LoadIndU8));
        r.register(Box::new(memory::LoadIndI8));
        r.register(Box::new(memory::LoadIndU16));
        r.register(Box::new(memory::LoadIndI16));
        r.register(Box::new(memory::LoadIndU32));
        r.register(Box::new(memory::LoadIndI32));
        r.register(Box::new(memory::LoadIndU64));
        r.register(Box::new(memory::StoreIndU8));
        r.register(Box::new(memory::StoreIndU16));
        r.register(Box::new(memory::StoreIndU32));
        r.register(Box::new(memory::StoreIndU64));

        r
    }
}

/// The process-wide registry, built on first use.
#[must_use]
pub fn registry() -> &'static InstructionRegistry {
    static REGISTRY: OnceLock<InstructionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(InstructionRegistry::with_all_handlers)
}
