//! Instruction execution.
//!
//! A run pushes the return sentinel and steps from instruction 0 until a
//! `retn` pops it back. Each step returns the next program counter:
//! `Some(pc + 1)` for straight-line code, the target index for a taken
//! branch, `None` once the procedure has returned.

use tracing::{debug, trace, warn};
use vm86_compiler::{
    AddressOp, Condition, ImmOp, IndexOp, Instruction, LoadOp, Memory, PairOp, Procedure, RegOp,
    StoreOp, TripleOp, WideOp,
};
use vm86_types::layout::{code_address, SENTINEL_RETURN};
use vm86_types::{flags, Reg};

use crate::error::{EvalError, EvalResult};
use crate::machine::Machine;

/// Flags written by `cmp a, b`. The previous flags are discarded.
pub fn compare(a: u32, b: u32) -> u32 {
    if a == b {
        flags::ZF
    } else if a < b {
        flags::CF | flags::SF
    } else {
        0
    }
}

impl Machine {
    // ══════════════════════════════════════════════════════════════════════
    // Run loop
    // ══════════════════════════════════════════════════════════════════════

    /// Execute `proc` until it returns.
    pub fn run(&mut self, proc: &Procedure) -> EvalResult<()> {
        self.execute(proc, None).map(|_| ())
    }

    /// Execute `proc`, failing with [`EvalError::BudgetExhausted`] after
    /// `budget` instructions. Returns the number of instructions executed.
    pub fn run_with_budget(&mut self, proc: &Procedure, budget: u64) -> EvalResult<u64> {
        self.execute(proc, Some(budget))
    }

    fn execute(&mut self, proc: &Procedure, budget: Option<u64>) -> EvalResult<u64> {
        debug!(procedure = proc.name(), ?budget, "run");
        self.push(SENTINEL_RETURN)?;

        let mut steps = 0u64;
        let mut pc = Some(0);
        while let Some(index) = pc {
            if index >= proc.len() {
                // Fell through the last instruction without a `retn`.
                warn!(procedure = proc.name(), "run: ran off the end");
                break;
            }
            if budget.is_some_and(|limit| steps >= limit) {
                return Err(EvalError::BudgetExhausted(steps));
            }
            pc = self.step(proc, index)?;
            steps += 1;
        }

        debug!(procedure = proc.name(), steps, "run: done");
        Ok(steps)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Single step
    // ══════════════════════════════════════════════════════════════════════

    /// Execute instruction `pc` of `proc` and return the next program counter.
    pub fn step(&mut self, proc: &Procedure, pc: usize) -> EvalResult<Option<usize>> {
        let insn = proc
            .get(pc)
            .ok_or(EvalError::BadJumpTarget(code_address(pc)))?;
        trace!(pc, %insn, "step");
        let next = Some(pc + 1);

        match insn {
            Instruction::Retn => {
                let address = self.pop()?;
                if address != SENTINEL_RETURN {
                    return Err(EvalError::CorruptReturn(address));
                }
                return Ok(None);
            }

            Instruction::Call { target } => {
                // Cloned so the host function can borrow the machine mutably.
                let f = self
                    .function(target)
                    .ok_or_else(|| EvalError::UnresolvedCall(target.clone()))?;
                f(self)?;
            }

            Instruction::Reg { op, r0 } => {
                let value = self.registers.value(*r0);
                match op {
                    RegOp::Push => self.push(value)?,
                    RegOp::Pop => {
                        let word = self.pop()?;
                        self.registers.set(*r0, word);
                    }
                    RegOp::Not => self.registers.set(*r0, !value),
                    RegOp::Inc => self.registers.set(*r0, value.wrapping_add(1)),
                    RegOp::Dec => self.registers.set(*r0, value.wrapping_sub(1)),
                    RegOp::Jump(cond) => return self.branch(proc, *cond, value, next),
                }
            }

            Instruction::Imm { op, v0 } => match op {
                ImmOp::Push => self.push(*v0)?,
                ImmOp::Jump(cond) => return self.branch(proc, *cond, *v0, next),
            },

            Instruction::RegReg { op, r0, r1 } => {
                let src = self.registers.value(*r1);
                self.pair(*op, *r0, src);
            }

            Instruction::RegImm { op, r0, v0 } => self.pair(*op, *r0, *v0),

            Instruction::RegRegReg { op, r0, r1, r2 } => match op {
                TripleOp::Shrd => {
                    let count = self.registers.value(*r2) & 31;
                    if count != 0 {
                        let low = self.registers.value(*r0);
                        let high = self.registers.value(*r1);
                        self.registers
                            .set(*r0, (low >> count) | (high << (32 - count)));
                    }
                }
            },

            Instruction::RegMem { op, r0, mem } => {
                let m = self.load_u32(self.address(*mem))?;
                self.load(*op, *r0, m);
            }

            Instruction::Lea {
                op: AddressOp::Lea,
                r0,
                r1,
                r2,
                index,
                v0,
            } => {
                let base = self.registers.value(*r1);
                let reg = self.registers.value(*r2);
                let address = match index {
                    IndexOp::Add => base.wrapping_add(reg).wrapping_add(*v0),
                    IndexOp::Mul => base.wrapping_add(reg.wrapping_mul(*v0)),
                };
                self.registers.set(*r0, address);
            }

            Instruction::JumpTable { cond, v0, r0, v1 } => {
                if cond.holds(self.registers.flags()) {
                    let slot = v0.wrapping_add(self.registers.value(*r0).wrapping_mul(*v1));
                    let target = self.load_u32(slot)?;
                    return self.jump(proc, target);
                }
            }

            Instruction::Mem { op, mem } => {
                let m = self.load_u32(self.address(*mem))?;
                self.wide(*op, m)?;
            }

            Instruction::MemReg { op, mem, r1 } => {
                let value = self.registers.value(*r1);
                self.store(*op, *mem, value)?;
            }

            Instruction::MemImm { op, mem, v1 } => self.store(*op, *mem, *v1)?,
        }

        Ok(next)
    }

    // ── Control flow ─────────────────────────────────────────────────────

    fn branch(
        &self,
        proc: &Procedure,
        cond: Condition,
        target: u32,
        fallthrough: Option<usize>,
    ) -> EvalResult<Option<usize>> {
        if cond.holds(self.registers.flags()) {
            self.jump(proc, target)
        } else {
            Ok(fallthrough)
        }
    }

    fn jump(&self, proc: &Procedure, target: u32) -> EvalResult<Option<usize>> {
        proc.index_of(target)
            .map(Some)
            .ok_or(EvalError::BadJumpTarget(target))
    }

    // ── Arithmetic ───────────────────────────────────────────────────────

    fn address(&self, mem: Memory) -> u32 {
        self.registers.value(mem.base).wrapping_add(mem.disp)
    }

    /// `op r0, src` for register and immediate sources.
    fn pair(&mut self, op: PairOp, r0: Reg, src: u32) {
        let dst = self.registers.value(r0);
        let result = match op {
            PairOp::Add => dst.wrapping_add(src),
            PairOp::And => dst & src,
            PairOp::Cmp => {
                self.registers.set_flags(compare(dst, src));
                return;
            }
            PairOp::Mov | PairOp::Movzx => src,
            PairOp::Or => dst | src,
            PairOp::Sar => ((dst as i32) >> (src & 31)) as u32,
            PairOp::Shl => dst << (src & 31),
            PairOp::Shr => dst >> (src & 31),
            PairOp::Sub => dst.wrapping_sub(src),
            PairOp::Xor => dst ^ src,
        };
        self.registers.set(r0, result);
    }

    /// `op r0, [m]`.
    fn load(&mut self, op: LoadOp, r0: Reg, m: u32) {
        let dst = self.registers.value(r0);
        let result = match op {
            LoadOp::Add => dst.wrapping_add(m),
            LoadOp::And => dst & m,
            LoadOp::Cmp => {
                self.registers.set_flags(compare(dst, m));
                return;
            }
            LoadOp::Imul => dst.wrapping_mul(m),
            LoadOp::Mov => m,
            LoadOp::Or => dst | m,
            LoadOp::Sub => dst.wrapping_sub(m),
            LoadOp::Xor => dst ^ m,
        };
        self.registers.set(r0, result);
    }

    /// `mul [m]` / `div [m]` on EDX:EAX.
    fn wide(&mut self, op: WideOp, m: u32) -> EvalResult<()> {
        let eax = self.registers.value(Reg::EAX);
        let edx = self.registers.value(Reg::EDX);
        let (low, high) = match op {
            WideOp::Mul => {
                let product = u64::from(eax) * u64::from(m);
                (product as u32, (product >> 32) as u32)
            }
            WideOp::Div => {
                if m == 0 {
                    return Err(EvalError::DivideByZero);
                }
                let dividend = (u64::from(edx) << 32) | u64::from(eax);
                let divisor = u64::from(m);
                // The quotient is truncated rather than raising an overflow.
                ((dividend / divisor) as u32, (dividend % divisor) as u32)
            }
        };
        self.registers.set(Reg::EAX, low);
        self.registers.set(Reg::EDX, high);
        Ok(())
    }

    /// `op [m], src`.
    fn store(&mut self, op: StoreOp, mem: Memory, src: u32) -> EvalResult<()> {
        let address = self.address(mem);
        match op {
            StoreOp::Mov => self.store_u32(address, src),
            StoreOp::Cmp => {
                let m = self.load_u32(address)?;
                self.registers.set_flags(compare(m, src));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;

    fn machine() -> Machine {
        Machine::new(MachineConfig {
            data_size: 64,
            stack_words: 16,
        })
        .unwrap()
    }

    fn run(m: &mut Machine, body: &str) -> EvalResult<()> {
        let source = format!("t proc near\n{body}\nretn\nt endp");
        let proc = vm86_compiler::compile(&source, &mut m.data).unwrap();
        m.run(&proc)
    }

    #[test]
    fn test_compare_flags() {
        assert_eq!(compare(5, 5), flags::ZF);
        assert_eq!(compare(3, 5), flags::CF | flags::SF);
        assert_eq!(compare(5, 3), 0);
        assert_eq!(compare(0xffff_ffff, 1), 0);
    }

    #[test]
    fn test_arithmetic_wraps() {
        let mut m = machine();
        run(&mut m, "mov eax, 0FFFFFFFFh\nadd eax, 2\nmov ebx, 0\ndec ebx").unwrap();
        assert_eq!(m.registers.value(Reg::EAX), 1);
        assert_eq!(m.registers.value(Reg::EBX), u32::MAX);
    }

    #[test]
    fn test_shifts_mask_the_count() {
        let mut m = machine();
        run(
            &mut m,
            "mov eax, 1\nshl eax, 33\nmov ebx, 80000000h\nsar ebx, 4\nmov ecx, 80000000h\nshr ecx, 4",
        )
        .unwrap();
        assert_eq!(m.registers.value(Reg::EAX), 2);
        assert_eq!(m.registers.value(Reg::EBX), 0xf800_0000);
        assert_eq!(m.registers.value(Reg::ECX), 0x0800_0000);
    }

    #[test]
    fn test_shrd_with_zero_count_is_a_no_op() {
        let mut m = machine();
        run(&mut m, "mov eax, 1234h\nmov edx, 0FFh\nxor ecx, ecx\nshrd eax, edx, cl").unwrap();
        assert_eq!(m.registers.value(Reg::EAX), 0x1234);
    }

    #[test]
    fn test_lea_forms() {
        let mut m = machine();
        run(
            &mut m,
            "mov ebx, 100h\nmov ecx, 3\nlea eax, [ebx+ecx*4]\nlea edx, [ebx+ecx+8]",
        )
        .unwrap();
        assert_eq!(m.registers.value(Reg::EAX), 0x10c);
        assert_eq!(m.registers.value(Reg::EDX), 0x10b);
    }

    #[test]
    fn test_mul_and_div_use_edx_eax() {
        let mut m = machine();
        run(
            &mut m,
            "mov ebx, esp\npush 10h\nmov eax, 80000000h\nmul [ebx-4]\nmov esi, eax\nmov edi, edx\n\
             mov eax, 7\nxor edx, edx\npush 2\ndiv [ebx-8]\nadd esp, 8",
        )
        .unwrap();
        assert_eq!(m.registers.value(Reg::ESI), 0);
        assert_eq!(m.registers.value(Reg::EDI), 8);
        assert_eq!(m.registers.value(Reg::EAX), 3);
        assert_eq!(m.registers.value(Reg::EDX), 1);
    }

    #[test]
    fn test_div_by_zero_faults() {
        let mut m = machine();
        let err = run(&mut m, "mov ebx, esp\npush 0\ndiv [ebx-4]").unwrap_err();
        assert_eq!(err, EvalError::DivideByZero);
    }

    #[test]
    fn test_byte_register_writes_keep_other_bytes() {
        let mut m = machine();
        run(&mut m, "mov eax, 11223344h\nmov al, 0FFh\nmovzx ecx, ah").unwrap();
        assert_eq!(m.registers.value(Reg::EAX), 0x1122_33ff);
        assert_eq!(m.registers.value(Reg::ECX), 0x33);
    }

    #[test]
    fn test_corrupt_return_faults() {
        let mut m = machine();
        assert_eq!(run(&mut m, "push 1"), Err(EvalError::CorruptReturn(1)));
    }
}
