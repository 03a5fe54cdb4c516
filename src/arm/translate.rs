// This module implements the DLX-to-A32 translation loop. A single pass walks the Cod
// Lines in order, records each line's byte offset before translating it, fuses a
// load-word immediately followed by a store-word on the same data register into one
// shorter sequence, and dispatches every other opcode to its translation rule. Rules
// allocate physical registers through the stateless policy in regalloc, emit host
// instructions through the encoder, and wrap word transfers to the big-endian data
// memory in byte reversals since the host is little-endian. Conditional branches whose
// target offset is already known are resolved immediately; forward branches are emitted
// with a zero placeholder and recorded for the fixup pass, which patches the 24-bit
// offset field once the whole stream has been translated. The emitted program is framed
// by a prologue saving R4-R11 and the return address and reserving the spill frame, and
// the matching epilogue.

//! DLX-to-A32 translation.

use crate::arm::encoder::CodeBuffer;
use crate::arm::regalloc::{
    self, Mapping, Role, DATA_POINTER, FIRST_SOURCE_SCRATCH, RESULT_SCRATCH,
    SECOND_SOURCE_SCRATCH,
};
use crate::arm::{reg_mask, AddrMode, Cond, HostReg};
use crate::error::{JitError, JitResult};
use crate::isa::{CodLine, Operands, Program, Reg, DLX_REGISTER_COUNT};

/// Bytes of stack reserved for the spill slots of DLX registers 8-31.
const SPILL_FRAME_BYTES: i16 = ((DLX_REGISTER_COUNT - 8) * 4) as i16;

/// Pipeline lookahead: a branch executes with PC two words ahead of it.
const BRANCH_PIPELINE_OFFSET: i32 = 8;

/// Finished first-stage artifact: host code plus the per-line offset table.
#[derive(Debug)]
pub struct TranslatedProgram {
    pub code: Vec<u8>,
    /// Byte offset of each Cod Line's first emitted instruction. A line
    /// that emitted nothing maps to the offset of the next emitted one.
    pub offsets: Vec<usize>,
}

/// A branch emitted before its target's offset was known.
#[derive(Debug)]
struct Fixup {
    label: String,
    branch_offset: usize,
}

/// Translate a whole program into executable A32 machine code.
pub fn translate(program: &Program) -> JitResult<TranslatedProgram> {
    Translator::new(program).run()
}

struct Translator<'p> {
    program: &'p Program,
    code: CodeBuffer,
    offsets: Vec<usize>,
    fixups: Vec<Fixup>,
}

impl<'p> Translator<'p> {
    fn new(program: &'p Program) -> Translator<'p> {
        Translator {
            program,
            code: CodeBuffer::new(),
            offsets: Vec::with_capacity(program.lines().len()),
            fixups: Vec::new(),
        }
    }

    fn run(mut self) -> JitResult<TranslatedProgram> {
        self.emit_prologue();

        let lines = self.program.lines();
        let mut skip_next = false;
        for (index, line) in lines.iter().enumerate() {
            self.offsets.push(self.code.len());
            if skip_next {
                skip_next = false;
                continue;
            }
            skip_next = self.translate_line(line, lines.get(index + 1))?;
        }

        self.emit_epilogue();
        self.repair_branch_offsets()?;

        log::trace!(
            "Translated {} lines into {} bytes ({} fixups)",
            lines.len(),
            self.code.len(),
            self.fixups.len()
        );
        Ok(TranslatedProgram {
            code: self.code.into_bytes(),
            offsets: self.offsets,
        })
    }

    fn emit_prologue(&mut self) {
        self.code.push_list(
            Cond::Al,
            reg_mask(&[
                HostReg::R4,
                HostReg::R5,
                HostReg::R6,
                HostReg::R7,
                HostReg::R8,
                HostReg::R9,
                HostReg::R10,
                HostReg::R11,
                HostReg::Lr,
            ]),
        );
        self.code
            .sub_imm(Cond::Al, false, HostReg::Sp, HostReg::Sp, SPILL_FRAME_BYTES);
    }

    fn emit_epilogue(&mut self) {
        self.code
            .add_imm(Cond::Al, false, HostReg::Sp, HostReg::Sp, SPILL_FRAME_BYTES);
        self.code.pop_list(
            Cond::Al,
            reg_mask(&[
                HostReg::R4,
                HostReg::R5,
                HostReg::R6,
                HostReg::R7,
                HostReg::R8,
                HostReg::R9,
                HostReg::R10,
                HostReg::R11,
                HostReg::Pc,
            ]),
        );
    }

    /// Translate one line; returns true when the following line was fused
    /// into this one and must be skipped.
    fn translate_line(&mut self, line: &CodLine, next: Option<&CodLine>) -> JitResult<bool> {
        let instruction = &line.instruction;

        // Peephole: LDW directly feeding an STW of the same data register.
        // Only the data registers are compared; base addresses and index
        // registers are not part of the rule.
        if instruction.opcode == "LDW" {
            if let Some(next_line) = next {
                if next_line.instruction.opcode == "STW" {
                    if let (
                        Operands::Indirect { data: ldw_data, .. },
                        Operands::Indirect { data: stw_data, .. },
                    ) = (&instruction.operands, &next_line.instruction.operands)
                    {
                        if ldw_data == stw_data {
                            self.translate_fused_load_store(line, next_line)?;
                            return Ok(true);
                        }
                    }
                }
            }
        }

        match instruction.opcode.as_str() {
            "ADD" => {
                let (a, b, dest) = self.three_registers(line)?;
                if !dest.is_zero() {
                    let src1 = self.load_source(a, Role::FirstSource);
                    let src2 = self.load_source(b, Role::SecondSource);
                    let dst = regalloc::destination(dest);
                    self.code.add_reg(Cond::Al, false, dst, src1, src2);
                    self.store_destination(dest);
                }
            }
            "ADDI" => {
                let (src, dest, imm) = self.immediate_operands(line)?;
                if !dest.is_zero() {
                    let src1 = self.load_source(src, Role::FirstSource);
                    let dst = regalloc::destination(dest);
                    self.code.add_imm(Cond::Al, false, dst, src1, imm as i16);
                    self.store_destination(dest);
                }
            }
            "SUBI" => {
                let (src, dest, imm) = self.immediate_operands(line)?;
                if !dest.is_zero() {
                    let src1 = self.load_source(src, Role::FirstSource);
                    let dst = regalloc::destination(dest);
                    self.code.sub_imm(Cond::Al, false, dst, src1, imm as i16);
                    self.store_destination(dest);
                }
            }
            "MULADD" => {
                let (a, b, dest) = self.three_registers(line)?;
                if !dest.is_zero() {
                    let mul1 = self.load_source(a, Role::FirstSource);
                    let mul2 = self.load_source(b, Role::SecondSource);
                    let acc = self.load_source(dest, Role::ThirdSource);
                    let dst = regalloc::destination(dest);
                    self.code.mla(Cond::Al, false, dst, mul1, mul2, acc);
                    self.store_destination(dest);
                }
            }
            "LOOPCHECK" => {
                // dest = imm - src
                let (src, dest, imm) = self.immediate_operands(line)?;
                if !dest.is_zero() {
                    let src1 = self.load_source(src, Role::FirstSource);
                    let dst = regalloc::destination(dest);
                    self.code
                        .mov_imm(Cond::Al, false, SECOND_SOURCE_SCRATCH, imm as i16);
                    self.code
                        .sub_reg(Cond::Al, false, dst, SECOND_SOURCE_SCRATCH, src1);
                    self.store_destination(dest);
                }
            }
            "LDW" => {
                let (data, offset, index) = self.indirect_operands(line)?;
                if !data.is_zero() {
                    let address = self.emit_address(index, offset);
                    let dst = regalloc::destination(data);
                    self.code
                        .ldr(Cond::Al, AddrMode::Offset, true, dst, address.0, address.1);
                    // data memory is big-endian; flip into host order
                    self.code.rev(Cond::Al, dst, dst);
                    self.store_destination(data);
                }
            }
            "STW" => {
                let (data, offset, index) = self.indirect_operands(line)?;
                let address = self.emit_address(index, offset);
                // The stored register is read through the destination-role
                // mapping: a spilled value is expected to still be staged
                // in the result scratch from the instruction that wrote it.
                let src = regalloc::destination(data);
                self.code.rev(Cond::Al, src, src);
                self.code
                    .str(Cond::Al, AddrMode::Offset, true, src, address.0, address.1);
                self.code.rev(Cond::Al, src, src);
            }
            "BRLE" => self.translate_branch(line, Cond::Le)?,
            "BRGE" => self.translate_branch(line, Cond::Ge)?,
            "NOP" => {}
            opcode => {
                return Err(JitError::UnsupportedInstruction {
                    opcode: opcode.to_string(),
                })
            }
        }
        Ok(false)
    }

    /// Fused LDW/STW: the loaded word is stored back still in memory byte
    /// order, so the two inner reversals of the separate rules drop out
    /// and a single trailing REV fixes the register copy.
    fn translate_fused_load_store(&mut self, ldw: &CodLine, stw: &CodLine) -> JitResult<()> {
        let (data, ldw_offset, ldw_index) = self.indirect_operands(ldw)?;
        let (_, stw_offset, stw_index) = self.indirect_operands(stw)?;

        if !data.is_zero() {
            let load_address = self.emit_address(ldw_index, ldw_offset);
            let dst = regalloc::destination(data);
            self.code.ldr(
                Cond::Al,
                AddrMode::Offset,
                true,
                dst,
                load_address.0,
                load_address.1,
            );

            let store_address = self.emit_address(stw_index, stw_offset);
            self.code.str(
                Cond::Al,
                AddrMode::Offset,
                true,
                dst,
                store_address.0,
                store_address.1,
            );

            self.code.rev(Cond::Al, dst, dst);
            self.store_destination(data);
        }
        Ok(())
    }

    fn translate_branch(&mut self, line: &CodLine, cond: Cond) -> JitResult<()> {
        let (reg, label) = self.branch_operands(line)?;
        let value = self.load_source(reg, Role::FirstSource);
        self.code
            .mov_reg(Cond::Al, true, FIRST_SOURCE_SCRATCH, value);

        let target = self.program.label_index(label)?;
        let branch_offset = self.code.len();
        let offset = if self.offsets.len() > target {
            self.branch_byte_offset(target, branch_offset)
        } else {
            self.fixups.push(Fixup {
                label: label.to_string(),
                branch_offset,
            });
            0
        };
        self.code.b(cond, offset);
        Ok(())
    }

    /// `target - (branch + 8)`: relative distance as seen by the branch,
    /// accounting for the pipeline lookahead.
    fn branch_byte_offset(&self, target: usize, branch_offset: usize) -> i32 {
        self.offsets[target] as i32 - (branch_offset as i32 + BRANCH_PIPELINE_OFFSET)
    }

    /// Second pass: patch every branch whose target had not been emitted
    /// yet. Labels are immutable after load, so a miss here is an
    /// invariant violation and fails the same way.
    fn repair_branch_offsets(&mut self) -> JitResult<()> {
        for fixup in &self.fixups {
            let target = self.program.label_index(&fixup.label)?;
            let offset = self.offsets[target] as i32
                - (fixup.branch_offset as i32 + BRANCH_PIPELINE_OFFSET);
            self.code.patch_branch_offset(fixup.branch_offset, offset);
        }
        Ok(())
    }

    /// Materialize a source operand per the register policy, emitting the
    /// zero synthesis or spill-slot load where one is required.
    fn load_source(&mut self, reg: Reg, role: Role) -> HostReg {
        match regalloc::source(reg, role) {
            Mapping::Direct(host) => host,
            Mapping::Zero(scratch) => {
                self.code.mov_imm(Cond::Al, false, scratch, 0);
                scratch
            }
            Mapping::Spilled { offset, scratch } => {
                self.code
                    .ldr(Cond::Al, AddrMode::Offset, true, scratch, HostReg::Sp, offset);
                scratch
            }
        }
    }

    /// Copy a spilled destination from the result scratch back to its slot.
    fn store_destination(&mut self, reg: Reg) {
        if let Some(offset) = regalloc::write_back_slot(reg) {
            self.code.str(
                Cond::Al,
                AddrMode::Offset,
                true,
                RESULT_SCRATCH,
                HostReg::Sp,
                offset,
            );
        }
    }

    /// Compute `index + data pointer` into the first-source scratch and
    /// return it with the constant base offset for the transfer.
    fn emit_address(&mut self, index: Reg, offset: i32) -> (HostReg, u16) {
        let index_reg = self.load_source(index, Role::FirstSource);
        self.code.add_reg(
            Cond::Al,
            false,
            FIRST_SOURCE_SCRATCH,
            index_reg,
            DATA_POINTER,
        );
        (FIRST_SOURCE_SCRATCH, offset as u16)
    }

    fn three_registers(&self, line: &CodLine) -> JitResult<(Reg, Reg, Reg)> {
        match &line.instruction.operands {
            Operands::Registers(regs) if regs.len() == 3 => Ok((regs[0], regs[1], regs[2])),
            _ => Err(self.malformed(line)),
        }
    }

    fn immediate_operands(&self, line: &CodLine) -> JitResult<(Reg, Reg, i32)> {
        match &line.instruction.operands {
            Operands::Immediate { src, dest, imm } => Ok((*src, *dest, *imm)),
            _ => Err(self.malformed(line)),
        }
    }

    fn indirect_operands(&self, line: &CodLine) -> JitResult<(Reg, i32, Reg)> {
        match &line.instruction.operands {
            Operands::Indirect { data, offset, index } => Ok((*data, *offset, *index)),
            _ => Err(self.malformed(line)),
        }
    }

    fn branch_operands<'a>(&self, line: &'a CodLine) -> JitResult<(Reg, &'a str)> {
        match &line.instruction.operands {
            Operands::Label { reg, label } => Ok((*reg, label.as_str())),
            _ => Err(self.malformed(line)),
        }
    }

    fn malformed(&self, line: &CodLine) -> JitError {
        JitError::Format(format!(
            "Malformed {} instruction: {}",
            line.instruction.opcode, line.instruction
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Words emitted by the prologue / epilogue.
    const PROLOGUE_WORDS: usize = 2;
    const EPILOGUE_WORDS: usize = 2;

    fn program(body: &str) -> Program {
        let mut text = String::from("[Code Memory Content]\n");
        for (i, line) in body.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
            let (label, instr) = match line.split_once('|') {
                Some((label, instr)) => (label.trim(), instr.trim()),
                None => ("", line),
            };
            text.push_str(&format!("{:x}: 0 | {} | {}\n", i * 4, label, instr));
        }
        Program::parse(&text).unwrap()
    }

    fn words(translated: &TranslatedProgram) -> Vec<u32> {
        translated
            .code
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn body_words(translated: &TranslatedProgram) -> Vec<u32> {
        let all = words(translated);
        all[PROLOGUE_WORDS..all.len() - EPILOGUE_WORDS].to_vec()
    }

    #[test]
    fn test_frame_setup_and_teardown() {
        let translated = translate(&program("NOP")).unwrap();
        let words = words(&translated);
        // PUSH {r4-r11, lr}; SUB sp, sp, #96 ... ADD sp, sp, #96; POP {r4-r11, pc}
        assert_eq!(words[0], 0xe92d4ff0);
        assert_eq!(words[1], 0xe24dd060);
        assert_eq!(words[words.len() - 2], 0xe28dd060);
        assert_eq!(words[words.len() - 1], 0xe8bd8ff0);
    }

    #[test]
    fn test_nop_emits_nothing() {
        let translated = translate(&program("NOP")).unwrap();
        assert!(body_words(&translated).is_empty());
        // the line still owns an offset table entry
        assert_eq!(translated.offsets, vec![PROLOGUE_WORDS * 4]);
    }

    #[test]
    fn test_direct_registers_produce_no_stack_traffic() {
        let translated = translate(&program("ADD R1, R2, R3")).unwrap();
        // exactly one instruction (ADD r3, r1, r2), no spill traffic around it
        assert_eq!(body_words(&translated), vec![0xe0813002]);
    }

    #[test]
    fn test_spilled_operands_load_from_frame_slots() {
        let translated = translate(&program("ADD R8, R9, R10")).unwrap();
        assert_eq!(
            body_words(&translated),
            vec![
                0xe59d8000, // LDR r8, [sp, #0]   slot of DLX 8
                0xe59d9004, // LDR r9, [sp, #4]   slot of DLX 9
                0xe088a009, // ADD r10, r8, r9
                0xe58da008, // STR r10, [sp, #8]  slot of DLX 10
            ]
        );
    }

    #[test]
    fn test_spilled_round_trip_uses_same_slot() {
        let translated = translate(&program("ADDI R1, 0x5, R20\nADDI R20, 0x1, R2")).unwrap();
        assert_eq!(
            body_words(&translated),
            vec![
                0xe281a005, // ADD r10, r1, #5
                0xe58da030, // STR r10, [sp, #48]  write DLX 20
                0xe59d8030, // LDR r8, [sp, #48]   read DLX 20 back
                0xe2882001, // ADD r2, r8, #1
            ]
        );
    }

    #[test]
    fn test_zero_source_synthesizes_constant() {
        let translated = translate(&program("ADD R0, R2, R3")).unwrap();
        assert_eq!(
            body_words(&translated),
            vec![
                0xe3a08000, // MOV r8, #0
                0xe0883002, // ADD r3, r8, r2
            ]
        );
    }

    #[test]
    fn test_zero_destination_elides_instruction() {
        let translated = translate(&program("ADD R1, R2, R0\nADD R1, R2, R3")).unwrap();
        // first line emits nothing; both offsets point at the same word
        assert_eq!(body_words(&translated), vec![0xe0813002]);
        assert_eq!(translated.offsets[0], translated.offsets[1]);
    }

    #[test]
    fn test_muladd_uses_three_scratch_registers() {
        let translated = translate(&program("MULADD R8, R9, R10")).unwrap();
        assert_eq!(
            body_words(&translated),
            vec![
                0xe59d8000, // LDR r8, [sp, #0]
                0xe59d9004, // LDR r9, [sp, #4]
                0xe59da008, // LDR r10, [sp, #8]
                0xe02aa998, // MLA r10, r8, r9, r10
                0xe58da008, // STR r10, [sp, #8]
            ]
        );
    }

    #[test]
    fn test_loopcheck_reverse_subtracts_from_immediate() {
        let translated = translate(&program("LOOPCHECK R1, 0x20, R2")).unwrap();
        assert_eq!(
            body_words(&translated),
            vec![
                0xe3a09020, // MOV r9, #0x20
                0xe0492001, // SUB r2, r9, r1
            ]
        );
    }

    #[test]
    fn test_load_word_reverses_into_host_order() {
        let translated = translate(&program("LDW R1, 0x8(R2)")).unwrap();
        assert_eq!(
            body_words(&translated),
            vec![
                0xe0828000, // ADD r8, r2, r0
                0xe5981008, // LDR r1, [r8, #8]
                0xe6bf1f31, // REV r1, r1
            ]
        );
    }

    #[test]
    fn test_store_word_wraps_value_in_reversals() {
        let translated = translate(&program("STW R1, 0x4(R2)")).unwrap();
        assert_eq!(
            body_words(&translated),
            vec![
                0xe0828000, // ADD r8, r2, r0
                0xe6bf1f31, // REV r1, r1
                0xe5881004, // STR r1, [r8, #4]
                0xe6bf1f31, // REV r1, r1
            ]
        );
    }

    #[test]
    fn test_peephole_fuses_load_then_store_of_same_register() {
        let fused = translate(&program("LDW R1, 0x0(R2)\nSTW R1, 0x4(R3)")).unwrap();
        assert_eq!(
            body_words(&fused),
            vec![
                0xe0828000, // ADD r8, r2, r0
                0xe5981000, // LDR r1, [r8, #0]
                0xe0838000, // ADD r8, r3, r0
                0xe5881004, // STR r1, [r8, #4]   value still big-endian
                0xe6bf1f31, // REV r1, r1
            ]
        );

        // consumed line shares no new code; its offset is the loop exit
        assert_eq!(fused.offsets.len(), 2);
        assert_eq!(fused.offsets[1], fused.code.len() - EPILOGUE_WORDS * 4);

        // and the fused form is strictly shorter than the two rules applied
        // independently
        let separate = translate(&program("LDW R1, 0x0(R2)\nSTW R2, 0x4(R3)")).unwrap();
        assert!(body_words(&fused).len() < body_words(&separate).len());
    }

    #[test]
    fn test_peephole_ignores_differing_data_registers() {
        let translated = translate(&program("LDW R1, 0x0(R2)\nSTW R2, 0x0(R2)")).unwrap();
        // LDW: add+ldr+rev, STW: add+rev+str+rev
        assert_eq!(body_words(&translated).len(), 7);
    }

    #[test]
    fn test_peephole_matches_on_data_register_only() {
        // differing base offsets and index registers still fuse
        let translated = translate(&program("LDW R1, 0x0(R2)\nSTW R1, 0x10(R7)")).unwrap();
        assert_eq!(body_words(&translated).len(), 5);
    }

    #[test]
    fn test_backward_branch_resolves_immediately() {
        let translated = translate(&program("loop | ADD R1, R2, R3\nBRLE R1, loop")).unwrap();
        let body = body_words(&translated);
        // ADD; MOVS r8, r1; B.LE back to the ADD
        assert_eq!(body[0], 0xe0813002);
        assert_eq!(body[1], 0xe1b08001);
        // branch at byte 16, target at byte 8: 8 - (16 + 8) = -16
        assert_eq!(body[2], 0xdafffffc);
    }

    #[test]
    fn test_forward_branch_gets_patched() {
        let translated =
            translate(&program("BRGE R1, done\nADD R1, R2, R3\ndone | ADD R4, R5, R6")).unwrap();
        let body = body_words(&translated);
        assert_eq!(body[0], 0xe1b08001); // MOVS r8, r1
        // branch at byte 12, target at byte 20: 20 - (12 + 8) = 0
        assert_eq!(body[1], 0xaa000000);
        assert_eq!(body[2], 0xe0813002);
        assert_eq!(body[3], 0xe0846005);
    }

    #[test]
    fn test_self_branch_resolves_backward() {
        // the line's own offset is recorded before translation, so a branch
        // to itself is a known, negative target
        let translated = translate(&program("self | BRLE R1, self")).unwrap();
        let body = body_words(&translated);
        assert_eq!(body[0], 0xe1b08001);
        // branch at byte 12, target at byte 8 (the MOVS): 8 - (12 + 8) = -12
        assert_eq!(body[1], 0xdafffffd);
    }

    #[test]
    fn test_two_branches_to_one_label_use_same_formula() {
        let translated = translate(&program(
            "BRGE R1, target\nNOP\ntarget | ADD R1, R2, R3\nBRLE R1, target",
        ))
        .unwrap();
        let body = body_words(&translated);
        // forward: branch at 12, target at 16 -> 16 - 20 = -4 -> imm -1
        assert_eq!(body[1], 0xaaffffff);
        // backward: branch at 24, target at 16 -> 16 - 32 = -16 -> imm -4
        assert_eq!(body[4], 0xdafffffc);
    }

    #[test]
    fn test_unknown_opcode_is_fatal_and_named() {
        let err = translate(&program("FROB R1, R2, R3")).unwrap_err();
        assert!(matches!(
            err,
            JitError::UnsupportedInstruction { opcode } if opcode == "FROB"
        ));
    }

    #[test]
    fn test_unresolvable_label_fails_translation() {
        let err = translate(&program("BRLE R1, nowhere")).unwrap_err();
        assert!(matches!(err, JitError::Resolution { label } if label == "nowhere"));
    }

    #[test]
    fn test_wrong_operand_shape_is_format_error() {
        let err = translate(&program("ADD R1, R2")).unwrap_err();
        assert!(matches!(err, JitError::Format(_)));
    }

    #[test]
    fn test_offset_table_tracks_emitted_positions() {
        let translated = translate(&program("ADD R1, R2, R3\nNOP\nADD R4, R5, R6")).unwrap();
        let base = PROLOGUE_WORDS * 4;
        assert_eq!(translated.offsets, vec![base, base + 4, base + 4]);
    }
}
