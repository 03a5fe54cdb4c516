//! Parsing of the `.cod` instruction stream.
//!
//! The loader produces an ordered [`CodLine`] sequence plus an immutable
//! label table; instruction text is classified into an [`Operands`] shape
//! by the form of its comma-separated tokens, never by opcode.

use std::io::BufRead;

use hashbrown::HashMap;

use crate::error::{JitError, JitResult};
use crate::isa::{Instruction, Operands, Reg};

/// Header line expected at the top of a `.cod` file.
const COD_HEADER: &str = "[Code Memory Content]";

/// One line of the source program: address, raw instruction word (kept for
/// reference, never re-encoded), optional label, and the decoded instruction.
#[derive(Debug, Clone)]
pub struct CodLine {
    pub addr: u32,
    pub word: u32,
    pub label: Option<String>,
    pub instruction: Instruction,
}

/// A loaded program: Cod Lines in source order plus the label table.
///
/// Line position is the canonical index used for branch targeting. The
/// label table is built once at load time and never mutated afterwards.
#[derive(Debug, Default)]
pub struct Program {
    lines: Vec<CodLine>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// Load a program from a `.cod` stream.
    pub fn load<R: BufRead>(reader: R) -> JitResult<Program> {
        let mut lines = reader.lines();
        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| JitError::Format("Invalid cod file".into()))?;
        if header.trim_end_matches('\r') != COD_HEADER {
            return Err(JitError::Format("Invalid cod file".into()));
        }

        let mut program = Program::default();
        for line in lines {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            program.push_line(parse_cod_line(line)?);
        }
        log::debug!(
            "Loaded {} cod lines, {} labels",
            program.lines.len(),
            program.labels.len()
        );
        Ok(program)
    }

    /// Load a program from in-memory text.
    pub fn parse(text: &str) -> JitResult<Program> {
        Program::load(text.as_bytes())
    }

    fn push_line(&mut self, line: CodLine) {
        if let Some(label) = &line.label {
            self.labels.insert(label.clone(), self.lines.len());
        }
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[CodLine] {
        &self.lines
    }

    /// Resolve a label to its line index. Misses are fatal.
    pub fn label_index(&self, label: &str) -> JitResult<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| JitError::Resolution {
                label: label.to_string(),
            })
    }
}

/// Parse one `ADDR: WORD | LABEL | TEXT` line.
fn parse_cod_line(line: &str) -> JitResult<CodLine> {
    let bad = || JitError::Format(format!("Invalid cod line: {line}"));

    let (addr_text, rest) = line.split_once(':').ok_or_else(&bad)?;
    let mut fields = rest.splitn(3, '|');
    let word_text = fields.next().unwrap_or("");
    let label_text = fields.next().unwrap_or("").trim();
    let instr_text = fields.next().unwrap_or("").trim();

    let addr = u32::from_str_radix(addr_text.trim(), 16).map_err(|_| bad())?;
    let word = u32::from_str_radix(word_text.trim(), 16).map_err(|_| bad())?;
    let label = (!label_text.is_empty()).then(|| label_text.to_string());

    Ok(CodLine {
        addr,
        word,
        label,
        instruction: Instruction::parse(instr_text)?,
    })
}

impl Instruction {
    /// Parse instruction text into opcode plus operand shape.
    ///
    /// Shape dispatch mirrors the textual forms: all-register token lists,
    /// `reg, imm, reg`, `reg, imm(reg)`, and `reg, label`; anything else is
    /// a format error.
    pub fn parse(text: &str) -> JitResult<Instruction> {
        let text = text.trim();
        let (opcode, rest) = match text.split_once(char::is_whitespace) {
            Some((opcode, rest)) => (opcode, rest.trim()),
            None => (text, ""),
        };
        let opcode = opcode.to_string();

        if rest.is_empty() {
            return Ok(Instruction {
                opcode,
                operands: Operands::Nullary,
            });
        }

        let tokens: Vec<&str> = rest.split(',').map(str::trim).collect();

        if tokens.iter().all(|t| is_register_name(t)) {
            let regs = tokens
                .iter()
                .map(|t| register_number(t))
                .collect::<JitResult<Vec<Reg>>>()?;
            return Ok(Instruction {
                opcode,
                operands: Operands::Registers(regs),
            });
        }

        if tokens.len() == 3
            && is_register_name(tokens[0])
            && is_hex_number(tokens[1])
            && is_register_name(tokens[2])
        {
            return Ok(Instruction {
                opcode,
                operands: Operands::Immediate {
                    src: register_number(tokens[0])?,
                    dest: register_number(tokens[2])?,
                    imm: parse_hex(tokens[1])
                        .ok_or_else(|| JitError::Format(format!("Unknown instruction format: {text}")))?,
                },
            });
        }

        if tokens.len() == 2 && is_register_name(tokens[0]) && is_indirect_addressing(tokens[1]) {
            let (offset, index) = split_indirect(tokens[1])?;
            return Ok(Instruction {
                opcode,
                operands: Operands::Indirect {
                    data: register_number(tokens[0])?,
                    offset,
                    index,
                },
            });
        }

        if tokens.len() == 2
            && is_register_name(tokens[0])
            && !is_register_name(tokens[1])
            && !is_hex_number(tokens[1])
        {
            return Ok(Instruction {
                opcode,
                operands: Operands::Label {
                    reg: register_number(tokens[0])?,
                    label: tokens[1].to_string(),
                },
            });
        }

        Err(JitError::Format(format!("Unknown instruction format: {text}")))
    }
}

/// `R` or `r` followed by one or more digits.
fn is_register_name(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some('r' | 'R'))
        && token.len() >= 2
        && chars.all(|c| c.is_ascii_digit())
}

/// `0x` hex literal with optional leading minus.
fn is_hex_number(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    match digits.strip_prefix("0x") {
        Some(body) => !body.is_empty() && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// `0xOFFSET(Rn)` indirect-addressing token.
fn is_indirect_addressing(token: &str) -> bool {
    let Some(open) = token.find('(') else {
        return false;
    };
    let Some(close) = token.find(')') else {
        return false;
    };
    close > open && is_hex_number(&token[..open]) && is_register_name(&token[open + 1..close])
}

fn split_indirect(token: &str) -> JitResult<(i32, Reg)> {
    let bad = || JitError::Format(format!("Unknown instruction format: {token}"));
    let open = token.find('(').ok_or_else(&bad)?;
    let close = token.find(')').ok_or_else(&bad)?;
    let offset = parse_hex(&token[..open]).ok_or_else(&bad)?;
    Ok((offset, register_number(&token[open + 1..close])?))
}

/// Validate a register token and map it into the architectural range.
fn register_number(token: &str) -> JitResult<Reg> {
    let invalid = || JitError::Operand {
        token: token.to_string(),
    };
    if !is_register_name(token) {
        return Err(invalid());
    }
    let number: u32 = token[1..].parse().map_err(|_| invalid())?;
    u8::try_from(number)
        .ok()
        .and_then(Reg::new)
        .ok_or_else(invalid)
}

/// Parse a (possibly negative) `0x` literal into the 32-bit value space.
fn parse_hex(token: &str) -> Option<i32> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let value = i64::from_str_radix(digits.strip_prefix("0x")?, 16).ok()?;
    let value = if negative { -value } else { value };
    if (-(1i64 << 31)..1i64 << 32).contains(&value) {
        Some(value as i32)
    } else {
        None
    }
}
