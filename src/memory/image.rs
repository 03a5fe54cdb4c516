//! Memory-image (`.dat`) loading and serialization.
//!
//! Input images declare an element width (`Size=`) and number base
//! (`Base=`) in their header and carry rows of eight values prefixed with
//! the row's starting address. Output is always fixed-width words in
//! hexadecimal, eight per row.

use std::io::{BufRead, Write};

use crate::error::{JitError, JitResult};
use crate::memory::DataMemory;

const DAT_HEADER: &str = "[Data Memory]";
const DAT_CONTENT: &str = "[Data Memory Content]";
const SIZE_KEY: &str = "Size=";
const BASE_KEY: &str = "Base=";

/// Values stored per image row.
const ROW_ELEMENTS: usize = 8;

/// Element width declared by an image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementSize {
    Byte,
    Half,
    Word,
}

impl ElementSize {
    fn from_key(value: i64) -> ElementSize {
        match value {
            0 => ElementSize::Byte,
            1 => ElementSize::Half,
            _ => ElementSize::Word,
        }
    }

    fn width(self) -> usize {
        match self {
            ElementSize::Byte => 1,
            ElementSize::Half => 2,
            ElementSize::Word => 4,
        }
    }
}

/// Number base declared by an image header. Only the hexadecimal base
/// changes parsing; both decimal bases read signed 64-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberBase {
    Hex,
    Decimal,
}

impl NumberBase {
    fn from_key(value: i64) -> NumberBase {
        if value == 0 {
            NumberBase::Hex
        } else {
            NumberBase::Decimal
        }
    }

    fn radix(self) -> u32 {
        match self {
            NumberBase::Hex => 16,
            NumberBase::Decimal => 10,
        }
    }
}

/// Read a `.dat` image and seed the data memory through its endian-fixing
/// accessors.
pub fn load_image<R: BufRead>(reader: R, memory: &mut DataMemory) -> JitResult<()> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| JitError::Format("Invalid dat file".into()))?;
    if header.trim_end_matches('\r') != DAT_HEADER {
        return Err(JitError::Format("Invalid dat file".into()));
    }

    let mut size = ElementSize::Word;
    let mut base = NumberBase::Hex;
    let mut in_content = false;

    for line in &mut lines {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line == DAT_CONTENT {
            in_content = true;
            break;
        }
        if let Some(value) = line.strip_prefix(SIZE_KEY) {
            size = ElementSize::from_key(parse_key_value(value)?);
        } else if let Some(value) = line.strip_prefix(BASE_KEY) {
            base = NumberBase::from_key(parse_key_value(value)?);
        }
    }
    if !in_content {
        return Err(JitError::Format("Invalid dat file - no content".into()));
    }
    log::debug!("Loading image: {size:?} elements, {base:?} base");

    for line in lines {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        load_row(line, size, base, memory)?;
    }
    Ok(())
}

fn parse_key_value(text: &str) -> JitResult<i64> {
    text.trim()
        .parse()
        .map_err(|_| JitError::Format("Invalid dat file".into()))
}

/// Parse one `ADDR: v0 .. v7` row and store its values.
fn load_row(
    line: &str,
    size: ElementSize,
    base: NumberBase,
    memory: &mut DataMemory,
) -> JitResult<()> {
    let bad = || JitError::Format(format!("Invalid dat line: {line}"));

    let mut tokens = line.split_whitespace().filter(|t| *t != ":");
    let addr_token = tokens.next().ok_or_else(&bad)?;
    let addr_token = addr_token.strip_suffix(':').unwrap_or(addr_token);
    let address = parse_value(addr_token, base).ok_or_else(&bad)?;
    let mut address = usize::try_from(address).map_err(|_| bad())?;

    for token in tokens.take(ROW_ELEMENTS) {
        let value = parse_value(token, base).ok_or_else(&bad)?;
        match size {
            ElementSize::Byte => memory.store_byte(address, value as u8),
            ElementSize::Half => memory.store_half(address, value as u16),
            ElementSize::Word => memory.store_word(address, value as u32),
        }
        address += size.width();
    }
    Ok(())
}

fn parse_value(token: &str, base: NumberBase) -> Option<i64> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let value = i64::from_str_radix(digits, base.radix()).ok()?;
    Some(if negative { -value } else { value })
}

/// Serialize the final memory image: words, hexadecimal, eight per row,
/// each row prefixed with its starting address.
pub fn save_image<W: Write>(mut writer: W, memory: &mut DataMemory) -> JitResult<()> {
    writeln!(writer, "{DAT_HEADER}")?;
    writeln!(writer, "Size=2")?;
    writeln!(writer, "Base=0")?;
    writeln!(writer)?;
    writeln!(writer, "{DAT_CONTENT}")?;

    let size = memory.len();
    let mut address = 0;
    while address < size {
        if address % (ROW_ELEMENTS * 4) == 0 {
            write!(writer, "{address:03x}:")?;
        }
        write!(writer, "  {:08x}", memory.load_word(address))?;
        if address % (ROW_ELEMENTS * 4) == (ROW_ELEMENTS - 1) * 4 {
            writeln!(writer)?;
        }
        address += 4;
    }
    Ok(())
}
