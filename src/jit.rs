// This module ties the pipeline together behind the DlxJit facade: load a .cod program
// and a .dat memory image, translate the program to A32 machine code on the first
// execution (at most once per instance), run the mapped code directly against the data
// memory's backing storage, and serialize the final image. CompiledProgram pairs the
// translated byte buffer and offset table with the executable mapping so both are
// released together when the instance goes away. A log-gated trace dump reports where
// each source line landed in the mapped region.

//! JIT facade: load, compile once, execute, save.

use std::io::{BufRead, Write};

use crate::arm::{translate, ExecutableRegion, TranslatedProgram};
use crate::error::{JitError, JitResult};
use crate::isa::Program;
use crate::memory::{image, DataMemory};

/// A translated program together with its mapped executable region.
///
/// Created at most once per [`DlxJit`]; buffer, offset table and mapping
/// share the owner's lifetime and are dropped together.
#[derive(Debug)]
pub struct CompiledProgram {
    translated: TranslatedProgram,
    region: ExecutableRegion,
}

impl CompiledProgram {
    pub fn code_size(&self) -> usize {
        self.translated.code.len()
    }
}

/// One translation/execution session: a program, its data memory, and the
/// lazily produced compiled artifact.
#[derive(Debug, Default)]
pub struct DlxJit {
    program: Option<Program>,
    memory: DataMemory,
    compiled: Option<CompiledProgram>,
}

impl DlxJit {
    pub fn new() -> DlxJit {
        DlxJit::default()
    }

    /// Load the `.cod` instruction stream.
    pub fn load_code<R: BufRead>(&mut self, reader: R) -> JitResult<()> {
        self.program = Some(Program::load(reader)?);
        Ok(())
    }

    /// Seed the data memory from a `.dat` image.
    pub fn load_data<R: BufRead>(&mut self, reader: R) -> JitResult<()> {
        image::load_image(reader, &mut self.memory)
    }

    /// Serialize the current data memory as a `.dat` image.
    pub fn save_data<W: Write>(&mut self, writer: W) -> JitResult<()> {
        image::save_image(writer, &mut self.memory)
    }

    pub fn memory(&self) -> &DataMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut DataMemory {
        &mut self.memory
    }

    /// Whether the program has been translated and mapped.
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Run the program against the current data memory. The first call
    /// translates and maps the code; later calls re-enter the same region
    /// with no implicit reset of the memory in between.
    pub fn execute(&mut self) -> JitResult<()> {
        if self.compiled.is_none() {
            self.compile()?;
        }
        let compiled = self.compiled.as_ref().expect("compiled above");
        compiled.region.invoke(self.memory.as_mut_ptr())
    }

    fn compile(&mut self) -> JitResult<()> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| JitError::Format("No program loaded".into()))?;
        let translated = translate(program)?;
        let region = ExecutableRegion::new(&translated.code)?;
        let compiled = CompiledProgram { translated, region };
        trace_compiled(program, &compiled);
        self.compiled = Some(compiled);
        Ok(())
    }
}

/// Diagnostic dump of the compiled program: where every source line landed
/// in the mapped region. Costs nothing unless debug logging is enabled.
fn trace_compiled(program: &Program, compiled: &CompiledProgram) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!("Compiled program size: {} bytes", compiled.code_size());
    let base = compiled.region.as_ptr() as usize;
    for (line, offset) in program.lines().iter().zip(&compiled.translated.offsets) {
        let label = match &line.label {
            Some(label) => format!("{label}:"),
            None => String::new(),
        };
        log::debug!("{label}\t{}:\t{:#x}", line.instruction, base + offset);
    }
}
