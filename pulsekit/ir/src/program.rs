use crate::{
    Block, BlockId, Expr, HardwareConfig, ScalarType, StreamId, Value, VarId,
    stream::Stream, well_formed,
};
use linked_hash_map::LinkedHashMap;
use pulsekit_idx::IndexedMap;
use pulsekit_utils::{Error, PulseResult, RefKind};
use serde::{Deserialize, Serialize};
use std::{ops::Deref, sync::Arc};

/// A declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: VarId,
    pub ty: ScalarType,
    /// Number of cells, for arrays.
    pub len: Option<u32>,
    /// Initial values. Empty when the variable is not initialized; one value
    /// for a scalar, `len` values for an array.
    pub init: Vec<Value>,
    /// Block the variable was declared in.
    pub scope: BlockId,
}

impl Variable {
    pub fn is_array(&self) -> bool {
        self.len.is_some()
    }
}

/// Options the program was compiled with for a previous execution. Carried
/// through serialization untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// A pulse-control program: the root block plus the tables of everything
/// declared in it. Programs are only mutated through a
/// [`ProgramBuilder`](crate::ProgramBuilder).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub(crate) root: Block,
    pub(crate) variables: IndexedMap<VarId, Variable>,
    pub(crate) streams: IndexedMap<StreamId, Stream>,
    /// Parent of every allocated block. The root has none.
    pub(crate) blocks: IndexedMap<BlockId, Option<BlockId>>,
    /// Result streams by name, in declaration order.
    pub(crate) results: LinkedHashMap<String, StreamId>,
    pub(crate) compiler_options: Option<CompilerOptions>,
}

impl Program {
    pub fn root(&self) -> &Block {
        &self.root
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(id)
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    /// Look up a result stream by name.
    pub fn result(&self, name: &str) -> Option<&Stream> {
        self.results.get(name).and_then(|id| self.streams.get(*id))
    }

    pub fn result_names(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn compiler_options(&self) -> Option<&CompilerOptions> {
        self.compiler_options.as_ref()
    }

    /// High-water mark of the variable allocator.
    pub fn var_count(&self) -> usize {
        self.variables.len()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_parent(&self, block: BlockId) -> Option<BlockId> {
        self.blocks.get(block).copied().flatten()
    }

    /// Expression reading a scalar variable.
    pub fn var(&self, id: VarId) -> PulseResult<Expr> {
        let var = self.lookup(id)?;
        if var.is_array() {
            return Err(Error::type_mismatch(format!(
                "{id} is an array and must be indexed"
            )));
        }
        Ok(Expr::variable(id, var.ty))
    }

    /// Expression reading one cell of an array variable.
    pub fn cell(&self, array: VarId, index: Expr) -> PulseResult<Expr> {
        let var = self.lookup(array)?;
        if !var.is_array() {
            return Err(Error::type_mismatch(format!(
                "{array} is a scalar and cannot be indexed"
            )));
        }
        Expr::array_cell(array, var.ty, index)
    }

    pub(crate) fn lookup(&self, id: VarId) -> PulseResult<&Variable> {
        self.variables
            .get(id)
            .ok_or_else(|| Error::unresolved(RefKind::Variable, id))
    }

    pub(crate) fn lookup_stream(&self, id: StreamId) -> PulseResult<&Stream> {
        self.streams
            .get(id)
            .ok_or_else(|| Error::unresolved(RefKind::Stream, id))
    }
}

/// An immutable, validated program. Cloning shares the same program, so a
/// sealed program can be handed to any number of threads.
#[derive(Debug, Clone)]
pub struct SealedProgram(Arc<Program>);

impl SealedProgram {
    pub(crate) fn new(program: Program) -> Self {
        SealedProgram(Arc::new(program))
    }

    /// Whether both handles refer to the same sealed program.
    pub fn ptr_eq(&self, other: &SealedProgram) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn program(&self) -> &Program {
        &self.0
    }

    /// Resolve every element, pulse, port and weights name used by the
    /// program against `config`.
    pub fn validate(&self, config: &HardwareConfig) -> PulseResult<()> {
        well_formed::check_config(&self.0, config)
    }
}

impl Deref for SealedProgram {
    type Target = Program;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for SealedProgram {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
