use pulsekit_idx::impl_index;

/// Identifies a declared variable. Dense per program, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);
impl_index!(VarId, "v");

/// Identifies a declared result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);
impl_index!(StreamId, "s");

/// Identifies a block. The root block is always `b0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
impl_index!(BlockId, "b");

impl BlockId {
    pub const ROOT: BlockId = BlockId(0);
}
