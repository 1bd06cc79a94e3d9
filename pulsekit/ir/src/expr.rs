//! Typed expressions.
//!
//! Every constructor type-checks eagerly, so an [`Expr`] that exists is
//! always well-typed. Expressions are immutable values; sub-expressions are
//! owned, while variables are referenced by id.
use crate::{MAX_DEPTH, ScalarType, Value, VarId};
use pulsekit_utils::{Error, PulseResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
}

impl BinOp {
    pub const ALL: [BinOp; 15] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Shl,
        BinOp::Shr,
        BinOp::BitAnd,
        BinOp::BitOr,
        BinOp::BitXor,
        BinOp::Lt,
        BinOp::Le,
        BinOp::Gt,
        BinOp::Ge,
        BinOp::Eq,
        BinOp::Neq,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
        }
    }

    /// The promotion table: the type of `left op right`, if it has one.
    pub fn result_type(
        &self,
        left: ScalarType,
        right: ScalarType,
    ) -> PulseResult<ScalarType> {
        use ScalarType::*;
        let numeric = left.is_numeric() && right.is_numeric();
        let ty = match self {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                match (left, right) {
                    (Int, Int) => Some(Int),
                    _ if numeric => Some(Fixed),
                    _ => None,
                }
            }
            BinOp::Shl | BinOp::Shr => {
                (left.is_numeric() && right == Int).then_some(left)
            }
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
                match (left, right) {
                    (Int, Int) => Some(Int),
                    (Bool, Bool) => Some(Bool),
                    _ => None,
                }
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                numeric.then_some(Bool)
            }
            BinOp::Eq | BinOp::Neq => {
                (numeric || (left == Bool && right == Bool)).then_some(Bool)
            }
        };
        ty.ok_or_else(|| {
            Error::type_mismatch(format!(
                "`{}` is not defined for {left} and {right}",
                self.symbol()
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }

    pub fn result_type(&self, operand: ScalarType) -> PulseResult<ScalarType> {
        match (self, operand) {
            (UnaryOp::Neg, t) if t.is_numeric() => Ok(t),
            (UnaryOp::Not, ScalarType::Bool | ScalarType::Int) => Ok(operand),
            _ => Err(Error::type_mismatch(format!(
                "`{}` is not defined for {operand}",
                self.symbol()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Var(VarId),
    ArrayCell {
        array: VarId,
        index: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Cast {
        target: ScalarType,
        operand: Box<Expr>,
    },
}

/// A typed expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    kind: ExprKind,
    ty: ScalarType,
    /// Nodes on the longest path down to a leaf, this one included.
    height: usize,
}

impl Expr {
    /// Wrap a node whose operands are already built. Fails when the tree
    /// would grow taller than [`MAX_DEPTH`].
    fn node(kind: ExprKind, ty: ScalarType) -> PulseResult<Self> {
        let below = match &kind {
            ExprKind::Literal(_) | ExprKind::Var(_) => 0,
            ExprKind::ArrayCell { index: operand, .. }
            | ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. } => operand.height,
            ExprKind::Binary { left, right, .. } => left.height.max(right.height),
        };
        let height = below + 1;
        if height > MAX_DEPTH {
            return Err(Error::type_mismatch(format!(
                "expression nested deeper than {MAX_DEPTH} levels"
            )));
        }
        Ok(Expr { kind, ty, height })
    }

    pub fn lit<V: Into<Value>>(value: V) -> Self {
        let value = value.into();
        Expr {
            ty: value.ty(),
            kind: ExprKind::Literal(value),
            height: 1,
        }
    }

    pub fn int(value: i32) -> Self {
        Self::lit(value)
    }

    pub fn fixed(value: f64) -> Self {
        Self::lit(value)
    }

    pub fn bool(value: bool) -> Self {
        Self::lit(value)
    }

    /// Reference to a scalar variable. Only the program knows the declared
    /// type, so this is reachable through [`Program::var`](crate::Program::var).
    pub(crate) fn variable(id: VarId, ty: ScalarType) -> Self {
        Expr {
            kind: ExprKind::Var(id),
            ty,
            height: 1,
        }
    }

    pub(crate) fn array_cell(
        array: VarId,
        ty: ScalarType,
        index: Expr,
    ) -> PulseResult<Self> {
        if index.ty != ScalarType::Int {
            return Err(Error::type_mismatch(format!(
                "index into {array} must be int, found {}",
                index.ty
            )));
        }
        Self::node(
            ExprKind::ArrayCell {
                array,
                index: Box::new(index),
            },
            ty,
        )
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> PulseResult<Self> {
        let ty = op.result_type(left.ty, right.ty)?;
        Self::node(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> PulseResult<Self> {
        let ty = op.result_type(operand.ty)?;
        Self::node(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    /// Convert between `int` and `fixed`. Converting a number to `bool`
    /// becomes the comparison `operand != 0`; every other pair is rejected.
    pub fn cast(target: ScalarType, operand: Expr) -> PulseResult<Self> {
        use ScalarType::*;
        match (operand.ty, target) {
            (Int, Fixed) | (Fixed, Int) => Self::node(
                ExprKind::Cast {
                    target,
                    operand: Box::new(operand),
                },
                target,
            ),
            (from, Bool) if from.is_numeric() => Self::is_nonzero(operand),
            (from, to) => Err(Error::InvalidCast {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// `operand != 0`
    pub fn is_nonzero(operand: Expr) -> PulseResult<Self> {
        let zero = Expr::lit(Value::zero(operand.ty));
        Self::binary(BinOp::Neq, operand, zero)
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn ty(&self) -> ScalarType {
        self.ty
    }

    /// Nodes on the longest path from here down to a leaf. Literals and
    /// variables have height 1.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The literal value, when this is a literal.
    pub fn as_literal(&self) -> Option<Value> {
        match self.kind {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Expressions that do not read any variable.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_) => true,
            ExprKind::Var(_) | ExprKind::ArrayCell { .. } => false,
            ExprKind::Binary { left, right, .. } => {
                left.is_constant() && right.is_constant()
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => {
                operand.is_constant()
            }
        }
    }

    /// Direct sub-expressions, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Var(_) => vec![],
            ExprKind::ArrayCell { index, .. } => vec![index.as_ref()],
            ExprKind::Binary { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => {
                vec![operand.as_ref()]
            }
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ExprKind::Binary { .. } => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(v) => write!(f, "{v}"),
            ExprKind::Var(id) => write!(f, "{id}"),
            ExprKind::ArrayCell { array, index } => write!(f, "{array}[{index}]"),
            ExprKind::Binary { op, left, right } => {
                left.fmt_operand(f)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_operand(f)
            }
            // Only references and casts follow the operator bare, so `-(5)`
            // never reads like the literal `-5`.
            ExprKind::Unary { op, operand } => match operand.kind {
                ExprKind::Var(_)
                | ExprKind::ArrayCell { .. }
                | ExprKind::Cast { .. } => write!(f, "{}{operand}", op.symbol()),
                _ => write!(f, "{}({operand})", op.symbol()),
            },
            ExprKind::Cast { target, operand } => {
                write!(f, "{target}({operand})")
            }
        }
    }
}
