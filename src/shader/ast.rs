#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Program {
    pub(crate) lets: Vec<LetStmt>,
    pub(crate) result: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LetStmt {
    pub(crate) name: String,
    pub(crate) value: Expr,
    pub(crate) offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Lit(Lit),
    Ident {
        name: String,
        offset: usize,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        offset: usize,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        offset: usize,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
        offset: usize,
    },
    Call {
        func: String,
        args: Vec<Expr>,
        offset: usize,
    },
    /// `base.xyz` / `base.rgba` component selection.
    Swizzle {
        base: Box<Expr>,
        fields: String,
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lit {
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}
