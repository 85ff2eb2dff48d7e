//! Compiled expression tree for rule conditions and action right-hand sides.
//! No evaluation or variable resolution happens here -- that is the
//! evaluator's job.

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    /// Numeric literal as written, parsed exactly by the evaluator
    Number(String),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `receiver.method(args)`, e.g. `name.equalsIgnoreCase('Doe')`
    Call {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Variable names referenced by this expression, in first-seen order.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Not(e) | Expr::Neg(e) => e.collect_vars(out),
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
            Expr::Compare { left, right, .. } | Expr::Arith { left, right, .. } => {
                left.collect_vars(out);
                right.collect_vars(out);
            }
            Expr::Call { receiver, args, .. } => {
                receiver.collect_vars(out);
                for a in args {
                    a.collect_vars(out);
                }
            }
        }
    }
}

/// An action statement: `target = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: String,
    pub value: Expr,
}
