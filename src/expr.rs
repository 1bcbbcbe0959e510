//! Expression trees for policy conditions.

use regex::Regex;
use strum_macros::{Display, EnumString};

use crate::types::Value;

/// The four request variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Var {
    Principal,
    Action,
    Resource,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEq,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEq,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "containsAll")]
    ContainsAll,
    #[strum(serialize = "containsAny")]
    ContainsAny,
}

/// A condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Var(Var),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    GetAttr(Box<Expr>, String),
    HasAttr(Box<Expr>, String),
    Like(Box<Expr>, Pattern),
    Is {
        expr: Box<Expr>,
        entity_type: String,
        within: Option<Box<Expr>>,
    },
    Set(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    pub fn var(var: Var) -> Self {
        Expr::Var(var)
    }

    pub fn ite(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Unary(UnaryOp::Not, Box::new(expr))
    }

    pub fn neg(expr: Expr) -> Self {
        Expr::Unary(UnaryOp::Neg, Box::new(expr))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn get_attr(expr: Expr, attr: impl Into<String>) -> Self {
        Expr::GetAttr(Box::new(expr), attr.into())
    }

    pub fn has_attr(expr: Expr, attr: impl Into<String>) -> Self {
        Expr::HasAttr(Box::new(expr), attr.into())
    }

    pub fn like(expr: Expr, pattern: Pattern) -> Self {
        Expr::Like(Box::new(expr), pattern)
    }

    pub fn is_type(expr: Expr, entity_type: impl Into<String>, within: Option<Expr>) -> Self {
        Expr::Is {
            expr: Box::new(expr),
            entity_type: entity_type.into(),
            within: within.map(Box::new),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternElem {
    Char(char),
    Wildcard,
}

/// A `like` pattern, where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub struct Pattern {
    elems: Vec<PatternElem>,
    regex: Regex,
}

impl Pattern {
    pub fn new(elems: Vec<PatternElem>) -> Result<Self, regex::Error> {
        let mut source = String::from("(?s)^");
        let mut literal = String::new();
        for elem in &elems {
            match elem {
                PatternElem::Char(c) => literal.push(*c),
                PatternElem::Wildcard => {
                    source.push_str(&regex::escape(&literal));
                    literal.clear();
                    source.push_str(".*");
                }
            }
        }
        source.push_str(&regex::escape(&literal));
        source.push('$');
        Ok(Self {
            elems,
            regex: Regex::new(&source)?,
        })
    }

    pub fn elems(&self) -> &[PatternElem] {
        &self.elems
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.elems == other.elems
    }
}
