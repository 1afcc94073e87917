use super::Value;

/// A predicate tree node.
///
/// Property paths are written `alias.property`; a path without an alias
/// refers to the main alias.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `property <op> value`
    Compare {
        alias: Option<String>,
        property: String,
        op: BinaryOp,
        value: Value,
    },

    /// `property IN (values)`
    In {
        alias: Option<String>,
        property: String,
        values: Vec<Value>,
    },

    /// `property IS [NOT] NULL`
    IsNull {
        alias: Option<String>,
        property: String,
        negate: bool,
    },

    /// Raw SQL text. `alias.property` tokens are rewritten to column
    /// references and `:name` tokens resolve against the query parameters.
    Raw(String),

    And(Vec<Condition>),

    Or(Vec<Condition>),

    Not(Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

/// How a where clause joins the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub conjunction: Conjunction,
    pub condition: Condition,
}

impl Condition {
    pub fn eq(path: &str, value: impl Into<Value>) -> Condition {
        Condition::compare(path, BinaryOp::Eq, value)
    }

    pub fn ne(path: &str, value: impl Into<Value>) -> Condition {
        Condition::compare(path, BinaryOp::Ne, value)
    }

    pub fn lt(path: &str, value: impl Into<Value>) -> Condition {
        Condition::compare(path, BinaryOp::Lt, value)
    }

    pub fn le(path: &str, value: impl Into<Value>) -> Condition {
        Condition::compare(path, BinaryOp::Le, value)
    }

    pub fn gt(path: &str, value: impl Into<Value>) -> Condition {
        Condition::compare(path, BinaryOp::Gt, value)
    }

    pub fn ge(path: &str, value: impl Into<Value>) -> Condition {
        Condition::compare(path, BinaryOp::Ge, value)
    }

    pub fn like(path: &str, pattern: impl Into<Value>) -> Condition {
        Condition::compare(path, BinaryOp::Like, pattern)
    }

    pub fn compare(path: &str, op: BinaryOp, value: impl Into<Value>) -> Condition {
        let (alias, property) = split_path(path);
        Condition::Compare {
            alias,
            property,
            op,
            value: value.into(),
        }
    }

    pub fn in_list(path: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Condition {
        let (alias, property) = split_path(path);
        Condition::In {
            alias,
            property,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(path: &str) -> Condition {
        let (alias, property) = split_path(path);
        Condition::IsNull {
            alias,
            property,
            negate: false,
        }
    }

    pub fn is_not_null(path: &str) -> Condition {
        let (alias, property) = split_path(path);
        Condition::IsNull {
            alias,
            property,
            negate: true,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Condition {
        Condition::Raw(sql.into())
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        Condition::And(conditions.into_iter().collect())
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        Condition::Or(conditions.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Condition {
        Condition::Not(Box::new(condition))
    }

    /// True for nodes rendered as more than one term.
    pub fn is_compound(&self) -> bool {
        matches!(self, Condition::Raw(_) | Condition::And(_) | Condition::Or(_))
    }
}

impl BinaryOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "LIKE",
        }
    }
}

fn split_path(path: &str) -> (Option<String>, String) {
    match path.split_once('.') {
        Some((alias, property)) => (Some(alias.to_string()), property.to_string()),
        None => (None, path.to_string()),
    }
}
