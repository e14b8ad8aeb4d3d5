use crate::tokenizer::Position;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Not,
    Minus,
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// Call-site argument, either positional or `name = value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expr),
    Named { name: String, value: Expr },
}

/// Expressions in SolvraScript
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        position: Position,
    },
    Identifier {
        name: String,
        position: Position,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
        position: Position,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
        position: Position,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
        position: Position,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        position: Position,
    },
    Member {
        object: Box<Expr>,
        property: String,
        position: Position,
    },
    List {
        elements: Vec<Expr>,
        position: Position,
    },
    Dict {
        entries: Vec<(Expr, Expr)>,
        position: Position,
    },
}

impl Expr {
    pub fn position(&self) -> &Position {
        match self {
            Expr::Literal { position, .. } => position,
            Expr::Identifier { position, .. } => position,
            Expr::Binary { position, .. } => position,
            Expr::Unary { position, .. } => position,
            Expr::Call { position, .. } => position,
            Expr::Index { position, .. } => position,
            Expr::Member { position, .. } => position,
            Expr::List { position, .. } => position,
            Expr::Dict { position, .. } => position,
        }
    }
}

/// Function parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default_value: Option<Expr>,
    pub position: Position,
}

/// Function declarations
///
/// `source` is the exact text of the declaration, decorator lines included, so the
/// declaration can be executed again somewhere else. `nested` is set when the function
/// was declared inside another function's body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub is_generator: bool,
    pub nested: bool,
    pub source: String,
    pub position: Position,
}

impl FunctionDecl {
    /// Names the function reads but never binds. Parameters, `let`s, loop variables,
    /// imports and nested declarations count as bound anywhere in the body.
    pub fn free_names(&self) -> BTreeSet<String> {
        let mut bound = BTreeSet::from([self.name.clone()]);
        let mut used = BTreeSet::new();
        for param in &self.params {
            bound.insert(param.name.clone());
            if let Some(default) = &param.default_value {
                collect_expr(default, &mut used);
            }
        }
        for decorator in &self.decorators {
            collect_expr(decorator, &mut used);
        }
        collect_stmts(&self.body, &mut bound, &mut used);
        used.retain(|name| !bound.contains(name));
        used
    }
}

fn collect_stmts(statements: &[Stmt], bound: &mut BTreeSet<String>, used: &mut BTreeSet<String>) {
    for stmt in statements {
        match stmt {
            Stmt::Expression { expr, .. } | Stmt::Yield { value: expr, .. } => {
                collect_expr(expr, used)
            }
            Stmt::Let {
                name, initializer, ..
            } => {
                bound.insert(name.clone());
                if let Some(initializer) = initializer {
                    collect_expr(initializer, used);
                }
            }
            Stmt::Assign { target, value, .. } => {
                collect_expr(target, used);
                collect_expr(value, used);
            }
            Stmt::FunctionDecl { decl } => {
                bound.insert(decl.name.clone());
                used.extend(decl.free_names());
            }
            Stmt::Import { module, .. } => {
                bound.insert(module.clone());
            }
            Stmt::Block { statements, .. } => collect_stmts(statements, bound, used),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                collect_expr(condition, used);
                collect_stmts(then_branch, bound, used);
                if let Some(else_branch) = else_branch {
                    collect_stmts(else_branch, bound, used);
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                collect_expr(condition, used);
                collect_stmts(body, bound, used);
            }
            Stmt::For {
                variable,
                iterable,
                body,
                ..
            } => {
                bound.insert(variable.clone());
                collect_expr(iterable, used);
                collect_stmts(body, bound, used);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    collect_expr(value, used);
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }
}

fn collect_expr(expr: &Expr, used: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal { .. } => {}
        Expr::Identifier { name, .. } => {
            used.insert(name.clone());
        }
        Expr::Binary { left, right, .. } => {
            collect_expr(left, used);
            collect_expr(right, used);
        }
        Expr::Unary { operand, .. } => collect_expr(operand, used),
        Expr::Call { callee, args, .. } => {
            collect_expr(callee, used);
            for arg in args {
                match arg {
                    Argument::Positional(value) | Argument::Named { value, .. } => {
                        collect_expr(value, used)
                    }
                }
            }
        }
        Expr::Index { object, index, .. } => {
            collect_expr(object, used);
            collect_expr(index, used);
        }
        Expr::Member { object, .. } => collect_expr(object, used),
        Expr::List { elements, .. } => {
            for element in elements {
                collect_expr(element, used);
            }
        }
        Expr::Dict { entries, .. } => {
            for (key, value) in entries {
                collect_expr(key, used);
                collect_expr(value, used);
            }
        }
    }
}

/// Statements in SolvraScript
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expression {
        expr: Expr,
        position: Position,
    },
    Let {
        name: String,
        initializer: Option<Expr>,
        position: Position,
    },
    Assign {
        target: Expr,
        value: Expr,
        position: Position,
    },
    FunctionDecl {
        decl: Arc<FunctionDecl>,
    },
    Import {
        module: String,
        position: Position,
    },
    Block {
        statements: Vec<Stmt>,
        position: Position,
    },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        position: Position,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        position: Position,
    },
    For {
        variable: String,
        iterable: Expr,
        body: Vec<Stmt>,
        position: Position,
    },
    Return {
        value: Option<Expr>,
        position: Position,
    },
    Yield {
        value: Expr,
        position: Position,
    },
    Break {
        position: Position,
    },
    Continue {
        position: Position,
    },
}

/// Complete SolvraScript program
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub position: Position,
}

impl Program {
    pub fn new(statements: Vec<Stmt>, position: Position) -> Self {
        Self {
            statements,
            position,
        }
    }

    /// Top-level function declarations, in source order.
    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionDecl>> {
        self.statements.iter().filter_map(|stmt| match stmt {
            Stmt::FunctionDecl { decl } => Some(decl),
            _ => None,
        })
    }
}

impl Expr {
    pub fn literal(value: Literal, position: Position) -> Self {
        Expr::Literal { value, position }
    }

    pub fn identifier(name: String, position: Position) -> Self {
        Expr::Identifier { name, position }
    }

    pub fn binary(left: Expr, operator: BinaryOp, right: Expr, position: Position) -> Self {
        Expr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
            position,
        }
    }

    pub fn unary(operator: UnaryOp, operand: Expr, position: Position) -> Self {
        Expr::Unary {
            operator,
            operand: Box::new(operand),
            position,
        }
    }
}
