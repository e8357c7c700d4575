//! Abstract Syntax Tree definitions for ScriptIt scripts

use std::rc::Rc;

/// A script is a sequence of statements
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

// ============================================================================
// Statements
// ============================================================================

/// A single statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expr),
    Declaration(VarDeclaration),
    Function(Rc<FunctionDef>),
    If(IfStatement),
    While { test: Expr, body: Box<Statement> },
    DoWhile { body: Box<Statement>, test: Expr },
    For(ForLoop),
    ForOf(ForEachLoop),
    ForIn(ForEachLoop),
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Try(TryStatement),
    Block(Vec<Statement>),
    Empty,
}

/// Declaration keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Let,
    Const,
    Var,
}

impl std::fmt::Display for VarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarKind::Let => write!(f, "let"),
            VarKind::Const => write!(f, "const"),
            VarKind::Var => write!(f, "var"),
        }
    }
}

/// `let a = 1, b` style declaration
#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclaration {
    pub kind: VarKind,
    pub bindings: Vec<VarBinding>,
}

/// One name in a declaration, with its optional initializer
#[derive(Debug, Clone, PartialEq)]
pub struct VarBinding {
    pub name: String,
    pub init: Option<Expr>,
}

/// IF conditional statement
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub test: Expr,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
}

/// Classic `for (init; test; update)` loop
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub init: Option<ForInit>,
    pub test: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Statement>,
}

/// Initializer clause of a classic for loop
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Declaration(VarDeclaration),
    Expression(Expr),
}

/// `for (x of xs)` and `for (k in obj)` loops
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachLoop {
    /// Declaration keyword, `None` when the loop assigns an existing name
    pub kind: Option<VarKind>,
    /// The iterator variable name
    pub name: String,
    /// The iterated value
    pub source: Expr,
    pub body: Box<Statement>,
}

/// try / catch / finally
#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    pub block: Vec<Statement>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Vec<Statement>>,
}

/// catch clause with its optional binding
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Statement>,
}

// ============================================================================
// Functions
// ============================================================================

/// A function declaration, expression, method or arrow function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    /// Arrow functions take `this` from the enclosing scope
    pub is_arrow: bool,
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub rest: bool,
}

/// Function body
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Statement>),
    /// Concise arrow body, `x => x * 2`
    Expression(Box<Expr>),
}

// ============================================================================
// Expressions
// ============================================================================

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Undefined,
    Template(Vec<TemplatePart>),
    Identifier(String),
    This,
    Array(Vec<Argument>),
    Object(Vec<ObjectMember>),
    Function(Rc<FunctionDef>),
    Member {
        object: Box<Expr>,
        property: MemberProperty,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Argument>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        arguments: Vec<Argument>,
    },
    Unary {
        op: UnaryOp,
        argument: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
}

impl Expr {
    /// Whether the expression may appear on the left of an assignment
    pub fn is_assignment_target(&self) -> bool {
        matches!(self, Expr::Identifier(_) | Expr::Member { .. })
    }
}

/// Piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Substitution(Expr),
}

/// Call argument or array element, possibly spread
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub spread: bool,
    pub value: Expr,
}

/// Property selected by a member expression
#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    Named(String),
    Computed(Box<Expr>),
}

/// Member of an object literal
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMember {
    Property { key: PropertyKey, value: Expr },
    Spread(Expr),
}

/// Key of an object literal member
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Static(String),
    Computed(Expr),
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
    BitNot,
    Typeof,
    Void,
    Delete,
}

/// `++` / `--`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Binary operators that always evaluate both operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    Instanceof,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::In => "in",
            BinaryOp::Instanceof => "instanceof",
        };
        write!(f, "{}", s)
    }
}

/// Short-circuiting operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Assignment operators; compound forms carry the operator they apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    Logical(LogicalOp),
}
