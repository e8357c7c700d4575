//! Pest grammar parser for ScriptIt scripts

use std::rc::Rc;
use std::sync::LazyLock;

use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::error::{Result, ScriptError};
use crate::parser::ast::*;

#[derive(Parser)]
#[grammar = "../grammar/scriptit.pest"]
pub struct ScriptParser;

/// Binary operator precedence, loosest first
static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::op_nullish, Assoc::Left))
        .op(Op::infix(Rule::op_or, Assoc::Left))
        .op(Op::infix(Rule::op_and, Assoc::Left))
        .op(Op::infix(Rule::op_bit_or, Assoc::Left))
        .op(Op::infix(Rule::op_bit_xor, Assoc::Left))
        .op(Op::infix(Rule::op_bit_and, Assoc::Left))
        .op(Op::infix(Rule::op_eq, Assoc::Left)
            | Op::infix(Rule::op_ne, Assoc::Left)
            | Op::infix(Rule::op_strict_eq, Assoc::Left)
            | Op::infix(Rule::op_strict_ne, Assoc::Left))
        .op(Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left)
            | Op::infix(Rule::op_instanceof, Assoc::Left)
            | Op::infix(Rule::op_in, Assoc::Left))
        .op(Op::infix(Rule::op_shl, Assoc::Left)
            | Op::infix(Rule::op_shr, Assoc::Left)
            | Op::infix(Rule::op_ushr, Assoc::Left))
        .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
        .op(Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_div, Assoc::Left)
            | Op::infix(Rule::op_mod, Assoc::Left))
        .op(Op::infix(Rule::op_pow, Assoc::Right))
});

fn syntax_error(message: impl Into<String>) -> ScriptError {
    ScriptError::Compile(message.into())
}

fn next_pair<'a>(pairs: &mut Pairs<'a, Rule>, what: &str) -> Result<Pair<'a, Rule>> {
    pairs
        .next()
        .ok_or_else(|| syntax_error(format!("Expected {}", what)))
}

/// Parse a complete script into an AST
pub fn parse_script(input: &str) -> Result<Script> {
    let pairs = ScriptParser::parse(Rule::program, input)
        .map_err(|e| ScriptError::Compile(e.to_string()))?;

    let program = pairs
        .into_iter()
        .next()
        .ok_or_else(|| syntax_error("Empty script"))?;

    let statements = parse_statements(program.into_inner())?;
    Ok(Script { statements })
}

/// Parse a single expression; trailing input is rejected
pub fn parse_expression(input: &str) -> Result<Expr> {
    let script = parse_script(input)?;
    let mut statements = script.statements.into_iter();
    match (statements.next(), statements.next()) {
        (Some(Statement::Expression(expr)), None) => Ok(expr),
        _ => Err(syntax_error(format!("Not a single expression: {}", input.trim()))),
    }
}

fn parse_statements(pairs: Pairs<Rule>) -> Result<Vec<Statement>> {
    pairs
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(parse_statement)
        .collect()
}

// ============================================================================
// Statements
// ============================================================================

fn parse_statement(pair: Pair<Rule>) -> Result<Statement> {
    match pair.as_rule() {
        Rule::block => Ok(Statement::Block(parse_statements(pair.into_inner())?)),
        Rule::empty_statement => Ok(Statement::Empty),
        Rule::expression_statement => {
            let mut inner = pair.into_inner();
            Ok(Statement::Expression(parse_expr(next_pair(&mut inner, "expression")?)?))
        }
        Rule::var_statement => {
            let mut inner = pair.into_inner();
            Ok(Statement::Declaration(parse_var_declaration(next_pair(
                &mut inner,
                "declaration",
            )?)?))
        }
        Rule::function_declaration => Ok(Statement::Function(Rc::new(parse_function(pair, false)?))),
        Rule::if_statement => {
            let mut inner = pair.into_inner();
            let test = parse_expr(next_pair(&mut inner, "condition")?)?;
            let consequent = Box::new(parse_statement(next_pair(&mut inner, "if body")?)?);
            let alternate = inner.next().map(parse_statement).transpose()?.map(Box::new);
            Ok(Statement::If(IfStatement {
                test,
                consequent,
                alternate,
            }))
        }
        Rule::while_statement => {
            let mut inner = pair.into_inner();
            let test = parse_expr(next_pair(&mut inner, "condition")?)?;
            let body = Box::new(parse_statement(next_pair(&mut inner, "loop body")?)?);
            Ok(Statement::While { test, body })
        }
        Rule::do_while_statement => {
            let mut inner = pair.into_inner();
            let body = Box::new(parse_statement(next_pair(&mut inner, "loop body")?)?);
            let test = parse_expr(next_pair(&mut inner, "condition")?)?;
            Ok(Statement::DoWhile { body, test })
        }
        Rule::for_statement => parse_for(pair),
        Rule::return_statement => {
            let value = pair.into_inner().next().map(parse_expr).transpose()?;
            Ok(Statement::Return(value))
        }
        Rule::break_statement => Ok(Statement::Break),
        Rule::continue_statement => Ok(Statement::Continue),
        Rule::throw_statement => {
            let mut inner = pair.into_inner();
            Ok(Statement::Throw(parse_expr(next_pair(&mut inner, "thrown value")?)?))
        }
        Rule::try_statement => parse_try(pair),
        rule => Err(syntax_error(format!("Unexpected rule in statement: {:?}", rule))),
    }
}

fn parse_var_kind(pair: &Pair<Rule>) -> VarKind {
    match pair.as_str() {
        "const" => VarKind::Const,
        "var" => VarKind::Var,
        _ => VarKind::Let,
    }
}

fn parse_var_declaration(pair: Pair<Rule>) -> Result<VarDeclaration> {
    let mut inner = pair.into_inner();
    let kind = parse_var_kind(&next_pair(&mut inner, "declaration keyword")?);

    let mut bindings = Vec::new();
    for binding in inner {
        let mut parts = binding.into_inner();
        let name = next_pair(&mut parts, "binding name")?.as_str().to_string();
        let init = parts.next().map(parse_assignment).transpose()?;
        if kind == VarKind::Const && init.is_none() {
            return Err(syntax_error(format!(
                "Missing initializer in const declaration '{}'",
                name
            )));
        }
        bindings.push(VarBinding { name, init });
    }

    Ok(VarDeclaration { kind, bindings })
}

fn parse_for(pair: Pair<Rule>) -> Result<Statement> {
    let mut inner = pair.into_inner();
    let head = next_pair(&mut inner, "for loop head")?;
    let body = Box::new(parse_statement(next_pair(&mut inner, "loop body")?)?);

    match head.as_rule() {
        Rule::for_of_head | Rule::for_in_head => {
            let is_of = head.as_rule() == Rule::for_of_head;
            let mut parts = head.into_inner();
            let binding = next_pair(&mut parts, "loop variable")?;
            let source = parse_expr(next_pair(&mut parts, "iterated value")?)?;

            let mut kind = None;
            let mut name = String::new();
            for part in binding.into_inner() {
                match part.as_rule() {
                    Rule::var_kind => kind = Some(parse_var_kind(&part)),
                    _ => name = part.as_str().to_string(),
                }
            }

            let each = ForEachLoop {
                kind,
                name,
                source,
                body,
            };
            Ok(if is_of {
                Statement::ForOf(each)
            } else {
                Statement::ForIn(each)
            })
        }
        Rule::for_classic_head => {
            let mut parts = head.into_inner();
            let init = match next_pair(&mut parts, "loop initializer")?.into_inner().next() {
                Some(p) if p.as_rule() == Rule::var_declaration => {
                    Some(ForInit::Declaration(parse_var_declaration(p)?))
                }
                Some(p) => Some(ForInit::Expression(parse_expr(p)?)),
                None => None,
            };
            let test = next_pair(&mut parts, "loop condition")?
                .into_inner()
                .next()
                .map(parse_expr)
                .transpose()?;
            let update = next_pair(&mut parts, "loop update")?
                .into_inner()
                .next()
                .map(parse_expr)
                .transpose()?;
            Ok(Statement::For(ForLoop {
                init,
                test,
                update,
                body,
            }))
        }
        rule => Err(syntax_error(format!("Unexpected for loop head: {:?}", rule))),
    }
}

fn parse_try(pair: Pair<Rule>) -> Result<Statement> {
    let mut inner = pair.into_inner();
    let block = parse_statements(next_pair(&mut inner, "try block")?.into_inner())?;

    let mut handler = None;
    let mut finalizer = None;
    for part in inner {
        match part.as_rule() {
            Rule::catch_clause => {
                let mut param = None;
                let mut body = Vec::new();
                for p in part.into_inner() {
                    match p.as_rule() {
                        Rule::identifier => param = Some(p.as_str().to_string()),
                        _ => body = parse_statements(p.into_inner())?,
                    }
                }
                handler = Some(CatchClause { param, body });
            }
            Rule::finally_clause => {
                let mut parts = part.into_inner();
                let block = next_pair(&mut parts, "finally block")?;
                finalizer = Some(parse_statements(block.into_inner())?);
            }
            rule => return Err(syntax_error(format!("Unexpected rule in try: {:?}", rule))),
        }
    }

    if handler.is_none() && finalizer.is_none() {
        return Err(syntax_error("Missing catch or finally after try"));
    }

    Ok(Statement::Try(TryStatement {
        block,
        handler,
        finalizer,
    }))
}

// ============================================================================
// Functions
// ============================================================================

/// Parse `function_declaration`, `function_expression` or `method_member`
/// children: an optional name, `parameters` and `function_body`
fn parse_function(pair: Pair<Rule>, is_method: bool) -> Result<FunctionDef> {
    let mut name = None;
    let mut params = Vec::new();
    let mut body = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::identifier if !is_method => name = Some(part.as_str().to_string()),
            Rule::parameters => params = parse_parameters(part)?,
            Rule::function_body => body = parse_statements(part.into_inner())?,
            _ if is_method => name = Some(parse_static_key(part)?),
            rule => return Err(syntax_error(format!("Unexpected rule in function: {:?}", rule))),
        }
    }

    Ok(FunctionDef {
        name,
        params,
        body: FunctionBody::Block(body),
        is_arrow: false,
    })
}

fn parse_parameters(pair: Pair<Rule>) -> Result<Vec<Param>> {
    let mut params = Vec::new();
    for param in pair.into_inner() {
        let mut rest = false;
        let mut name = String::new();
        let mut default = None;
        for part in param.into_inner() {
            match part.as_rule() {
                Rule::rest_marker => rest = true,
                Rule::identifier => name = part.as_str().to_string(),
                _ => default = Some(parse_assignment(part)?),
            }
        }
        if rest && default.is_some() {
            return Err(syntax_error("Rest parameter may not have a default initializer"));
        }
        params.push(Param {
            name,
            default,
            rest,
        });
    }

    if let Some(pos) = params.iter().position(|p| p.rest) {
        if pos + 1 != params.len() {
            return Err(syntax_error("Rest parameter must be last formal parameter"));
        }
    }

    Ok(params)
}

fn parse_arrow(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let head = next_pair(&mut inner, "arrow parameters")?;
    let params = match head.into_inner().next() {
        Some(p) if p.as_rule() == Rule::parameters => parse_parameters(p)?,
        Some(p) => vec![Param {
            name: p.as_str().to_string(),
            default: None,
            rest: false,
        }],
        None => Vec::new(),
    };

    let body_pair = next_pair(&mut inner, "arrow body")?;
    let body = match body_pair.as_rule() {
        Rule::function_body => FunctionBody::Block(parse_statements(body_pair.into_inner())?),
        _ => FunctionBody::Expression(Box::new(parse_assignment(body_pair)?)),
    };

    Ok(Expr::Function(Rc::new(FunctionDef {
        name: None,
        params,
        body,
        is_arrow: true,
    })))
}

// ============================================================================
// Expressions
// ============================================================================

/// Parse any expression-producing pair
fn parse_expr(pair: Pair<Rule>) -> Result<Expr> {
    match pair.as_rule() {
        Rule::expression => {
            let mut items = pair
                .into_inner()
                .map(parse_assignment)
                .collect::<Result<Vec<_>>>()?;
            if items.len() == 1 {
                Ok(items.remove(0))
            } else {
                Ok(Expr::Sequence(items))
            }
        }
        Rule::assignment => parse_assignment(pair),
        _ => parse_primary(pair),
    }
}

fn parse_assignment(pair: Pair<Rule>) -> Result<Expr> {
    if pair.as_rule() == Rule::expression {
        return parse_expr(pair);
    }

    let mut inner = pair.into_inner();
    let first = next_pair(&mut inner, "expression")?;
    if first.as_rule() == Rule::arrow_function {
        return parse_arrow(first);
    }

    let target = parse_conditional(first)?;
    let Some(op_pair) = inner.next() else {
        return Ok(target);
    };

    if !target.is_assignment_target() {
        return Err(syntax_error("Invalid left-hand side in assignment"));
    }
    let op = parse_assign_op(op_pair.as_str())?;
    let value = parse_assignment(next_pair(&mut inner, "assigned value")?)?;

    Ok(Expr::Assign {
        op,
        target: Box::new(target),
        value: Box::new(value),
    })
}

fn parse_assign_op(op: &str) -> Result<AssignOp> {
    Ok(match op {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Compound(BinaryOp::Add),
        "-=" => AssignOp::Compound(BinaryOp::Sub),
        "*=" => AssignOp::Compound(BinaryOp::Mul),
        "/=" => AssignOp::Compound(BinaryOp::Div),
        "%=" => AssignOp::Compound(BinaryOp::Mod),
        "**=" => AssignOp::Compound(BinaryOp::Pow),
        "<<=" => AssignOp::Compound(BinaryOp::Shl),
        ">>=" => AssignOp::Compound(BinaryOp::Shr),
        ">>>=" => AssignOp::Compound(BinaryOp::UShr),
        "&=" => AssignOp::Compound(BinaryOp::BitAnd),
        "|=" => AssignOp::Compound(BinaryOp::BitOr),
        "^=" => AssignOp::Compound(BinaryOp::BitXor),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        "&&=" => AssignOp::Logical(LogicalOp::And),
        other => return Err(syntax_error(format!("Unknown assignment operator: {}", other))),
    })
}

fn parse_conditional(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let test = parse_binary(next_pair(&mut inner, "operand")?)?;
    match inner.next() {
        None => Ok(test),
        Some(consequent) => {
            let consequent = parse_assignment(consequent)?;
            let alternate = parse_assignment(next_pair(&mut inner, "conditional alternate")?)?;
            Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            })
        }
    }
}

fn parse_binary(pair: Pair<Rule>) -> Result<Expr> {
    PRATT
        .map_primary(parse_unary)
        .map_infix(|lhs, op, rhs| {
            let left = Box::new(lhs?);
            let right = Box::new(rhs?);
            let logical = match op.as_rule() {
                Rule::op_nullish => Some(LogicalOp::Nullish),
                Rule::op_or => Some(LogicalOp::Or),
                Rule::op_and => Some(LogicalOp::And),
                _ => None,
            };
            if let Some(op) = logical {
                return Ok(Expr::Logical { op, left, right });
            }
            let op = match op.as_rule() {
                Rule::op_strict_eq => BinaryOp::StrictEq,
                Rule::op_strict_ne => BinaryOp::StrictNotEq,
                Rule::op_eq => BinaryOp::Eq,
                Rule::op_ne => BinaryOp::NotEq,
                Rule::op_instanceof => BinaryOp::Instanceof,
                Rule::op_in => BinaryOp::In,
                Rule::op_ushr => BinaryOp::UShr,
                Rule::op_shr => BinaryOp::Shr,
                Rule::op_shl => BinaryOp::Shl,
                Rule::op_le => BinaryOp::LtEq,
                Rule::op_ge => BinaryOp::GtEq,
                Rule::op_lt => BinaryOp::Lt,
                Rule::op_gt => BinaryOp::Gt,
                Rule::op_bit_or => BinaryOp::BitOr,
                Rule::op_bit_xor => BinaryOp::BitXor,
                Rule::op_bit_and => BinaryOp::BitAnd,
                Rule::op_add => BinaryOp::Add,
                Rule::op_sub => BinaryOp::Sub,
                Rule::op_pow => BinaryOp::Pow,
                Rule::op_mul => BinaryOp::Mul,
                Rule::op_div => BinaryOp::Div,
                Rule::op_mod => BinaryOp::Mod,
                rule => return Err(syntax_error(format!("Unknown binary operator: {:?}", rule))),
            };
            Ok(Expr::Binary { op, left, right })
        })
        .parse(pair.into_inner())
}

fn parse_unary(pair: Pair<Rule>) -> Result<Expr> {
    let mut parts: Vec<Pair<Rule>> = pair.into_inner().collect();
    let operand = parts
        .pop()
        .ok_or_else(|| syntax_error("Expected operand"))?;
    let mut expr = parse_postfix(operand)?;

    for op in parts.into_iter().rev() {
        let unary = match op.as_rule() {
            Rule::op_increment | Rule::op_decrement => {
                if !expr.is_assignment_target() {
                    return Err(syntax_error("Invalid left-hand side in prefix operation"));
                }
                let op = if op.as_rule() == Rule::op_increment {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                expr = Expr::Update {
                    op,
                    prefix: true,
                    target: Box::new(expr),
                };
                continue;
            }
            Rule::op_typeof => UnaryOp::Typeof,
            Rule::op_void => UnaryOp::Void,
            Rule::op_delete => UnaryOp::Delete,
            Rule::op_not => UnaryOp::Not,
            Rule::op_bit_not => UnaryOp::BitNot,
            Rule::op_negate => UnaryOp::Negate,
            Rule::op_plus => UnaryOp::Plus,
            rule => return Err(syntax_error(format!("Unknown unary operator: {:?}", rule))),
        };
        expr = Expr::Unary {
            op: unary,
            argument: Box::new(expr),
        };
    }

    Ok(expr)
}

fn parse_postfix(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let expr = parse_call_chain(next_pair(&mut inner, "operand")?)?;
    match inner.next() {
        None => Ok(expr),
        Some(update) => {
            if !expr.is_assignment_target() {
                return Err(syntax_error("Invalid left-hand side in postfix operation"));
            }
            let op = if update.as_str() == "++" {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            Ok(Expr::Update {
                op,
                prefix: false,
                target: Box::new(expr),
            })
        }
    }
}

fn parse_call_chain(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let head = next_pair(&mut inner, "expression")?;
    let mut expr = match head.as_rule() {
        Rule::new_expression => parse_new(head)?,
        _ => parse_primary(head)?,
    };
    for link in inner {
        expr = apply_link(expr, link)?;
    }
    Ok(expr)
}

fn apply_link(object: Expr, link: Pair<Rule>) -> Result<Expr> {
    let object = Box::new(object);
    Ok(match link.as_rule() {
        Rule::member_access | Rule::optional_member => Expr::Member {
            optional: link.as_rule() == Rule::optional_member,
            property: MemberProperty::Named(link.into_inner().as_str().to_string()),
            object,
        },
        Rule::computed_access | Rule::optional_computed => {
            let optional = link.as_rule() == Rule::optional_computed;
            let mut inner = link.into_inner();
            let property = parse_expr(next_pair(&mut inner, "property expression")?)?;
            Expr::Member {
                object,
                property: MemberProperty::Computed(Box::new(property)),
                optional,
            }
        }
        Rule::call_arguments => Expr::Call {
            callee: object,
            arguments: parse_arguments(link)?,
            optional: false,
        },
        Rule::optional_call => {
            let mut inner = link.into_inner();
            Expr::Call {
                callee: object,
                arguments: parse_arguments(next_pair(&mut inner, "arguments")?)?,
                optional: true,
            }
        }
        rule => return Err(syntax_error(format!("Unexpected rule in member chain: {:?}", rule))),
    })
}

fn parse_new(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut callee_parts = next_pair(&mut inner, "constructor")?.into_inner();
    let mut callee = parse_primary(next_pair(&mut callee_parts, "constructor")?)?;
    for link in callee_parts {
        callee = apply_link(callee, link)?;
    }
    let arguments = inner.next().map(parse_arguments).transpose()?.unwrap_or_default();
    Ok(Expr::New {
        callee: Box::new(callee),
        arguments,
    })
}

/// Parse `call_arguments` or `array_literal` children
fn parse_arguments(pair: Pair<Rule>) -> Result<Vec<Argument>> {
    pair.into_inner()
        .map(|arg| {
            let mut spread = false;
            let mut value = None;
            for part in arg.into_inner() {
                match part.as_rule() {
                    Rule::spread => spread = true,
                    _ => value = Some(parse_assignment(part)?),
                }
            }
            let value = value.ok_or_else(|| syntax_error("Expected argument"))?;
            Ok(Argument { spread, value })
        })
        .collect()
}

fn parse_primary(pair: Pair<Rule>) -> Result<Expr> {
    match pair.as_rule() {
        Rule::number => Ok(Expr::Number(parse_number(pair.as_str())?)),
        Rule::string => Ok(Expr::String(parse_string_literal(pair)?)),
        Rule::template => {
            let mut parts = Vec::new();
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::template_chunk => parts.push(TemplatePart::Text(unescape(part.as_str())?)),
                    _ => {
                        let mut inner = part.into_inner();
                        let expr = parse_expr(next_pair(&mut inner, "substitution")?)?;
                        parts.push(TemplatePart::Substitution(expr));
                    }
                }
            }
            Ok(Expr::Template(parts))
        }
        Rule::boolean => Ok(Expr::Bool(pair.as_str() == "true")),
        Rule::null_literal => Ok(Expr::Null),
        Rule::undefined_literal => Ok(Expr::Undefined),
        Rule::this_expression => Ok(Expr::This),
        Rule::identifier => Ok(Expr::Identifier(pair.as_str().to_string())),
        Rule::parenthesized => {
            let mut inner = pair.into_inner();
            parse_expr(next_pair(&mut inner, "expression")?)
        }
        Rule::array_literal => Ok(Expr::Array(parse_arguments(pair)?)),
        Rule::object_literal => parse_object(pair),
        Rule::function_expression => Ok(Expr::Function(Rc::new(parse_function(pair, false)?))),
        Rule::expression | Rule::assignment => parse_expr(pair),
        rule => Err(syntax_error(format!("Unexpected rule in expression: {:?}", rule))),
    }
}

fn parse_object(pair: Pair<Rule>) -> Result<Expr> {
    let mut members = Vec::new();
    for member in pair.into_inner() {
        match member.as_rule() {
            Rule::spread_member => {
                let mut inner = member.into_inner();
                members.push(ObjectMember::Spread(parse_assignment(next_pair(
                    &mut inner,
                    "spread value",
                )?)?));
            }
            Rule::method_member => {
                let def = parse_function(member, true)?;
                let key = PropertyKey::Static(def.name.clone().unwrap_or_default());
                members.push(ObjectMember::Property {
                    key,
                    value: Expr::Function(Rc::new(def)),
                });
            }
            Rule::keyed_member => {
                let mut inner = member.into_inner();
                let key_pair = next_pair(&mut inner, "property key")?;
                let key = match key_pair.as_rule() {
                    Rule::computed_key => {
                        let mut k = key_pair.into_inner();
                        PropertyKey::Computed(parse_assignment(next_pair(&mut k, "key")?)?)
                    }
                    _ => PropertyKey::Static(parse_static_key(key_pair)?),
                };
                let value = parse_assignment(next_pair(&mut inner, "property value")?)?;
                members.push(ObjectMember::Property { key, value });
            }
            Rule::shorthand_member => {
                let name = member.as_str().trim().to_string();
                members.push(ObjectMember::Property {
                    key: PropertyKey::Static(name.clone()),
                    value: Expr::Identifier(name),
                });
            }
            rule => return Err(syntax_error(format!("Unexpected rule in object: {:?}", rule))),
        }
    }
    Ok(Expr::Object(members))
}

fn parse_static_key(pair: Pair<Rule>) -> Result<String> {
    match pair.as_rule() {
        Rule::property_name | Rule::identifier => Ok(pair.as_str().to_string()),
        Rule::string => parse_string_literal(pair),
        Rule::number => Ok(number_key(parse_number(pair.as_str())?)),
        rule => Err(syntax_error(format!("Invalid property key: {:?}", rule))),
    }
}

// ============================================================================
// Literals
// ============================================================================

fn parse_number(text: &str) -> Result<f64> {
    let radix = match text.get(..2) {
        Some("0x") | Some("0X") => 16,
        Some("0b") | Some("0B") => 2,
        Some("0o") | Some("0O") => 8,
        _ => {
            return text
                .parse::<f64>()
                .map_err(|_| syntax_error(format!("Invalid number literal: {}", text)))
        }
    };

    text[2..].chars().try_fold(0f64, |acc, c| {
        c.to_digit(radix)
            .map(|d| acc * radix as f64 + d as f64)
            .ok_or_else(|| syntax_error(format!("Invalid number literal: {}", text)))
    })
}

/// Numeric object keys are stored under their canonical string form
fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn parse_string_literal(pair: Pair<Rule>) -> Result<String> {
    match pair.into_inner().next() {
        Some(inner) => unescape(inner.as_str()),
        None => Ok(String::new()),
    }
}

/// Resolve backslash escapes in string and template literal text
pub fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            return Err(syntax_error("Unterminated escape sequence"));
        };
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(code_point(&hex, raw)?);
            }
            'u' => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    let digits: String = chars.by_ref().take_while(|c| *c != '}').collect();
                    digits
                } else {
                    chars.by_ref().take(4).collect()
                };
                out.push(code_point(&hex, raw)?);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

fn code_point(hex: &str, raw: &str) -> Result<char> {
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| syntax_error(format!("Invalid escape sequence in \"{}\"", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(src: &str) -> Statement {
        let mut script = parse_script(src).unwrap();
        assert_eq!(script.statements.len(), 1, "source: {}", src);
        script.statements.remove(0)
    }

    #[test]
    fn test_parse_let_declaration() {
        match single("let total = 1 + 2;") {
            Statement::Declaration(decl) => {
                assert_eq!(decl.kind, VarKind::Let);
                assert_eq!(decl.bindings[0].name, "total");
                assert!(matches!(
                    decl.bindings[0].init,
                    Some(Expr::Binary { op: BinaryOp::Add, .. })
                ));
            }
            other => panic!("Expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pow_is_right_associative() {
        let expr = parse_expression("2 ** 3 ** 2").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Pow, left, right } => {
                assert_eq!(*left, Expr::Number(2.0));
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("Expected power, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_logical_operators() {
        let expr = parse_expression("a ?? b || c").unwrap();
        assert!(matches!(expr, Expr::Logical { op: LogicalOp::Nullish, .. }));
    }

    #[test]
    fn test_keyword_prefixed_identifiers() {
        let expr = parse_expression("returnValue + index + doThing").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_parse_member_call_chain() {
        let expr = parse_expression("ScriptIt.funcs.count(1, ...rest)").unwrap();
        match expr {
            Expr::Call { callee, arguments, optional } => {
                assert!(!optional);
                assert_eq!(arguments.len(), 2);
                assert!(arguments[1].spread);
                assert!(matches!(
                    *callee,
                    Expr::Member { property: MemberProperty::Named(ref n), .. } if n == "count"
                ));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_optional_chain() {
        let expr = parse_expression("a?.b?.[0]?.()").unwrap();
        assert!(matches!(expr, Expr::Call { optional: true, .. }));
    }

    #[test]
    fn test_parse_arrow_functions() {
        match parse_expression("(a, ...rest) => a + rest.length").unwrap() {
            Expr::Function(def) => {
                assert!(def.is_arrow);
                assert_eq!(def.params.len(), 2);
                assert!(def.params[1].rest);
                assert!(matches!(def.body, FunctionBody::Expression(_)));
            }
            other => panic!("Expected arrow function, got {:?}", other),
        }

        match parse_expression("x => { return x * 2 }").unwrap() {
            Expr::Function(def) => assert!(matches!(def.body, FunctionBody::Block(_))),
            other => panic!("Expected arrow function, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_object_literal() {
        let expr = parse_expression("({ a: 1, 'b': 2, [k]: 3, c, ...rest, m(x) { return x } })")
            .unwrap();
        match expr {
            Expr::Object(members) => {
                assert_eq!(members.len(), 6);
                assert!(matches!(members[2], ObjectMember::Property { key: PropertyKey::Computed(_), .. }));
                assert!(matches!(members[4], ObjectMember::Spread(_)));
            }
            other => panic!("Expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_loops() {
        assert!(matches!(single("for (const x of [1, 2]) total += x"), Statement::ForOf(_)));
        assert!(matches!(single("for (k in obj) {}"), Statement::ForIn(_)));
        match single("for (let i = 0; i < 3; i++) {}") {
            Statement::For(f) => {
                assert!(matches!(f.init, Some(ForInit::Declaration(_))));
                assert!(f.test.is_some());
                assert!(f.update.is_some());
            }
            other => panic!("Expected for loop, got {:?}", other),
        }
        assert!(matches!(single("for (;;) break"), Statement::For(_)));
    }

    #[test]
    fn test_parse_try_catch_finally() {
        match single("try { f() } catch (e) { g(e) } finally { h() }") {
            Statement::Try(t) => {
                assert_eq!(t.handler.unwrap().param.as_deref(), Some("e"));
                assert!(t.finalizer.is_some());
            }
            other => panic!("Expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_template_literal() {
        match parse_expression("`sum: ${a + b}!`").unwrap() {
            Expr::Template(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], TemplatePart::Text("sum: ".to_string()));
            }
            other => panic!("Expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_expression("0xff").unwrap(), Expr::Number(255.0));
        assert_eq!(parse_expression("0b101").unwrap(), Expr::Number(5.0));
        assert_eq!(parse_expression("1.5e3").unwrap(), Expr::Number(1500.0));
        assert_eq!(parse_expression(".25").unwrap(), Expr::Number(0.25));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb").unwrap(), "a\nb");
        assert_eq!(unescape(r"\x41B\u{43}").unwrap(), "ABC");
        assert_eq!(unescape(r#"\"q\""#).unwrap(), "\"q\"");
        assert!(unescape(r"\uZZZZ").is_err());
    }

    #[test]
    fn test_optional_semicolons_and_comments() {
        let script = parse_script("let a = 1 // first\n/* block */ let b = 2\na + b").unwrap();
        assert_eq!(script.statements.len(), 3);
    }

    #[test]
    fn test_reject_invalid_assignment_target() {
        assert!(matches!(parse_script("1 = 2"), Err(ScriptError::Compile(_))));
        assert!(matches!(parse_script("f()++"), Err(ScriptError::Compile(_))));
    }

    #[test]
    fn test_reject_module_syntax() {
        assert!(matches!(parse_script("import async return"), Err(ScriptError::Compile(_))));
    }

    #[test]
    fn test_reject_const_without_initializer() {
        assert!(parse_script("const x;").is_err());
    }

    #[test]
    fn test_reject_unbalanced_source() {
        assert!(parse_script("function f( {").is_err());
        assert!(parse_script("let x = (1 + ;").is_err());
    }
}
