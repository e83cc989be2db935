use std::rc::Rc;

use hearth_runtime::{EvalError, SyntaxKind, SyntaxNode};
use pest::error::{Error, ErrorVariant, LineColLocation};
use pest::iterators::{Pair, Pairs};
use pest::{Parser, Position};
use pest_derive::Parser;

use crate::ast::*;

/// Deepest bracket nesting accepted in program text
pub const MAX_NESTING_DEPTH: usize = 64;

/// Deepest statement or expression tree handed to the interpreter
pub const MAX_SYNTAX_DEPTH: usize = 256;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to src
pub struct ScriptParser;

/// Parse program text into the interpreter's AST
pub fn parse_script(source: &str, origin: &str) -> Result<Script, EvalError> {
    let program = parse_program(source, origin)?;
    let body = build_statements(program.into_inner(), 0).map_err(|e| syntax_error(e, origin))?;
    Ok(Script {
        origin: Rc::from(origin),
        body,
    })
}

/// Parse program text into the language-neutral syntax tree
pub fn parse_syntax(source: &str, origin: &str) -> Result<SyntaxNode, EvalError> {
    let program = parse_program(source, origin)?;
    Ok(syntax_node(program))
}

fn parse_program<'i>(source: &'i str, origin: &str) -> Result<Pair<'i, Rule>, EvalError> {
    check_nesting(source, origin)?;
    let mut pairs =
        ScriptParser::parse(Rule::program, source).map_err(|e| syntax_error(e, origin))?;
    pairs.next().ok_or_else(|| EvalError::Syntax {
        origin: origin.to_string(),
        line: 1,
        column: 1,
        message: "empty parse result".to_string(),
    })
}

/// Reject bracket nesting the recursive descent parser cannot take
fn check_nesting(source: &str, origin: &str) -> Result<(), EvalError> {
    let mut depth = 0usize;
    let mut chars = source.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match c {
            '"' | '\'' => {
                while let Some((_, next)) = chars.next() {
                    match next {
                        '\\' => {
                            chars.next();
                        }
                        '\n' => break,
                        _ if next == c => break,
                        _ => {}
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut star = false;
                for (_, next) in chars.by_ref() {
                    if star && next == '/' {
                        break;
                    }
                    star = next == '*';
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    let (line, column) = Position::new(source, offset)
                        .map(|pos| pos.line_col())
                        .unwrap_or((1, 1));
                    return Err(EvalError::Syntax {
                        origin: origin.to_string(),
                        line,
                        column,
                        message: format!("brackets nested deeper than {}", MAX_NESTING_DEPTH),
                    });
                }
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn syntax_error(err: Error<Rule>, origin: &str) -> EvalError {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    let err = err.renamed_rules(|rule| match rule {
        Rule::EOI => "end of input".to_string(),
        other => format!("{:?}", other).replace('_', " "),
    });
    EvalError::Syntax {
        origin: origin.to_string(),
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

fn get_unexpected_error(pair: &Pair<Rule>) -> Error<Rule> {
    let message = format!("Unexpected {:?}", pair.as_rule());
    Error::new_from_span(ErrorVariant::CustomError { message }, pair.as_span())
}

fn get_missing_error(parent: &Pair<Rule>, what: &str) -> Error<Rule> {
    let message = format!("Expected {} in {:?}", what, parent.as_rule());
    Error::new_from_span(ErrorVariant::CustomError { message }, parent.as_span())
}

fn get_too_deep_error(pair: &Pair<Rule>) -> Error<Rule> {
    let message = format!("Code nested deeper than {} levels", MAX_SYNTAX_DEPTH);
    Error::new_from_span(ErrorVariant::CustomError { message }, pair.as_span())
}

fn check_depth(pair: &Pair<Rule>, depth: usize) -> Result<(), Error<Rule>> {
    if depth > MAX_SYNTAX_DEPTH {
        return Err(get_too_deep_error(pair));
    }
    Ok(())
}

fn expect_next<'i>(
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    parent: &Pair<'i, Rule>,
    what: &str,
) -> Result<Pair<'i, Rule>, Error<Rule>> {
    inner.next().ok_or_else(|| get_missing_error(parent, what))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_function | Rule::kw_if | Rule::kw_else | Rule::kw_while | Rule::kw_return
    )
}

/// Inner pairs without keyword tokens
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn is_precedence_layer(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::expression
            | Rule::assignment
            | Rule::logical_or
            | Rule::logical_and
            | Rule::equality
            | Rule::comparison
            | Rule::additive
            | Rule::multiplicative
            | Rule::unary
            | Rule::postfix
    )
}

/// Skip precedence layers wrapping a single operand, parentheses included
fn innermost(mut pair: Pair<Rule>) -> Pair<Rule> {
    while is_precedence_layer(pair.as_rule()) {
        let mut inner = pair.clone().into_inner();
        match (inner.next(), inner.next()) {
            (Some(only), None) => pair = only,
            _ => break,
        }
    }
    pair
}

fn build_statements(pairs: Pairs<Rule>, depth: usize) -> Result<Vec<Stmt>, Error<Rule>> {
    let mut statements = vec![];
    for pair in pairs {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        statements.push(build_statement(pair, depth)?);
    }
    Ok(statements)
}

fn build_statement(pair: Pair<Rule>, depth: usize) -> Result<Stmt, Error<Rule>> {
    check_depth(&pair, depth)?;
    let line = line_of(&pair);
    let parent = pair.clone();
    let kind = match pair.as_rule() {
        Rule::empty_statement => StmtKind::Empty,
        Rule::block => StmtKind::Block(build_statements(pair.into_inner(), depth + 1)?),
        Rule::function_declaration => StmtKind::Function(Rc::new(build_function(pair, depth)?)),
        Rule::variable_declaration => build_declaration(pair, depth)?,
        Rule::if_statement => build_if(pair, depth)?,
        Rule::while_statement => {
            let mut inner = significant(pair);
            let condition = expect_next(&mut inner, &parent, "condition")?;
            let body = expect_next(&mut inner, &parent, "statement")?;
            StmtKind::While {
                condition: build_expression(condition, depth + 1)?,
                body: Box::new(build_statement(body, depth + 1)?),
            }
        }
        Rule::return_statement => match significant(pair).next() {
            Some(p) => StmtKind::Return(Some(build_expression(p, depth + 1)?)),
            None => StmtKind::Return(None),
        },
        Rule::expression_statement => {
            let mut inner = pair.into_inner();
            let expression = expect_next(&mut inner, &parent, "expression")?;
            StmtKind::Expression(build_expression(expression, depth + 1)?)
        }
        _ => return Err(get_unexpected_error(&pair)),
    };
    Ok(Stmt { kind, line })
}

fn build_if(pair: Pair<Rule>, depth: usize) -> Result<StmtKind, Error<Rule>> {
    let parent = pair.clone();
    let mut inner = significant(pair);
    let condition = expect_next(&mut inner, &parent, "condition")?;
    let body = expect_next(&mut inner, &parent, "statement")?;

    let mut branches = vec![(line_of(&parent), condition, body)];
    let mut otherwise = None;
    for part in inner {
        if part.as_rule() == Rule::else_if {
            let else_parent = part.clone();
            let mut parts = significant(part);
            let condition = expect_next(&mut parts, &else_parent, "condition")?;
            let body = expect_next(&mut parts, &else_parent, "statement")?;
            branches.push((line_of(&else_parent), condition, body));
        } else {
            otherwise = Some(part);
        }
    }

    // Each `else if` nests one level below the branch before it
    let mut else_branch = match otherwise {
        Some(p) => Some(Box::new(build_statement(p, depth + branches.len())?)),
        None => None,
    };
    while let Some((line, condition, body)) = branches.pop() {
        let level = depth + branches.len();
        check_depth(&condition, level)?;
        let kind = StmtKind::If {
            condition: build_expression(condition, level + 1)?,
            then_branch: Box::new(build_statement(body, level + 1)?),
            else_branch: else_branch.take(),
        };
        if branches.is_empty() {
            return Ok(kind);
        }
        else_branch = Some(Box::new(Stmt { kind, line }));
    }
    Err(get_missing_error(&parent, "condition"))
}

fn build_declaration(pair: Pair<Rule>, depth: usize) -> Result<StmtKind, Error<Rule>> {
    let parent = pair.clone();
    let mut inner = pair.into_inner();
    let kind_pair = expect_next(&mut inner, &parent, "declaration kind")?;
    let kind = match kind_pair.as_str() {
        "let" => DeclarationKind::Let,
        "const" => DeclarationKind::Const,
        "var" => DeclarationKind::Var,
        _ => return Err(get_unexpected_error(&kind_pair)),
    };

    let mut declarators = vec![];
    for declarator in inner {
        let parent = declarator.clone();
        let mut parts = declarator.into_inner();
        let name = expect_next(&mut parts, &parent, "name")?.as_str().to_string();
        let init = match parts.next() {
            Some(p) => Some(build_expression(p, depth + 1)?),
            None => None,
        };
        declarators.push((name, init));
    }
    Ok(StmtKind::Declaration { kind, declarators })
}

fn build_function(pair: Pair<Rule>, depth: usize) -> Result<FunctionDef, Error<Rule>> {
    let mut name = None;
    let mut params = vec![];
    let mut body = vec![];
    for part in significant(pair) {
        match part.as_rule() {
            Rule::binding => name = Some(part.as_str().to_string()),
            Rule::parameters => {
                params = part.into_inner().map(|p| p.as_str().to_string()).collect();
            }
            Rule::function_body => body = build_statements(part.into_inner(), depth + 1)?,
            _ => return Err(get_unexpected_error(&part)),
        }
    }
    Ok(FunctionDef { name, params, body })
}

fn build_expression(pair: Pair<Rule>, depth: usize) -> Result<Expr, Error<Rule>> {
    let pair = innermost(pair);
    check_depth(&pair, depth)?;
    match pair.as_rule() {
        Rule::assignment => build_assignment(pair, depth),
        Rule::logical_or
        | Rule::logical_and
        | Rule::equality
        | Rule::comparison
        | Rule::additive
        | Rule::multiplicative => build_operator_chain(pair, depth),
        Rule::unary => build_unary(pair, depth),
        Rule::postfix => build_postfix(pair, depth),
        Rule::function_expression => Ok(Expr::Function(Rc::new(build_function(pair, depth)?))),
        Rule::array_literal => Ok(Expr::Array(build_list(pair, depth + 1)?)),
        Rule::object_literal => build_object(pair, depth),
        Rule::number_literal => build_number(pair),
        Rule::string_literal => Ok(Expr::Str(Rc::from(string_value(pair).as_str()))),
        Rule::boolean_literal => Ok(Expr::Bool(pair.as_str() == "true")),
        Rule::null_literal => Ok(Expr::Null),
        Rule::identifier => Ok(Expr::Identifier(pair.as_str().to_string())),
        _ => Err(get_unexpected_error(&pair)),
    }
}

fn build_list(pair: Pair<Rule>, depth: usize) -> Result<Vec<Expr>, Error<Rule>> {
    pair.into_inner()
        .map(|element| build_expression(element, depth))
        .collect()
}

fn build_object(pair: Pair<Rule>, depth: usize) -> Result<Expr, Error<Rule>> {
    let mut properties = vec![];
    for property in pair.into_inner() {
        let parent = property.clone();
        let mut parts = property.into_inner();
        let key = object_key_text(expect_next(&mut parts, &parent, "key")?);
        let value = build_expression(expect_next(&mut parts, &parent, "value")?, depth + 1)?;
        properties.push((key, value));
    }
    Ok(Expr::Object(properties))
}

fn build_number(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    pair.as_str().parse::<f64>().map(Expr::Number).map_err(|e| {
        Error::new_from_span(
            ErrorVariant::CustomError {
                message: format!("invalid number: {}", e),
            },
            pair.as_span(),
        )
    })
}

fn build_assignment(pair: Pair<Rule>, depth: usize) -> Result<Expr, Error<Rule>> {
    let parent = pair.clone();
    let mut inner = pair.into_inner();
    let mut value = expect_next(&mut inner, &parent, "expression")?;
    let mut targets = vec![];
    while let Some(op) = inner.next() {
        let next = expect_next(&mut inner, &parent, "value")?;
        targets.push((std::mem::replace(&mut value, next), assign_op(&op)?));
    }
    check_depth(&parent, depth + targets.len())?;

    // `a = b = c` assigns right to left
    let mut expr = build_expression(value, depth + targets.len())?;
    while let Some((target, op)) = targets.pop() {
        let span = target.as_span();
        let target = build_expression(target, depth + targets.len() + 1)?;
        if !matches!(
            target,
            Expr::Identifier(_) | Expr::Member { .. } | Expr::Index { .. }
        ) {
            return Err(Error::new_from_span(
                ErrorVariant::CustomError {
                    message: format!("Invalid assignment target: {}", target.describe()),
                },
                span,
            ));
        }
        expr = Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(expr),
        };
    }
    Ok(expr)
}

fn assign_op(op: &Pair<Rule>) -> Result<AssignOp, Error<Rule>> {
    Ok(match op.as_str() {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::AddAssign,
        "-=" => AssignOp::SubtractAssign,
        _ => return Err(get_unexpected_error(op)),
    })
}

/// Left-associative chain; operands further left sit deeper in the tree
fn build_operator_chain(pair: Pair<Rule>, depth: usize) -> Result<Expr, Error<Rule>> {
    let parent = pair.clone();
    let parts: Vec<Pair<Rule>> = pair.into_inner().collect();
    let mut level = depth + parts.len() / 2;
    check_depth(&parent, level)?;

    let mut parts = parts.into_iter();
    let mut expr = build_expression(expect_next(&mut parts, &parent, "operand")?, level)?;
    while let Some(op) = parts.next() {
        level = level.saturating_sub(1);
        let right = Box::new(build_expression(
            expect_next(&mut parts, &parent, "operand")?,
            level + 1,
        )?);
        let left = Box::new(expr);
        expr = match op.as_rule() {
            Rule::or_op => Expr::Logical {
                op: LogicalOp::Or,
                left,
                right,
            },
            Rule::and_op => Expr::Logical {
                op: LogicalOp::And,
                left,
                right,
            },
            _ => Expr::Binary {
                op: binary_op(&op)?,
                left,
                right,
            },
        };
    }
    Ok(expr)
}

fn binary_op(op: &Pair<Rule>) -> Result<BinaryOp, Error<Rule>> {
    Ok(match op.as_str() {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Subtract,
        "*" => BinaryOp::Multiply,
        "/" => BinaryOp::Divide,
        "%" => BinaryOp::Remainder,
        "<" => BinaryOp::Less,
        "<=" => BinaryOp::LessEqual,
        ">" => BinaryOp::Greater,
        ">=" => BinaryOp::GreaterEqual,
        "==" | "===" => BinaryOp::Equal,
        "!=" | "!==" => BinaryOp::NotEqual,
        _ => return Err(get_unexpected_error(op)),
    })
}

fn build_unary(pair: Pair<Rule>, depth: usize) -> Result<Expr, Error<Rule>> {
    let parent = pair.clone();
    let mut ops = vec![];
    let mut operand = None;
    for part in pair.into_inner() {
        if part.as_rule() == Rule::unary_op {
            ops.push(match part.as_str() {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Negate,
                _ => UnaryOp::TypeOf,
            });
        } else {
            operand = Some(part);
        }
    }
    check_depth(&parent, depth + ops.len())?;

    let operand = operand.ok_or_else(|| get_missing_error(&parent, "operand"))?;
    let mut expr = build_expression(operand, depth + ops.len())?;
    for op in ops.into_iter().rev() {
        expr = Expr::Unary {
            op,
            operand: Box::new(expr),
        };
    }
    Ok(expr)
}

fn build_postfix(pair: Pair<Rule>, depth: usize) -> Result<Expr, Error<Rule>> {
    let parent = pair.clone();
    let mut inner = pair.into_inner();
    let base = expect_next(&mut inner, &parent, "expression")?;
    let suffixes: Vec<Pair<Rule>> = inner.collect();
    let mut level = depth + suffixes.len();
    check_depth(&parent, level)?;

    let mut expr = build_expression(base, level)?;
    for suffix in suffixes {
        level = level.saturating_sub(1);
        let suffix_parent = suffix.clone();
        expr = match suffix.as_rule() {
            Rule::call_arguments => Expr::Call {
                callee: Box::new(expr),
                args: build_list(suffix, level + 1)?,
            },
            Rule::member => Expr::Member {
                object: Box::new(expr),
                property: expect_next(&mut suffix.into_inner(), &suffix_parent, "property")?
                    .as_str()
                    .to_string(),
            },
            Rule::index => Expr::Index {
                object: Box::new(expr),
                index: Box::new(build_expression(
                    expect_next(&mut suffix.into_inner(), &suffix_parent, "index")?,
                    level + 1,
                )?),
            },
            _ => return Err(get_unexpected_error(&suffix)),
        };
    }
    Ok(expr)
}

fn object_key_text(pair: Pair<Rule>) -> String {
    match pair.into_inner().next() {
        Some(key) if key.as_rule() == Rule::string_literal => string_value(key),
        Some(key) => key.as_str().to_string(),
        None => String::new(),
    }
}

fn string_value(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|raw| unescape(raw.as_str()))
        .unwrap_or_default()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Expression wrappers with a single child add nothing to the tree
fn collapse(mut pair: Pair<Rule>) -> Pair<Rule> {
    while syntax_kind(pair.as_rule()) == SyntaxKind::Expression {
        let mut inner = pair
            .clone()
            .into_inner()
            .filter(|p| p.as_rule() != Rule::EOI);
        match (inner.next(), inner.next()) {
            (Some(only), None) => pair = only,
            _ => break,
        }
    }
    pair
}

fn syntax_node(pair: Pair<Rule>) -> SyntaxNode {
    let pair = collapse(pair);
    let kind = syntax_kind(pair.as_rule());
    match kind {
        SyntaxKind::Identifier | SyntaxKind::Binding | SyntaxKind::PropertyName => {
            SyntaxNode::leaf(kind, pair.as_str())
        }
        SyntaxKind::Literal => SyntaxNode::leaf(kind, pair.as_str()),
        SyntaxKind::StringLiteral => SyntaxNode::leaf(kind, string_value(pair)),
        SyntaxKind::ObjectKey => SyntaxNode::leaf(kind, object_key_text(pair)),
        _ => SyntaxNode::with_children(
            kind,
            pair.into_inner()
                .filter(|p| p.as_rule() != Rule::EOI)
                .map(syntax_node)
                .collect(),
        ),
    }
}

fn syntax_kind(rule: Rule) -> SyntaxKind {
    match rule {
        Rule::program => SyntaxKind::Program,
        Rule::empty_statement
        | Rule::block
        | Rule::function_declaration
        | Rule::variable_declaration
        | Rule::if_statement
        | Rule::while_statement
        | Rule::return_statement
        | Rule::expression_statement => SyntaxKind::Statement,
        Rule::identifier => SyntaxKind::Identifier,
        Rule::binding => SyntaxKind::Binding,
        Rule::property_name => SyntaxKind::PropertyName,
        Rule::object_key => SyntaxKind::ObjectKey,
        Rule::string_literal => SyntaxKind::StringLiteral,
        Rule::number_literal | Rule::boolean_literal | Rule::null_literal => SyntaxKind::Literal,
        Rule::expression
        | Rule::assignment
        | Rule::logical_or
        | Rule::logical_and
        | Rule::equality
        | Rule::comparison
        | Rule::additive
        | Rule::multiplicative
        | Rule::unary
        | Rule::postfix
        | Rule::function_expression
        | Rule::array_literal
        | Rule::object_literal => SyntaxKind::Expression,
        _ => SyntaxKind::Other,
    }
}
