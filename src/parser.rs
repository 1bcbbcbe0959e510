//! Parser for the textual policy language.
//!
//! ```text
//! @id("alice-photos")
//! permit (
//!     principal == User::"alice",
//!     action in [Action::"view", Action::"edit"],
//!     resource in Album::"vacation"
//! ) when {
//!     resource.owner == principal && context.mfa
//! } unless {
//!     resource has locked && resource.locked
//! };
//! ```
//!
//! Policies without an `@id` annotation are named `policy0`, `policy1`, ...
//! by their position in the text.

use std::collections::HashSet;
use std::str::FromStr;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{anychar, char, digit1, multispace1, none_of, satisfy},
    combinator::{cut, eof, map, not, opt, recognize, success, value},
    error::{VerboseError, VerboseErrorKind, context},
    multi::{many0, many0_count, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated},
};
use thiserror::Error;

use crate::expr::{BinaryOp, Expr, Pattern, PatternElem, Var};
use crate::types::{
    ActionConstraint, ConditionKind, Effect, EntityConstraint, EntityUid, Policy,
};

/// A syntax error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

// ============ Lexical helpers ============

fn line_comment(i: &str) -> Res<'_, ()> {
    value((), pair(tag("//"), take_while(|c| c != '\n')))(i)
}

/// Whitespace and comments.
fn sp(i: &str) -> Res<'_, ()> {
    value((), many0_count(alt((value((), multispace1), line_comment))))(i)
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> Res<'a, O>
where
    F: FnMut(&'a str) -> Res<'a, O>,
{
    preceded(sp, inner)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ident(i: &str) -> Res<'_, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(i)
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    terminated(tag(kw), not(satisfy(is_ident_char)))
}

fn failure<'a, T>(input: &'a str, message: &'static str) -> Res<'a, T> {
    Err(nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(message))],
    }))
}

/// The undecoded body of a string literal.
fn raw_string(i: &str) -> Res<'_, &str> {
    delimited(
        char('"'),
        recognize(many0_count(alt((
            recognize(pair(char('\\'), anychar)),
            recognize(none_of("\\\"")),
        )))),
        cut(context("unterminated string literal", char('"'))),
    )(i)
}

/// Decode escapes. Unescaped `*` comes back as a wildcard so `like`
/// patterns can tell it apart from `\*`.
fn decode(raw: &str) -> Result<Vec<PatternElem>, &'static str> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push(PatternElem::Wildcard),
            '\\' => {
                let escaped = match chars.next() {
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('0') => '\0',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('\'') => '\'',
                    Some('*') => '*',
                    Some('u') => decode_unicode(&mut chars)?,
                    _ => return Err("invalid escape sequence"),
                };
                out.push(PatternElem::Char(escaped));
            }
            other => out.push(PatternElem::Char(other)),
        }
    }
    Ok(out)
}

fn decode_unicode(chars: &mut std::str::Chars<'_>) -> Result<char, &'static str> {
    const INVALID: &str = "invalid unicode escape";
    if chars.next() != Some('{') {
        return Err(INVALID);
    }
    let mut code = String::new();
    loop {
        match chars.next() {
            Some('}') => break,
            Some(c) if c.is_ascii_hexdigit() && code.len() < 6 => code.push(c),
            _ => return Err(INVALID),
        }
    }
    u32::from_str_radix(&code, 16)
        .ok()
        .and_then(std::primitive::char::from_u32)
        .ok_or(INVALID)
}

fn string_lit(i: &str) -> Res<'_, String> {
    let (rest, raw) = raw_string(i)?;
    match decode(raw) {
        Ok(elems) => Ok((
            rest,
            elems
                .into_iter()
                .map(|elem| match elem {
                    PatternElem::Char(c) => c,
                    PatternElem::Wildcard => '*',
                })
                .collect(),
        )),
        Err(message) => failure(i, message),
    }
}

fn like_pattern(i: &str) -> Res<'_, Pattern> {
    let (rest, raw) = raw_string(i)?;
    let elems = match decode(raw) {
        Ok(elems) => elems,
        Err(message) => return failure(i, message),
    };
    match Pattern::new(elems) {
        Ok(pattern) => Ok((rest, pattern)),
        Err(_) => failure(i, "invalid like pattern"),
    }
}

fn long_lit(i: &str) -> Res<'_, i64> {
    let (rest, digits) = digit1(i)?;
    match digits.parse::<i64>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => failure(i, "integer literal out of range"),
    }
}

/// `Ns::Type`, a `::`-separated identifier path.
fn path(i: &str) -> Res<'_, String> {
    map(separated_list1(tag("::"), ident), |segments| segments.join("::"))(i)
}

fn entity_uid(i: &str) -> Res<'_, EntityUid> {
    let (rest, (type_name, id)) = pair(path, preceded(tag("::"), string_lit))(i)?;
    match EntityUid::new(type_name, id) {
        Ok(uid) => Ok((rest, uid)),
        Err(_) => failure(i, "invalid entity type name"),
    }
}

// ============ Expressions ============

const MAX_NESTING: usize = 64;

fn call_args<'a>(i: &'a str, depth: usize) -> Res<'a, Vec<Expr>> {
    preceded(
        ws(char('(')),
        cut(terminated(
            separated_list0(ws(char(',')), nested(depth)),
            context("expected `)` closing the argument list", ws(char(')'))),
        )),
    )(i)
}

fn name_based(i: &str, depth: usize) -> Res<'_, Expr> {
    let (rest, name) = path(i)?;

    match preceded(tag("::"), string_lit)(rest) {
        Ok((rest, id)) => {
            return match EntityUid::new(name, id) {
                Ok(uid) => Ok((rest, Expr::lit(uid))),
                Err(_) => failure(i, "invalid entity type name"),
            };
        }
        Err(nom::Err::Error(_)) => {}
        Err(e) => return Err(e),
    }

    match call_args(rest, depth) {
        Ok((rest, args)) => return Ok((rest, Expr::call(name, args))),
        Err(nom::Err::Error(_)) => {}
        Err(e) => return Err(e),
    }

    match name.as_str() {
        "true" => Ok((rest, Expr::lit(true))),
        "false" => Ok((rest, Expr::lit(false))),
        other => match Var::from_str(other) {
            Ok(var) => Ok((rest, Expr::var(var))),
            Err(_) => failure(i, "unknown variable"),
        },
    }
}

fn set_literal(i: &str, depth: usize) -> Res<'_, Expr> {
    map(
        delimited(
            char('['),
            separated_list0(ws(char(',')), nested(depth)),
            cut(context("expected `]` closing the set", ws(char(']')))),
        ),
        Expr::Set,
    )(i)
}

fn record_entry(i: &str, depth: usize) -> Res<'_, (String, Expr)> {
    separated_pair(
        ws(alt((string_lit, map(ident, String::from)))),
        ws(char(':')),
        cut(nested(depth)),
    )(i)
}

fn record_literal<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    let (rest, fields) = delimited(
        char('{'),
        separated_list0(ws(char(',')), |i: &'a str| record_entry(i, depth)),
        cut(context("expected `}` closing the record", ws(char('}')))),
    )(i)?;
    let mut seen = HashSet::new();
    if fields.iter().any(|(key, _)| !seen.insert(key.as_str())) {
        return failure(i, "duplicate key in record literal");
    }
    Ok((rest, Expr::Record(fields)))
}

fn parenthesized(i: &str, depth: usize) -> Res<'_, Expr> {
    delimited(
        char('('),
        cut(nested(depth)),
        cut(context("expected `)`", ws(char(')')))),
    )(i)
}

fn primary<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    ws(alt((
        map(long_lit, Expr::lit),
        map(string_lit, Expr::lit),
        |i: &'a str| parenthesized(i, depth),
        |i: &'a str| set_literal(i, depth),
        |i: &'a str| record_literal(i, depth),
        |i: &'a str| name_based(i, depth),
    )))(i)
}

fn method_call(receiver: Expr, name: &str, mut args: Vec<Expr>) -> Expr {
    let op = match name {
        "contains" => Some(BinaryOp::Contains),
        "containsAll" => Some(BinaryOp::ContainsAll),
        "containsAny" => Some(BinaryOp::ContainsAny),
        _ => None,
    };
    match op {
        Some(op) if args.len() == 1 => Expr::binary(op, receiver, args.remove(0)),
        _ => {
            args.insert(0, receiver);
            Expr::call(name, args)
        }
    }
}

fn member(i: &str, depth: usize) -> Res<'_, Expr> {
    let (mut i, mut expr) = primary(i, depth)?;
    loop {
        match preceded(ws(char('.')), cut(ws(ident)))(i) {
            Ok((rest, name)) => {
                match call_args(rest, depth) {
                    Ok((rest, args)) => {
                        expr = method_call(expr, name, args);
                        i = rest;
                    }
                    Err(nom::Err::Error(_)) => {
                        expr = Expr::get_attr(expr, name);
                        i = rest;
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }
            Err(nom::Err::Error(_)) => {}
            Err(e) => return Err(e),
        }
        match delimited(ws(char('[')), cut(ws(string_lit)), cut(ws(char(']'))))(i) {
            Ok((rest, key)) => {
                expr = Expr::get_attr(expr, key);
                i = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((i, expr))
}

fn unary(i: &str, depth: usize) -> Res<'_, Expr> {
    let (i, mut ops) = many0(ws(alt((char('!'), char('-')))))(i)?;
    let (i, mut expr) = if ops.last() == Some(&'-') {
        match ws(digit1)(i) {
            Ok((rest, digits)) => {
                ops.pop();
                match format!("-{digits}").parse::<i64>() {
                    Ok(n) => (rest, Expr::lit(n)),
                    Err(_) => return failure(i, "integer literal out of range"),
                }
            }
            Err(_) => member(i, depth)?,
        }
    } else {
        member(i, depth)?
    };
    for op in ops.into_iter().rev() {
        expr = match op {
            '!' => Expr::not(expr),
            _ => Expr::neg(expr),
        };
    }
    Ok((i, expr))
}

fn mult<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    let (i, first) = unary(i, depth)?;
    let (i, rest) = many0(preceded(ws(char('*')), cut(|i: &'a str| unary(i, depth))))(i)?;
    Ok((
        i,
        rest.into_iter()
            .fold(first, |acc, rhs| Expr::binary(BinaryOp::Mul, acc, rhs)),
    ))
}

fn add<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    let (i, first) = mult(i, depth)?;
    let (i, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))),
        cut(|i: &'a str| mult(i, depth)),
    ))(i)?;
    Ok((
        i,
        rest.into_iter()
            .fold(first, |acc, (op, rhs)| Expr::binary(op, acc, rhs)),
    ))
}

fn relop(i: &str) -> Res<'_, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::NotEq, tag("!=")),
        value(BinaryOp::LessEq, tag("<=")),
        value(BinaryOp::GreaterEq, tag(">=")),
        value(BinaryOp::Less, tag("<")),
        value(BinaryOp::Greater, tag(">")),
        value(BinaryOp::In, keyword("in")),
    ))(i)
}

enum RelationTail {
    Has(String),
    Like(Pattern),
    Is(String, Option<Expr>),
    Op(BinaryOp, Expr),
}

fn relation<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    let (i, lhs) = add(i, depth)?;
    let (i, tail) = opt(alt((
        map(
            preceded(
                ws(keyword("has")),
                cut(ws(alt((map(ident, String::from), string_lit)))),
            ),
            RelationTail::Has,
        ),
        map(
            preceded(ws(keyword("like")), cut(ws(like_pattern))),
            RelationTail::Like,
        ),
        map(
            preceded(
                ws(keyword("is")),
                cut(pair(
                    ws(path),
                    opt(preceded(ws(keyword("in")), cut(|i: &'a str| add(i, depth)))),
                )),
            ),
            |(entity_type, within)| RelationTail::Is(entity_type, within),
        ),
        map(
            pair(ws(relop), cut(|i: &'a str| add(i, depth))),
            |(op, rhs)| RelationTail::Op(op, rhs),
        ),
    )))(i)?;
    let expr = match tail {
        None => lhs,
        Some(RelationTail::Has(attr)) => Expr::has_attr(lhs, attr),
        Some(RelationTail::Like(pattern)) => Expr::like(lhs, pattern),
        Some(RelationTail::Is(entity_type, within)) => Expr::is_type(lhs, entity_type, within),
        Some(RelationTail::Op(op, rhs)) => Expr::binary(op, lhs, rhs),
    };
    Ok((i, expr))
}

fn and<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    let (i, first) = relation(i, depth)?;
    let (i, rest) = many0(preceded(ws(tag("&&")), cut(|i: &'a str| relation(i, depth))))(i)?;
    Ok((i, rest.into_iter().fold(first, Expr::and)))
}

fn or<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    let (i, first) = and(i, depth)?;
    let (i, rest) = many0(preceded(ws(tag("||")), cut(|i: &'a str| and(i, depth))))(i)?;
    Ok((i, rest.into_iter().fold(first, Expr::or)))
}

fn if_expr(i: &str, depth: usize) -> Res<'_, Expr> {
    let (i, _) = ws(keyword("if"))(i)?;
    let (i, cond) = cut(nested(depth))(i)?;
    let (i, _) = cut(context("expected `then`", ws(keyword("then"))))(i)?;
    let (i, then) = cut(nested(depth))(i)?;
    let (i, _) = cut(context("expected `else`", ws(keyword("else"))))(i)?;
    let (i, otherwise) = cut(nested(depth))(i)?;
    Ok((i, Expr::ite(cond, then, otherwise)))
}

/// `depth` counts the expressions enclosing this one.
fn expr<'a>(i: &'a str, depth: usize) -> Res<'a, Expr> {
    if depth >= MAX_NESTING {
        return failure(i, "expression nested too deeply");
    }
    let depth = depth + 1;
    alt((
        |i: &'a str| if_expr(i, depth),
        |i: &'a str| or(i, depth),
    ))(i)
}

fn nested<'a>(depth: usize) -> impl FnMut(&'a str) -> Res<'a, Expr> {
    move |i| expr(i, depth)
}

// ============ Policies ============

fn annotation(i: &str) -> Res<'_, (String, String)> {
    preceded(
        ws(char('@')),
        cut(pair(
            ws(map(ident, String::from)),
            delimited(
                context("expected `(` after annotation name", ws(char('('))),
                ws(string_lit),
                context("expected `)` closing the annotation", ws(char(')'))),
            ),
        )),
    )(i)
}

fn effect(i: &str) -> Res<'_, Effect> {
    ws(alt((
        value(Effect::Permit, keyword("permit")),
        value(Effect::Forbid, keyword("forbid")),
    )))(i)
}

fn entity_constraint(i: &str) -> Res<'_, EntityConstraint> {
    alt((
        map(
            preceded(ws(tag("==")), cut(ws(entity_uid))),
            EntityConstraint::Eq,
        ),
        map(
            preceded(
                ws(keyword("is")),
                cut(pair(
                    ws(path),
                    opt(preceded(ws(keyword("in")), cut(ws(entity_uid)))),
                )),
            ),
            |(entity_type, within)| match within {
                Some(uid) => EntityConstraint::IsIn(entity_type, uid),
                None => EntityConstraint::Is(entity_type),
            },
        ),
        map(
            preceded(ws(keyword("in")), cut(ws(entity_uid))),
            EntityConstraint::In,
        ),
        success(EntityConstraint::Any),
    ))(i)
}

fn action_constraint(i: &str) -> Res<'_, ActionConstraint> {
    alt((
        map(
            preceded(ws(tag("==")), cut(ws(entity_uid))),
            ActionConstraint::Eq,
        ),
        map(
            preceded(
                ws(keyword("in")),
                cut(alt((
                    delimited(
                        ws(char('[')),
                        separated_list1(ws(char(',')), ws(entity_uid)),
                        context("expected `]` closing the action list", ws(char(']'))),
                    ),
                    map(ws(entity_uid), |uid| vec![uid]),
                ))),
            ),
            ActionConstraint::In,
        ),
        success(ActionConstraint::Any),
    ))(i)
}

type Scope = (EntityConstraint, ActionConstraint, EntityConstraint);

fn scope(i: &str) -> Res<'_, Scope> {
    let (i, _) = context("expected `(` opening the policy scope", ws(char('(')))(i)?;
    let (i, _) = context("expected `principal`", ws(keyword("principal")))(i)?;
    let (i, principal) = entity_constraint(i)?;
    let (i, _) = context("expected `,` after the principal", ws(char(',')))(i)?;
    let (i, _) = context("expected `action`", ws(keyword("action")))(i)?;
    let (i, action) = action_constraint(i)?;
    let (i, _) = context("expected `,` after the action", ws(char(',')))(i)?;
    let (i, _) = context("expected `resource`", ws(keyword("resource")))(i)?;
    let (i, resource) = entity_constraint(i)?;
    let (i, _) = context("expected `)` closing the policy scope", ws(char(')')))(i)?;
    Ok((i, (principal, action, resource)))
}

fn condition(i: &str) -> Res<'_, (ConditionKind, Expr)> {
    let (i, kind) = ws(alt((
        value(ConditionKind::When, keyword("when")),
        value(ConditionKind::Unless, keyword("unless")),
    )))(i)?;
    let (i, body) = cut(delimited(
        context("expected `{` opening the condition", ws(char('{'))),
        nested(0),
        context("expected `}` closing the condition", ws(char('}'))),
    ))(i)?;
    Ok((i, (kind, body)))
}

struct ParsedPolicy {
    annotations: Vec<(String, String)>,
    effect: Effect,
    scope: Scope,
    conditions: Vec<(ConditionKind, Expr)>,
}

fn policy(i: &str) -> Res<'_, ParsedPolicy> {
    let start = i;
    let (i, annotations) = many0(annotation)(i)?;
    let (i, effect) = if annotations.is_empty() {
        effect(i)?
    } else {
        cut(context("expected `permit` or `forbid`", effect))(i)?
    };
    let (i, scope) = cut(scope)(i)?;
    let (i, conditions) = many0(condition)(i)?;
    let (i, _) = cut(context("expected `;` after the policy", ws(char(';'))))(i)?;

    let mut seen = HashSet::new();
    if annotations.iter().any(|(key, _)| !seen.insert(key.as_str())) {
        return failure(start, "duplicate annotation");
    }

    Ok((
        i,
        ParsedPolicy {
            annotations,
            effect,
            scope,
            conditions,
        },
    ))
}

impl ParsedPolicy {
    fn into_policy(self, position: usize) -> Policy {
        let id = self
            .annotations
            .iter()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| format!("policy{position}"));
        let (principal, action, resource) = self.scope;
        let mut policy = Policy::new(id, self.effect)
            .with_principal(principal)
            .with_action(action)
            .with_resource(resource);
        for (kind, body) in self.conditions {
            policy = match kind {
                ConditionKind::When => policy.when(body),
                ConditionKind::Unless => policy.unless(body),
            };
        }
        for (key, value) in self.annotations {
            policy = policy.with_annotation(key, value);
        }
        policy
    }
}

fn to_parse_error(source: &str, err: nom::Err<VerboseError<&str>>) -> ParseError {
    let errors = match err {
        nom::Err::Incomplete(_) => {
            return ParseError {
                message: "unexpected end of input".to_string(),
                offset: source.len(),
            };
        }
        nom::Err::Error(e) | nom::Err::Failure(e) => e.errors,
    };
    let labelled = errors.iter().find_map(|(input, kind)| match kind {
        VerboseErrorKind::Context(message) => Some((*input, (*message).to_string())),
        _ => None,
    });
    let (input, message) = labelled.unwrap_or_else(|| {
        let input = errors
            .iter()
            .map(|(input, _)| *input)
            .min_by_key(|input| input.len())
            .unwrap_or(source);
        (input, "unexpected input".to_string())
    });
    let near: String = input.trim_start().chars().take(20).collect();
    let message = if near.is_empty() {
        format!("{message} near end of input")
    } else {
        format!("{message} near `{near}`")
    };
    ParseError {
        message,
        offset: source.len().saturating_sub(input.len()),
    }
}

/// Parse zero or more policies.
pub fn parse_policies(text: &str) -> Result<Vec<Policy>, ParseError> {
    let parsed = terminated(
        many0(policy),
        pair(sp, context("expected `permit` or `forbid`", eof)),
    )(text);
    match parsed {
        Ok((_, policies)) => Ok(policies
            .into_iter()
            .enumerate()
            .map(|(position, parsed)| parsed.into_policy(position))
            .collect()),
        Err(e) => Err(to_parse_error(text, e)),
    }
}

/// Parse a standalone condition expression.
pub fn parse_expr(text: &str) -> Result<Expr, ParseError> {
    terminated(nested(0), pair(sp, context("unexpected trailing input", eof)))(text)
        .map(|(_, expr)| expr)
        .map_err(|e| to_parse_error(text, e))
}

/// Parse an entity uid such as `App::User::"alice"`.
pub fn parse_entity_uid(text: &str) -> Result<EntityUid, ParseError> {
    terminated(ws(entity_uid), pair(sp, context("unexpected trailing input", eof)))(text)
        .map(|(_, uid)| uid)
        .map_err(|e| to_parse_error(text, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use yare::parameterized;

    fn uid(s: &str) -> EntityUid {
        s.parse().unwrap()
    }

    fn principal_attr(attr: &str) -> Expr {
        Expr::get_attr(Expr::var(Var::Principal), attr)
    }

    #[test]
    fn test_parse_scope_forms() {
        let policies = parse_policies(
            r#"
            permit (
                principal == User::"alice",
                action in [Action::"view", Action::"edit"],
                resource == Photo::"VacationPhoto94.jpg"
            );
            forbid (
                principal is User in Group::"interns",
                action == Action::"delete",
                resource in Album::"vacation"
            );
            permit (principal is Admin, action in Action::"readOnly", resource);
            "#,
        )
        .unwrap();

        assert_eq!(policies.len(), 3);
        assert_eq!(policies[0].id().as_str(), "policy0");
        assert_eq!(
            policies[0].principal_constraint(),
            &EntityConstraint::Eq(uid(r#"User::"alice""#))
        );
        assert_eq!(
            policies[0].action_constraint(),
            &ActionConstraint::In(vec![uid(r#"Action::"view""#), uid(r#"Action::"edit""#)])
        );
        assert_eq!(policies[1].effect(), Effect::Forbid);
        assert_eq!(
            policies[1].principal_constraint(),
            &EntityConstraint::IsIn("User".into(), uid(r#"Group::"interns""#))
        );
        assert_eq!(
            policies[1].resource_constraint(),
            &EntityConstraint::In(uid(r#"Album::"vacation""#))
        );
        assert_eq!(
            policies[2].principal_constraint(),
            &EntityConstraint::Is("Admin".into())
        );
        assert_eq!(
            policies[2].action_constraint(),
            &ActionConstraint::In(vec![uid(r#"Action::"readOnly""#)])
        );
        assert_eq!(policies[2].resource_constraint(), &EntityConstraint::Any);
    }

    #[test]
    fn test_parse_conditions_and_annotations() {
        let policies = parse_policies(
            r#"
            // adults only
            @id("adults")
            @reason("age gate")
            permit (principal, action, resource)
            when { principal has age && principal.age >= 18 }
            unless { context.blocked };
            "#,
        )
        .unwrap();

        let policy = &policies[0];
        assert_eq!(policy.id().as_str(), "adults");
        assert_eq!(policy.annotation("reason"), Some("age gate"));
        assert_eq!(policy.conditions().len(), 2);
        assert_eq!(policy.conditions()[1].kind, ConditionKind::Unless);
        assert_eq!(
            policy.conditions()[0].body,
            Expr::and(
                Expr::has_attr(Expr::var(Var::Principal), "age"),
                Expr::binary(BinaryOp::GreaterEq, principal_attr("age"), Expr::lit(18_i64)),
            )
        );
    }

    #[test]
    fn test_precedence() {
        let parsed = parse_expr("1 + 2 * 3 == 7 || false && true").unwrap();
        let expected = Expr::or(
            Expr::binary(
                BinaryOp::Eq,
                Expr::binary(
                    BinaryOp::Add,
                    Expr::lit(1_i64),
                    Expr::binary(BinaryOp::Mul, Expr::lit(2_i64), Expr::lit(3_i64)),
                ),
                Expr::lit(7_i64),
            ),
            Expr::and(Expr::lit(false), Expr::lit(true)),
        );
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let parsed = parse_expr("10 - 3 - 2").unwrap();
        let expected = Expr::binary(
            BinaryOp::Sub,
            Expr::binary(BinaryOp::Sub, Expr::lit(10_i64), Expr::lit(3_i64)),
            Expr::lit(2_i64),
        );
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_member_access_and_methods() {
        let parsed = parse_expr(r#"resource["tags"].contains("x") && resource.ip.isInRange(ip("10.0.0.0/8"))"#).unwrap();
        let expected = Expr::and(
            Expr::binary(
                BinaryOp::Contains,
                Expr::get_attr(Expr::var(Var::Resource), "tags"),
                Expr::lit("x"),
            ),
            Expr::call(
                "isInRange",
                vec![
                    Expr::get_attr(Expr::var(Var::Resource), "ip"),
                    Expr::call("ip", vec![Expr::lit("10.0.0.0/8")]),
                ],
            ),
        );
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expr(r#"[1, "two", User::"three"]"#).unwrap(),
            Expr::Set(vec![
                Expr::lit(1_i64),
                Expr::lit("two"),
                Expr::lit(uid(r#"User::"three""#)),
            ])
        );
        assert_eq!(
            parse_expr(r#"{ a: 1, "b c": true }"#).unwrap(),
            Expr::Record(vec![
                ("a".to_string(), Expr::lit(1_i64)),
                ("b c".to_string(), Expr::lit(true)),
            ])
        );
        assert_eq!(
            parse_expr(r#""tab\there \u{1F600}""#).unwrap(),
            Expr::lit("tab\there \u{1F600}")
        );
    }

    #[test]
    fn test_negative_literals() {
        assert_eq!(
            parse_expr("-9223372036854775808").unwrap(),
            Expr::Lit(Value::Long(i64::MIN))
        );
        assert!(parse_expr("!-x").is_err(), "`x` is not a variable");
        assert_eq!(
            parse_expr("- principal.age").unwrap(),
            Expr::neg(principal_attr("age"))
        );
    }

    #[test]
    fn test_like_pattern_escapes() {
        let Expr::Like(_, pattern) = parse_expr(r#"resource.name like "a\**""#).unwrap() else {
            panic!("expected a like expression");
        };
        assert_eq!(
            pattern.elems(),
            &[
                PatternElem::Char('a'),
                PatternElem::Char('*'),
                PatternElem::Wildcard
            ]
        );
    }

    #[test]
    fn test_is_with_in() {
        assert_eq!(
            parse_expr(r#"principal is User in Group::"admins""#).unwrap(),
            Expr::is_type(
                Expr::var(Var::Principal),
                "User",
                Some(Expr::lit(uid(r#"Group::"admins""#)))
            )
        );
    }

    #[test]
    fn test_if_then_else() {
        assert_eq!(
            parse_expr("if context.admin then true else principal.level > 3").unwrap(),
            Expr::ite(
                Expr::get_attr(Expr::var(Var::Context), "admin"),
                Expr::lit(true),
                Expr::binary(BinaryOp::Greater, principal_attr("level"), Expr::lit(3_i64)),
            )
        );
    }

    #[parameterized(
        missing_semicolon = { "permit(principal, action, resource)", "expected `;` after the policy" },
        bad_effect = { "allow(principal, action, resource);", "expected `permit` or `forbid`" },
        missing_scope_var = { "permit(principal, resource);", "expected `action`" },
        unknown_variable = { "permit(principal, action, resource) when { subject };", "unknown variable" },
        overflow = { "permit(principal, action, resource) when { 9223372036854775808 };", "integer literal out of range" },
        unterminated = { r#"permit(principal == User::"alice, action, resource);"#, "unterminated string literal" },
        duplicate_key = { "permit(principal, action, resource) when { {a: 1, a: 2} };", "duplicate key in record literal" },
        unclosed_condition = { "permit(principal, action, resource) when { true ;", "expected `}` closing the condition" },
        duplicate_annotation = { r#"@a("x") @a("y") permit(principal, action, resource);"#, "duplicate annotation" },
        deep_parens = { "permit(principal, action, resource) when { ((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((true)))))))))))))))))))))))))))))))))))))))))))))))))))))))))))))))))))))) };", "expression nested too deeply" },
    )]
    fn test_parse_errors(text: &str, expected: &str) {
        let err = parse_policies(text).unwrap_err();
        assert!(
            err.message.contains(expected),
            "expected `{expected}` in `{}`",
            err.message
        );
    }

    #[parameterized(
        parens = { "(", ")" },
        sets = { "[", "]" },
        records = { "{a: ", "}" },
        calls = { "ip(", ")" },
        else_chain = { "if true then true else ", "" },
    )]
    fn test_deep_nesting_is_a_parse_error(open: &str, close: &str) {
        let nest = |depth: usize| {
            format!(
                "permit(principal, action, resource) when {{ {}true{} }};",
                open.repeat(depth),
                close.repeat(depth)
            )
        };

        assert!(parse_policies(&nest(32)).is_ok());

        let err = parse_policies(&nest(200)).unwrap_err();
        assert!(
            err.message.contains("expression nested too deeply"),
            "{}",
            err.message
        );
        assert!(parse_expr(&"(".repeat(200)).is_err());
    }

    #[test]
    fn test_parse_error_offset() {
        let text = "permit(principal, action, resource);\nforbid(principal, action, resource)";
        let err = parse_policies(text).unwrap_err();
        assert_eq!(err.offset, text.len());
    }

    #[test]
    fn test_empty_text_has_no_policies() {
        assert!(parse_policies("").unwrap().is_empty());
        assert!(parse_policies("  // nothing here\n").unwrap().is_empty());
    }
}
