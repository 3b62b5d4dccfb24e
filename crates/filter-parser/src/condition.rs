//! condition = field WS+ ("eq" | "ne" | "gt" | "lt" | "ge" | "le") WS+ literal

use nom::branch::alt;
use nom::character::complete::multispace1;
use Condition::*;

use crate::error::cut_with_err;
use crate::value::{parse_field, parse_literal, word_exact, Literal};
use crate::{Error, ErrorKind, FilterCondition, IResult, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition<'a> {
    Equal(Literal<'a>),
    NotEqual(Literal<'a>),
    GreaterThan(Literal<'a>),
    GreaterThanOrEqual(Literal<'a>),
    LowerThan(Literal<'a>),
    LowerThanOrEqual(Literal<'a>),
}

impl<'a> Condition<'a> {
    pub fn literal(&self) -> &Literal<'a> {
        match self {
            Equal(l) | NotEqual(l) | GreaterThan(l) | GreaterThanOrEqual(l) | LowerThan(l)
            | LowerThanOrEqual(l) => l,
        }
    }
}

pub fn parse_comparison(input: Span) -> IResult<FilterCondition> {
    let (input, field) = parse_field(input)?;
    let (input, _) = multispace1(input)?;

    let mut operator = alt((
        word_exact("eq"),
        word_exact("ne"),
        word_exact("gt"),
        word_exact("lt"),
        word_exact("ge"),
        word_exact("le"),
    ));
    let (rest, op) = operator(input).map_err(|e: nom::Err<Error>| {
        // a word sat where the operator belongs: report it
        match nom::bytes::complete::take_while1::<_, _, Error>(|c: char| {
            c.is_alphanumeric() || c == '_'
        })(input)
        {
            Ok((_, word)) => Error::failure_from_kind(input, ErrorKind::ExpectedOperator(word)),
            Err(_) => e,
        }
    })?;

    let (rest, _) = multispace1(rest)?;
    let (rest, literal) = cut_with_err(parse_literal, |e| e)(rest)?;

    let op = match op.value() {
        "eq" => Equal(literal),
        "ne" => NotEqual(literal),
        "gt" => GreaterThan(literal),
        "lt" => LowerThan(literal),
        "ge" => GreaterThanOrEqual(literal),
        "le" => LowerThanOrEqual(literal),
        _ => unreachable!(),
    };

    Ok((rest, FilterCondition::Comparison { field, op }))
}
