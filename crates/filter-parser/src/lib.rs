//! BNF grammar of the OData filter subset:
//!
//! ```text
//! filter         = WS* expression WS* EOF
//! expression     = or
//! or             = and ("or" WS+ and)*
//! and            = not ("and" WS+ not)*
//! not            = ("not" WS+ not) | primary
//! primary        = "(" WS* expression WS* ")" | searchIn | comparison
//! searchIn       = "search.in(" WS* field WS* "," WS* string (WS* "," WS* string)? WS* ")"
//! comparison     = field WS+ ("eq"|"ne"|"gt"|"lt"|"ge"|"le") WS+ literal
//! field          = identifier ("/" identifier)*
//! literal        = string | number | boolean | datetime | "null"
//! string         = "'" (char | "''")* "'"
//! ```
//!
//! Keywords are lowercase, as OData requires. Literal typing against the
//! schema happens at evaluation time; the parser only classifies shapes.

mod condition;
mod error;
mod value;

pub use condition::{parse_comparison, Condition};
pub use error::{Error, ErrorKind};
use error::cut_with_err;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::{cut, map};
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::Finish;
use nom_locate::LocatedSpan;
pub use value::{parse_field, parse_literal, parse_string, Literal};
use value::{trailing_span, word_exact};

pub type Span<'a> = LocatedSpan<&'a str, &'a str>;

type IResult<'a, Ret> = nom::IResult<Span<'a>, Ret, Error<'a>>;

const MAX_FILTER_DEPTH: usize = 100;

#[derive(Debug, Clone, Eq)]
pub struct Token<'a> {
    /// The token in the original input; use `value()` when the content
    /// may have been rewritten (unescaping, `search.in` splitting).
    span: Span<'a>,
    value: Option<String>,
}

impl PartialEq for Token<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl<'a> Token<'a> {
    pub fn new(span: Span<'a>, value: Option<String>) -> Self {
        Self { span, value }
    }

    pub fn value(&self) -> &str {
        self.value.as_ref().map_or(&self.span, |value| value)
    }

    pub fn original_span(&self) -> Span<'a> {
        self.span
    }

    pub fn as_external_error(&self, error: impl std::error::Error) -> Error<'a> {
        Error::new_from_external(self.span, error)
    }

    pub fn parse_finite_float(&self) -> Result<f64, Error<'a>> {
        let value: f64 = self.value().parse().map_err(|e| self.as_external_error(e))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Error::new_from_kind(self.span, ErrorKind::ExpectedValue))
        }
    }
}

impl<'a> From<Span<'a>> for Token<'a> {
    fn from(span: Span<'a>) -> Self {
        Self { span, value: None }
    }
}

impl<'a> From<&'a str> for Token<'a> {
    fn from(s: &'a str) -> Self {
        Token::from(Span::new_extra(s, s))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition<'a> {
    Not(Box<Self>),
    Comparison { field: Token<'a>, op: Condition<'a> },
    In { field: Token<'a>, values: Vec<Token<'a>> },
    Or(Vec<Self>),
    And(Vec<Self>),
}

impl<'a> FilterCondition<'a> {
    /// Every field referenced by the filter, for schema validation.
    pub fn fields(&self) -> Box<dyn Iterator<Item = &Token<'a>> + '_> {
        match self {
            FilterCondition::Comparison { field, .. } | FilterCondition::In { field, .. } => {
                Box::new(std::iter::once(field))
            }
            FilterCondition::Not(inner) => inner.fields(),
            FilterCondition::And(seq) | FilterCondition::Or(seq) => {
                Box::new(seq.iter().flat_map(|f| f.fields()))
            }
        }
    }

    pub fn parse(input: &'a str) -> Result<Option<Self>, Error<'a>> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        let span = Span::new_extra(input, input);
        parse_filter(span).finish().map(|(_rem, output)| Some(output))
    }
}

/// remove OPTIONAL whitespaces before AND after the provided parser.
fn ws<'a, O>(
    inner: impl FnMut(Span<'a>) -> IResult<'a, O>,
) -> impl FnMut(Span<'a>) -> IResult<'a, O> {
    delimited(multispace0, inner, multispace0)
}

/// or = and ("or" WS+ and)*
fn parse_or(input: Span, depth: usize) -> IResult<FilterCondition> {
    if depth > MAX_FILTER_DEPTH {
        return Err(Error::failure_from_kind(input, ErrorKind::DepthLimitReached));
    }
    let (input, first) = parse_and(input, depth + 1)?;
    // if we found an `or` we MUST find an operand after it
    let (input, mut rest) = many0(preceded(
        delimited(multispace1, word_exact("or"), multispace1),
        cut(|input| parse_and(input, depth + 1)),
    ))(input)?;

    let filter = if rest.is_empty() {
        first
    } else {
        rest.insert(0, first);
        FilterCondition::Or(rest)
    };
    Ok((input, filter))
}

/// and = not ("and" WS+ not)*
fn parse_and(input: Span, depth: usize) -> IResult<FilterCondition> {
    if depth > MAX_FILTER_DEPTH {
        return Err(Error::failure_from_kind(input, ErrorKind::DepthLimitReached));
    }
    let (input, first) = parse_not(input, depth + 1)?;
    let (input, mut rest) = many0(preceded(
        delimited(multispace1, word_exact("and"), multispace1),
        cut(|input| parse_not(input, depth + 1)),
    ))(input)?;

    let filter = if rest.is_empty() {
        first
    } else {
        rest.insert(0, first);
        FilterCondition::And(rest)
    };
    Ok((input, filter))
}

/// not = ("not" WS+ not) | primary
///
/// Consecutive `not`s collapse pairwise.
fn parse_not(input: Span, depth: usize) -> IResult<FilterCondition> {
    if depth > MAX_FILTER_DEPTH {
        return Err(Error::failure_from_kind(input, ErrorKind::DepthLimitReached));
    }
    alt((
        map(
            preceded(
                delimited(multispace0, word_exact("not"), multispace1),
                cut(|input| parse_not(input, depth + 1)),
            ),
            |e| match e {
                FilterCondition::Not(e) => *e,
                _ => FilterCondition::Not(Box::new(e)),
            },
        ),
        |input| parse_primary(input, depth + 1),
    ))(input)
}

/// searchIn = "search.in(" field "," string ("," string)? ")"
fn parse_search_in(input: Span) -> IResult<FilterCondition> {
    let (input, _) = preceded(multispace0, tag("search.in"))(input)?;
    // from here on, everything is a failure
    let (input, _) = cut_with_err(ws(map(char('('), |_| ())), |_| {
        Error::new_from_kind(input, ErrorKind::SearchInMalformed)
    })(input)?;
    let (input, field) = cut_with_err(parse_field, |_| {
        Error::new_from_kind(input, ErrorKind::SearchInMalformed)
    })(input)?;
    let (input, _) = cut_with_err(ws(map(char(','), |_| ())), |_| {
        Error::new_from_kind(input, ErrorKind::SearchInMalformed)
    })(input)?;
    let (input, values) = value::parse_string_cut(input, ErrorKind::SearchInMalformed)?;

    let (input, delimiters) = match ws(map(char(','), |_| ()))(input) {
        Ok((input, ())) => {
            let (input, delims) = value::parse_string_cut(input, ErrorKind::SearchInMalformed)?;
            (input, delims.value().to_string())
        }
        Err(_) => (input, ", ".to_string()),
    };

    let (input, _) = cut_with_err(ws(map(char(')'), |_| ())), |_| {
        Error::new_from_kind(input, ErrorKind::SearchInMalformed)
    })(input)?;

    let split: Vec<Token> = values
        .value()
        .split(|c| delimiters.contains(c))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| Token::new(values.original_span(), Some(part.to_string())))
        .collect();

    Ok((input, FilterCondition::In { field, values: split }))
}

/// primary = "(" expression ")" | searchIn | comparison
fn parse_primary(input: Span, depth: usize) -> IResult<FilterCondition> {
    if depth > MAX_FILTER_DEPTH {
        return Err(Error::failure_from_kind(input, ErrorKind::DepthLimitReached));
    }
    alt((
        |input| {
            let (rest, _) = ws(map(char('('), |_| ()))(input)?;
            let (rest, expr) = parse_or(rest, depth + 1)?;
            let (rest, _) = cut_with_err(ws(map(char(')'), |_| ())), |_| {
                Error::new_from_kind(input, ErrorKind::MissingClosingParenthesis)
            })(rest)?;
            Ok((rest, expr))
        },
        parse_search_in,
        preceded(multispace0, parse_comparison),
    ))(input)
}

fn parse_filter(input: Span) -> IResult<FilterCondition> {
    let (rest, filter) = delimited(multispace0, |i| parse_or(i, 0), multispace0)(input)?;
    if rest.fragment().is_empty() {
        Ok((trailing_span(rest), filter))
    } else {
        Err(Error::failure_from_kind(rest, ErrorKind::UnexpectedInput(rest)))
    }
}
