use nom::bytes::complete::take_while1;
use nom::character::complete::char;
use nom::{InputIter, InputLength, InputTake, Slice};

use crate::{Error, ErrorKind, IResult, Span, Token};

/// Reserved words of the filter grammar; a bare word in field position must
/// not be one of these.
const KEYWORDS: &[&str] = &["and", "or", "not", "eq", "ne", "gt", "lt", "ge", "le"];

fn is_keyword(s: &str) -> bool {
    KEYWORDS.contains(&s)
}

fn is_field_component(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters allowed in an unquoted literal: numbers, booleans, `null` and
/// RFC 3339 datetimes (`2024-02-01T10:00:00Z`, offsets included).
fn is_literal_component(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '+')
}

/// field = identifier ("/" identifier)*
///
/// The `/` form addresses sub-fields of complex fields.
pub fn parse_field(input: Span) -> IResult<Token> {
    let (rest, path) = take_while1(|c| is_field_component(c) || c == '/')(input)?;
    let token: Token = path.into();
    let well_formed = token
        .value()
        .split('/')
        .all(|part| !part.is_empty() && part.chars().next().is_some_and(|c| c.is_alphabetic()));
    if !well_formed || is_keyword(token.value()) {
        return Err(nom::Err::Error(Error::new_from_kind(input, ErrorKind::ExpectedField)));
    }
    Ok((rest, token))
}

/// word = {tag}, used for the textual operators and connectives
pub fn word_exact<'a, 'b: 'a>(tag: &'b str) -> impl Fn(Span<'a>) -> IResult<'a, Token<'a>> {
    move |input| {
        let (input, word): (_, Token<'a>) =
            take_while1(is_field_component)(input).map(|(s, t)| (s, t.into()))?;
        if word.value() == tag {
            Ok((input, word))
        } else {
            Err(nom::Err::Error(Error::new_from_kind(
                input,
                ErrorKind::InternalError(nom::error::ErrorKind::Tag),
            )))
        }
    }
}

/// Parse a single-quoted string; a doubled quote (`''`) is the escape for a
/// literal quote, per OData.
pub fn parse_string(input: Span) -> IResult<Token> {
    let (input, _) = char('\'')(input)?;

    let mut escaped = false;
    let mut iter = input.iter_indices().peekable();
    while let Some((idx, c)) = iter.next() {
        if c == '\'' {
            match iter.peek() {
                Some((_, '\'')) => {
                    escaped = true;
                    iter.next();
                }
                _ => {
                    let (rest, content) = input.take_split(idx);
                    let (rest, _) = char('\'')(rest)?;
                    let value = escaped.then(|| content.fragment().replace("''", "'"));
                    return Ok((rest, Token::new(content, value)));
                }
            }
        }
    }

    Err(Error::failure_from_kind(input, ErrorKind::MissingClosingQuote))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal<'a> {
    String(Token<'a>),
    Number(Token<'a>),
    Boolean(bool, Token<'a>),
    DateTime(Token<'a>),
    Null(Token<'a>),
}

impl<'a> Literal<'a> {
    pub fn token(&self) -> &Token<'a> {
        match self {
            Literal::String(t)
            | Literal::Number(t)
            | Literal::DateTime(t)
            | Literal::Null(t)
            | Literal::Boolean(_, t) => t,
        }
    }
}

/// literal = string | number | boolean | datetime | null
pub fn parse_literal(input: Span) -> IResult<Literal> {
    match parse_string(input) {
        Ok((rest, token)) => return Ok((rest, Literal::String(token))),
        Err(e @ nom::Err::Failure(_)) => return Err(e),
        Err(_) => (),
    }

    let (rest, word) = take_while1(is_literal_component)(input)
        .map(|(s, t)| -> (Span, Token) { (s, t.into()) })
        .map_err(|_: nom::Err<Error>| {
            nom::Err::Error(Error::new_from_kind(input, ErrorKind::ExpectedValue))
        })?;

    let literal = match word.value() {
        "null" => Literal::Null(word),
        "true" => Literal::Boolean(true, word),
        "false" => Literal::Boolean(false, word),
        text => {
            if text.parse::<f64>().is_ok() {
                Literal::Number(word)
            } else if looks_like_datetime(text) {
                Literal::DateTime(word)
            } else {
                return Err(nom::Err::Error(Error::new_from_kind(
                    input,
                    ErrorKind::ExpectedValue,
                )));
            }
        }
    };
    Ok((rest, literal))
}

/// `2024-02-01T10:00:00Z`-shaped, offsets included. Full validation happens
/// at evaluation time where the schema is known.
fn looks_like_datetime(text: &str) -> bool {
    let mut chars = text.chars();
    chars.by_ref().take(4).filter(|c| c.is_ascii_digit()).count() == 4
        && chars.next() == Some('-')
        && text.contains('T')
}

/// Parse the alternatives of nom combinators over literal classification,
/// used by `search.in` bodies where only strings are allowed.
pub fn parse_string_cut<'a>(input: Span<'a>, kind: ErrorKind<'a>) -> IResult<'a, Token<'a>> {
    match parse_string(input) {
        Ok(ok) => Ok(ok),
        Err(nom::Err::Failure(e)) => Err(nom::Err::Failure(e)),
        Err(_) => Err(Error::failure_from_kind(input, kind)),
    }
}

pub fn trailing_span(input: Span) -> Span {
    input.slice(input.input_len()..)
}
