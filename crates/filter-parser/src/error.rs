use std::fmt::Display;

use nom::error::{self as nom_error, ErrorKind as NomErrorKind};
use nom::Parser;

use crate::{IResult, Span};

pub trait NomErrorExt<E> {
    fn is_failure(&self) -> bool;
    fn map_err<O: FnOnce(E) -> E>(self, op: O) -> nom::Err<E>;
    fn map_fail<O: FnOnce(E) -> E>(self, op: O) -> nom::Err<E>;
}

impl<E> NomErrorExt<E> for nom::Err<E> {
    fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    fn map_err<O: FnOnce(E) -> E>(self, op: O) -> nom::Err<E> {
        match self {
            e @ Self::Failure(_) => e,
            e => e.map(op),
        }
    }

    fn map_fail<O: FnOnce(E) -> E>(self, op: O) -> nom::Err<E> {
        match self {
            e @ Self::Error(_) => e,
            e => e.map(op),
        }
    }
}

/// Parse with `parser`; when it returns a recoverable error, upgrade it to a
/// failure built by `err`.
pub fn cut_with_err<'a, O>(
    mut parser: impl FnMut(Span<'a>) -> IResult<'a, O>,
    mut err: impl FnMut(Error<'a>) -> Error<'a>,
) -> impl FnMut(Span<'a>) -> IResult<'a, O> {
    move |input| match parser.parse(input) {
        Err(nom::Err::Error(e)) => Err(nom::Err::Failure(err(e))),
        rest => rest,
    }
}

#[derive(Debug)]
pub struct Error<'a> {
    context: Span<'a>,
    kind: ErrorKind<'a>,
}

#[derive(Debug)]
pub enum ErrorKind<'a> {
    ExpectedField,
    ExpectedOperator(Span<'a>),
    ExpectedValue,
    MissingClosingQuote,
    MissingClosingParenthesis,
    SearchInMalformed,
    UnexpectedInput(Span<'a>),
    DepthLimitReached,
    External(String),
    InternalError(NomErrorKind),
    Char(char),
}

impl<'a> Error<'a> {
    pub fn kind(&self) -> &ErrorKind<'a> {
        &self.kind
    }

    pub fn context(&self) -> &Span<'a> {
        &self.context
    }

    pub fn new_from_kind(context: Span<'a>, kind: ErrorKind<'a>) -> Self {
        Self { context, kind }
    }

    pub fn new_from_external(context: Span<'a>, error: impl std::error::Error) -> Self {
        Self::new_from_kind(context, ErrorKind::External(error.to_string()))
    }

    pub fn failure_from_kind(context: Span<'a>, kind: ErrorKind<'a>) -> nom::Err<Self> {
        nom::Err::Failure(Self::new_from_kind(context, kind))
    }
}

impl<'a> nom_error::ParseError<Span<'a>> for Error<'a> {
    fn from_error_kind(input: Span<'a>, kind: NomErrorKind) -> Self {
        let kind = match kind {
            NomErrorKind::Eof => ErrorKind::ExpectedValue,
            kind => ErrorKind::InternalError(kind),
        };
        Self { context: input, kind }
    }

    fn append(_input: Span<'a>, _kind: NomErrorKind, other: Self) -> Self {
        other
    }

    fn from_char(input: Span<'a>, c: char) -> Self {
        Self { context: input, kind: ErrorKind::Char(c) }
    }
}

impl Display for Error<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let input = self.context.fragment();
        // When the error is at the end of the input we render the position
        // after the last character.
        let escaped_input = input.escape_debug();

        match &self.kind {
            ErrorKind::ExpectedField => {
                writeln!(f, "Expected a field path at `{escaped_input}`.")?
            }
            ErrorKind::ExpectedOperator(operator) => writeln!(
                f,
                "`{}` is not a valid comparison operator. Expected one of `eq`, `ne`, `gt`, `lt`, `ge`, `le`.",
                operator.fragment().escape_debug()
            )?,
            ErrorKind::ExpectedValue => writeln!(
                f,
                "Expected a literal (a quoted string, number, boolean, datetime or `null`) at `{escaped_input}`."
            )?,
            ErrorKind::MissingClosingQuote => {
                writeln!(f, "Missing closing `'` in string literal.")?
            }
            ErrorKind::MissingClosingParenthesis => {
                writeln!(f, "Expression `{escaped_input}` is missing a closing `)`.")?
            }
            ErrorKind::SearchInMalformed => writeln!(
                f,
                "Malformed `search.in`. Expected `search.in(field, 'a, b, c')` or `search.in(field, 'a|b|c', '|')`."
            )?,
            ErrorKind::UnexpectedInput(rest) => writeln!(
                f,
                "Found unexpected input `{}` after the end of the filter expression.",
                rest.fragment().escape_debug()
            )?,
            ErrorKind::DepthLimitReached => writeln!(
                f,
                "The filter exceeded the maximum depth limit. Try rewriting the filter so that it contains fewer nested conditions."
            )?,
            ErrorKind::External(message) => writeln!(f, "{message}")?,
            ErrorKind::InternalError(kind) => writeln!(
                f,
                "Encountered an internal `{kind:?}` error while parsing the filter. Please file an issue with the filter that triggered it."
            )?,
            ErrorKind::Char(c) => {
                panic!("Tried to display a `char` filter error: {c}")
            }
        }
        let base_column = self.context.get_utf8_column();
        let size = self.context.fragment().chars().count();

        write!(f, "{}:{} {}", base_column, base_column + size, self.context.extra)
    }
}
