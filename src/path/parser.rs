//! nom parser for destination lvalue paths
//!
//! Grammar (a concrete subset of jq paths):
//!
//! ```text
//! path     := "." segment+
//! segment  := "." ident | "."? "[" ws ( index | quoted ) ws "]"
//! ident    := [A-Za-z_][A-Za-z0-9_]*
//! index    := [0-9]+
//! quoted   := '"' chars '"' | "'" chars "'"
//! ```

use super::PathSegment;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while_m_n},
    character::complete::{anychar, char, digit1, multispace0, satisfy},
    combinator::{all_consuming, opt, recognize},
    error::{ErrorKind, ParseError as NomParseError},
    multi::many1,
    sequence::{delimited, pair, preceded},
};
use nom_locate::LocatedSpan;

/// Input span with byte offsets
pub type Span<'a> = LocatedSpan<&'a str>;

/// Syntax error with the byte offset where parsing stopped
#[derive(Debug, Clone, PartialEq)]
pub struct PathSyntaxError {
    /// Byte offset into the path text
    pub position: usize,
    /// Error message
    pub message: String,
    /// Set for errors raised by nom itself rather than by a segment parser
    pub generic: bool,
}

impl PathSyntaxError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
            generic: false,
        }
    }
}

impl<'a> NomParseError<Span<'a>> for PathSyntaxError {
    fn from_error_kind(input: Span<'a>, kind: ErrorKind) -> Self {
        Self {
            position: input.location_offset(),
            message: format!("{kind:?}"),
            generic: true,
        }
    }

    fn append(_input: Span<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Parse path text into segments
///
/// The caller checks for the leading `.` and the bare-root case so the
/// messages here only cover segment syntax.
pub fn parse_segments(text: &str) -> Result<Vec<PathSegment>, PathSyntaxError> {
    let span = Span::new(text);
    match all_consuming(many1(segment)).parse(span) {
        Ok((_, segments)) => Ok(segments),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            if err.generic {
                let rest = text.get(err.position..).unwrap_or_default();
                Err(PathSyntaxError::new(
                    err.position,
                    format!("unsupported or non-concrete path near '{rest}'"),
                ))
            } else {
                Err(err)
            }
        }
        Err(nom::Err::Incomplete(_)) => Err(PathSyntaxError::new(
            text.len(),
            "unexpected end of path",
        )),
    }
}

fn segment(input: Span) -> IResult<Span, PathSegment, PathSyntaxError> {
    alt((field, preceded(opt(char('.')), bracket))).parse(input)
}

fn field(input: Span) -> IResult<Span, PathSegment, PathSyntaxError> {
    let (input, name) = preceded(
        char('.'),
        recognize(pair(
            satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
    )
    .parse(input)?;

    Ok((input, PathSegment::Field(name.fragment().to_string())))
}

fn bracket(input: Span) -> IResult<Span, PathSegment, PathSyntaxError> {
    delimited(
        pair(char('['), multispace0),
        alt((index, quoted_key)),
        pair(multispace0, char(']')),
    )
    .parse(input)
}

fn index(input: Span) -> IResult<Span, PathSegment, PathSyntaxError> {
    let (input, digits) = digit1::<_, PathSyntaxError>(input)?;
    match digits.fragment().parse::<usize>() {
        Ok(value) => Ok((input, PathSegment::Index(value))),
        Err(_) => Err(nom::Err::Failure(PathSyntaxError::new(
            digits.location_offset(),
            format!("index '{}' is out of range", digits.fragment()),
        ))),
    }
}

fn quoted_key(input: Span) -> IResult<Span, PathSegment, PathSyntaxError> {
    let start = input.location_offset();
    let (mut remaining, quote) = alt((char('"'), char('\''))).parse(input)?;
    let mut key = String::new();

    loop {
        let Ok((next, ch)) = anychar::<_, PathSyntaxError>(remaining) else {
            return Err(nom::Err::Failure(PathSyntaxError::new(
                start,
                "unterminated quoted key",
            )));
        };

        if ch == quote {
            return Ok((next, PathSegment::Field(key)));
        }

        if ch != '\\' {
            key.push(ch);
            remaining = next;
            continue;
        }

        let escape_at = remaining.location_offset();
        let Ok((next, escaped)) = anychar::<_, PathSyntaxError>(next) else {
            return Err(nom::Err::Failure(PathSyntaxError::new(
                start,
                "unterminated quoted key",
            )));
        };
        remaining = next;
        match escaped {
            '"' => key.push('"'),
            '\'' => key.push('\''),
            '\\' => key.push('\\'),
            '/' => key.push('/'),
            'n' => key.push('\n'),
            't' => key.push('\t'),
            'r' => key.push('\r'),
            'b' => key.push('\u{8}'),
            'f' => key.push('\u{c}'),
            'u' => {
                let (next, hex) = take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit())
                    .parse(remaining)
                    .map_err(|_: nom::Err<PathSyntaxError>| {
                        nom::Err::Failure(PathSyntaxError::new(
                            escape_at,
                            "\\u escape needs four hex digits",
                        ))
                    })?;
                let decoded = u32::from_str_radix(hex.fragment(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        nom::Err::Failure(PathSyntaxError::new(
                            escape_at,
                            format!("invalid code point \\u{}", hex.fragment()),
                        ))
                    })?;
                key.push(decoded);
                remaining = next;
            }
            other => {
                return Err(nom::Err::Failure(PathSyntaxError::new(
                    escape_at,
                    format!("invalid escape sequence '\\{other}'"),
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> PathSegment {
        PathSegment::Field(name.to_string())
    }

    #[test]
    fn test_dotted_fields_and_indices() {
        let segments = parse_segments(".a.b[2].c").unwrap();
        assert_eq!(
            segments,
            vec![field("a"), field("b"), PathSegment::Index(2), field("c")]
        );
    }

    #[test]
    fn test_quoted_keys_with_escapes() {
        let segments = parse_segments(r#".foo["bar baz"][0]["qu\"ote"]"#).unwrap();
        assert_eq!(
            segments,
            vec![
                field("foo"),
                field("bar baz"),
                PathSegment::Index(0),
                field("qu\"ote")
            ]
        );

        let segments = parse_segments(r".x['it\'s'][ 'café' ]").unwrap();
        assert_eq!(segments, vec![field("x"), field("it's"), field("café")]);
    }

    #[test]
    fn test_dot_before_bracket() {
        let segments = parse_segments(r#".["key"].[1]"#).unwrap();
        assert_eq!(segments, vec![field("key"), PathSegment::Index(1)]);
    }

    #[test]
    fn test_rejects_non_concrete_paths() {
        let err = parse_segments(".a[]").unwrap_err();
        assert_eq!(err.position, 2);
        assert!(err.message.contains("non-concrete"));

        assert!(parse_segments(".a | .b").is_err());
        assert!(parse_segments(".a[-1]").is_err());
        assert!(parse_segments(".1abc").is_err());
    }

    #[test]
    fn test_reports_bad_quoted_keys() {
        let err = parse_segments(r#".a["open"#).unwrap_err();
        assert!(err.message.contains("unterminated"));

        let err = parse_segments(r#".a["\q"]"#).unwrap_err();
        assert!(err.message.contains("invalid escape"));
    }
}
