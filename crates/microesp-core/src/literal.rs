//! Strict parser for printed MicroPython literals.
//!
//! Only literal syntax is accepted: `None`, `True`, `False`, numbers,
//! strings, byte strings and list/tuple/set/dict displays of literals.
//! Names, calls (other than `set()` and `bytearray(b'...')`) and operators
//! are rejected, so remote output can never make the host evaluate code.

use thiserror::Error;

use crate::Value;

/// Nesting limit for containers.
const MAX_DEPTH: usize = 64;

/// Literal parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid literal at offset {offset}: {reason}")]
pub struct LiteralError {
    /// Byte offset into the input where parsing failed.
    pub offset: usize,
    /// What was expected or found.
    pub reason: String,
}

/// Parse remote output as a single literal.
///
/// Leading and trailing whitespace (including the `\r\n` that `print` adds)
/// is ignored.
///
/// # Errors
/// Returns error if the text is not exactly one literal.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser { src: input, pos: 0 };
    parser.skip_ws();
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(parser.error("trailing characters after literal"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), LiteralError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        if !rest.starts_with(word) {
            return false;
        }
        let boundary = rest[word.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
        if boundary {
            self.pos += word.len();
        }
        boundary
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }

        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.bump();
                let items = self.sequence(']', depth)?.0;
                Ok(Value::List(items))
            }
            Some('(') => {
                self.bump();
                let (mut items, trailing_comma) = self.sequence(')', depth)?;
                if items.len() == 1 && !trailing_comma {
                    // Parenthesized expression, not a tuple.
                    return Ok(items.remove(0));
                }
                Ok(Value::Tuple(items))
            }
            Some('{') => {
                self.bump();
                self.brace(depth)
            }
            Some('\'' | '"') => self.string().map(Value::Str),
            Some('b' | 'B') if matches!(self.rest().as_bytes().get(1), Some(b'\'' | b'"')) => {
                self.bump();
                self.bytes().map(Value::Bytes)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(_) => self.keyword(),
        }
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        if self.eat_keyword("None") {
            return Ok(Value::None);
        }
        if self.eat_keyword("True") {
            return Ok(Value::Bool(true));
        }
        if self.eat_keyword("False") {
            return Ok(Value::Bool(false));
        }
        if self.eat_keyword("set") {
            self.skip_ws();
            self.expect('(')?;
            self.skip_ws();
            self.expect(')')?;
            return Ok(Value::Set(Vec::new()));
        }
        if self.eat_keyword("bytearray") {
            self.skip_ws();
            self.expect('(')?;
            self.skip_ws();
            if !matches!(self.peek(), Some('b' | 'B')) {
                return Err(self.error("expected bytes literal"));
            }
            self.bump();
            let data = self.bytes()?;
            self.skip_ws();
            self.expect(')')?;
            return Ok(Value::Bytes(data));
        }
        Err(self.error("not a literal"))
    }

    /// Comma separated values up to `close`. Returns whether a trailing
    /// comma was present.
    fn sequence(&mut self, close: char, depth: usize) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            if !items.is_empty() && !trailing_comma {
                return Err(self.error(format!("expected ',' or '{close}'")));
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            trailing_comma = self.eat(',');
        }
    }

    fn brace(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.skip_ws();
        if self.eat('}') {
            return Ok(Value::Dict(Vec::new()));
        }

        let first = self.value(depth + 1)?;
        self.skip_ws();
        if !self.eat(':') {
            self.skip_ws();
            let mut items = vec![first];
            if self.eat(',') {
                items.extend(self.sequence('}', depth)?.0);
            } else {
                self.expect('}')?;
            }
            return Ok(Value::Set(items));
        }

        self.skip_ws();
        let mut entries = vec![(first, self.value(depth + 1)?)];
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Dict(entries));
            }
            self.expect(',')?;
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Dict(entries));
            }
            let key = self.value(depth + 1)?;
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.value(depth + 1)?;
            entries.push((key, value));
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }

        let mut is_float = false;
        let mut seen_digit = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => seen_digit = true,
                '.' => is_float = true,
                'e' | 'E' if seen_digit => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        let text = &self.src[start..self.pos];
        if !seen_digit {
            self.pos = start;
            return Err(self.error("malformed number"));
        }

        let result = if is_float {
            text.parse::<f64>().map(Value::Float).ok()
        } else {
            text.parse::<i64>().map(Value::Int).ok()
        };
        result.ok_or_else(|| LiteralError {
            offset: start,
            reason: format!("malformed or out of range number '{text}'"),
        })
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or_else(|| self.error("expected quote"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.escape(true)?),
                Some(c) => out.push(c),
            }
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>, LiteralError> {
        let quote = self.bump().ok_or_else(|| self.error("expected quote"))?;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated bytes")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let c = self.escape(false)?;
                    let b = u8::try_from(u32::from(c))
                        .map_err(|_| self.error("non-byte escape in bytes"))?;
                    out.push(b);
                }
                Some(c) if c.is_ascii() => out.push(c as u8),
                Some(_) => return Err(self.error("non-ASCII character in bytes")),
            }
        }
    }

    fn escape(&mut self, unicode: bool) -> Result<char, LiteralError> {
        let c = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
        let decoded = match c {
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or_default();
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                char::from_u32(code).ok_or_else(|| self.error("invalid octal escape"))?
            }
            'x' => self.hex_escape(2)?,
            'u' if unicode => self.hex_escape(4)?,
            'U' if unicode => self.hex_escape(8)?,
            other => return Err(self.error(format!("unsupported escape '\\{other}'"))),
        };
        Ok(decoded)
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated hex escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        let c = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos = end;
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Value {
        parse_literal(s).unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse("None"), Value::None);
        assert_eq!(parse("True"), Value::Bool(true));
        assert_eq!(parse("False\r\n"), Value::Bool(false));
        assert_eq!(parse("1"), Value::Int(1));
        assert_eq!(parse("-1"), Value::Int(-1));
        assert_eq!(parse("1.0"), Value::Float(1.0));
        assert_eq!(parse("-1.0"), Value::Float(-1.0));
        assert_eq!(parse("1e+10"), Value::Float(1e10));
        assert_eq!(parse("80000000\r\n"), Value::Int(80_000_000));
    }

    #[test]
    fn test_strings() {
        assert_eq!(parse("'a'"), Value::from("a"));
        assert_eq!(parse(r#""it's""#), Value::from("it's"));
        assert_eq!(parse(r"'tab\there\x21é'"), Value::from("tab\there!\u{e9}"));
        assert_eq!(parse(r"'\\'"), Value::from("\\"));
    }

    #[test]
    fn test_bytes() {
        assert_eq!(parse(r"b'\x18\xfe4\x00'"), Value::Bytes(vec![0x18, 0xfe, b'4', 0]));
        assert_eq!(parse(r"bytearray(b'ab')"), Value::Bytes(b"ab".to_vec()));
        assert_eq!(parse("b'A'"), Value::Bytes(vec![b'A']));
        assert!(parse_literal("b'\u{e9}'").is_err());
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(parse("[]"), Value::List(vec![]));
        assert_eq!(parse("()"), Value::Tuple(vec![]));
        assert_eq!(parse("set()"), Value::Set(vec![]));
        assert_eq!(parse("{}"), Value::Dict(vec![]));
    }

    #[test]
    fn test_nested_containers() {
        let v = parse("('192.168.4.1', '255.255.255.0', '192.168.4.1', '8.8.8.8')");
        assert_eq!(v.as_items().map(<[Value]>::len), Some(4));

        let v = parse("[(b'net', b'\\x01\\x02', 6, -70, 3, 0)]");
        let rows = v.as_items().unwrap();
        assert_eq!(rows[0].as_items().unwrap()[3], Value::Int(-70));

        assert_eq!(parse("(1,)"), Value::Tuple(vec![Value::Int(1)]));
        assert_eq!(parse("(1)"), Value::Int(1));
        assert_eq!(parse("{1, 2}"), Value::Set(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(
            parse("{'a': [1], 'b': None,}"),
            Value::Dict(vec![
                (Value::from("a"), Value::List(vec![Value::Int(1)])),
                (Value::from("b"), Value::None),
            ])
        );
    }

    #[test]
    fn test_rejects_non_literals() {
        for input in [
            "",
            "os.remove('x')",
            "__import__('os')",
            "1 + 1",
            "[1 2]",
            "Nonesuch",
            "'unterminated",
            "inf",
            "99999999999999999999999",
        ] {
            assert!(parse_literal(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 2) + &"]".repeat(MAX_DEPTH + 2);
        assert!(parse_literal(&deep).is_err());
    }

    #[test]
    fn test_display_reparses() {
        let v = Value::List(vec![
            Value::from("quote ' and \\"),
            Value::Bytes(vec![0, 255, b'\'']),
            Value::Tuple(vec![Value::Float(-2.5)]),
            Value::Set(vec![]),
        ]);
        assert_eq!(parse(&v.to_string()), v);
    }
}
