use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use flow_diagnostics::{SourceMap, SourceStream, Span};

use crate::error::LexError;
use crate::literal::Cidr;
use crate::number_units::unit_multiplier;
use crate::token::{Keyword, Operator, Token, TokenKind};

/// Tokenizes one Flow source (plus any transitively `import`ed sources
/// already registered in the `SourceMap`'s include chain). Regex literals
/// (`/…/`) are only recognized when the caller tells `next_token` that a
/// regex is grammatically possible at this position — division and regex
/// share the `/` character and only the parser's grammar position
/// disambiguates them (spec §4.1).
pub struct Lexer<'a> {
    stream: SourceStream<'a>,
    pending: VecDeque<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(map: &'a SourceMap, root: flow_diagnostics::SourceId) -> Self {
        Self { stream: SourceStream::new(map, root), pending: VecDeque::new() }
    }

    pub fn import_include(&mut self, source: flow_diagnostics::SourceId) {
        self.stream.push_include(source);
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(self.stream.current_source(), start, self.stream.offset())
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.stream.peek() {
                Some(c) if c.is_whitespace() => {
                    self.stream.bump();
                }
                Some('#') if self.stream.peek2() != Some('{') => {
                    // Line comment: '#' not immediately followed by '{'.
                    while let Some(c) = self.stream.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.stream.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Produce the next token. `regex_allowed` tells the lexer whether `/`
    /// at this position should start a regex literal (primary-expression
    /// position) rather than the division operator.
    pub fn next_token(&mut self, regex_allowed: bool) -> Result<Token, LexError> {
        if let Some(tok) = self.pending.pop_front() {
            return Ok(tok);
        }
        self.skip_trivia();
        let start = self.stream.offset();
        let Some(c) = self.stream.peek() else {
            return Ok(Token::new(TokenKind::Eof, self.span_from(start)));
        };

        if c == '"' {
            return self.lex_string_head(start);
        }
        if c == '/' && regex_allowed {
            return self.lex_regex(start);
        }
        if c.is_ascii_digit() {
            if let Some(tok) = self.try_lex_address(start)? {
                return Ok(tok);
            }
            return self.lex_number(start);
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(self.lex_ident_or_keyword(start));
        }

        self.lex_punct_or_operator(start, c)
    }

    // -- identifiers / keywords ------------------------------------------------

    fn lex_ident_or_keyword(&mut self, start: u32) -> Token {
        let mut ident = String::new();
        while let Some(c) = self.stream.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                // '.' allows dotted builtin names like `sys.env`, `proxy.cluster`.
                if c == '.' {
                    // Only consume the dot if followed by an identifier char,
                    // so trailing statement punctuation is never swallowed.
                    if !matches!(self.stream.peek2(), Some(n) if n.is_alphabetic() || n == '_') {
                        break;
                    }
                }
                ident.push(c);
                self.stream.bump();
            } else {
                break;
            }
        }
        let span = self.span_from(start);
        match Keyword::lookup(&ident) {
            Some(kw) => Token::new(TokenKind::Keyword(kw), span),
            None => Token::new(TokenKind::Ident(ident), span),
        }
    }

    // -- numbers with unit suffixes --------------------------------------------

    fn lex_number(&mut self, start: u32) -> Result<Token, LexError> {
        let mut digits = String::new();
        while let Some(c) = self.stream.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.stream.bump();
            } else {
                break;
            }
        }
        let value: i64 = digits.parse().unwrap_or(i64::MAX);

        let mut suffix = String::new();
        while let Some(c) = self.stream.peek() {
            if c.is_alphabetic() {
                suffix.push(c);
                self.stream.bump();
            } else {
                break;
            }
        }

        let value = if suffix.is_empty() {
            value
        } else {
            match unit_multiplier(&suffix) {
                Some(mult) => value.saturating_mul(mult),
                None => {
                    return Err(LexError::UnknownUnitSuffix {
                        suffix,
                        span: self.span_from(start),
                    })
                }
            }
        };

        Ok(Token::new(TokenKind::Number(value), self.span_from(start)))
    }

    // -- IP address / CIDR literals --------------------------------------------

    fn try_lex_address(&mut self, start: u32) -> Result<Option<Token>, LexError> {
        let rest = self.stream.rest();
        let v6_len = max_prefix_len(rest, |c| c.is_ascii_hexdigit() || c == ':' || c == '.');
        if rest[..v6_len].contains(':') {
            if let Some(len) = longest_valid_prefix(&rest[..v6_len], |s| s.parse::<Ipv6Addr>().is_ok()) {
                return Ok(Some(self.finish_address(start, len, IpAddrKind::V6)?));
            }
        }
        let v4_len = max_prefix_len(rest, |c| c.is_ascii_digit() || c == '.');
        if let Some(len) = longest_valid_prefix(&rest[..v4_len], |s| s.parse::<Ipv4Addr>().is_ok()) {
            return Ok(Some(self.finish_address(start, len, IpAddrKind::V4)?));
        }
        Ok(None)
    }

    fn finish_address(&mut self, start: u32, len: usize, kind: IpAddrKind) -> Result<Token, LexError> {
        let text = self.stream.rest()[..len].to_string();
        self.stream.advance(len as u32);
        let address: IpAddr = match kind {
            IpAddrKind::V4 => text.parse::<Ipv4Addr>().expect("validated by longest_valid_prefix").into(),
            IpAddrKind::V6 => text.parse::<Ipv6Addr>().expect("validated by longest_valid_prefix").into(),
        };

        if self.stream.peek() == Some('/') && matches!(self.stream.peek2(), Some(d) if d.is_ascii_digit()) {
            self.stream.bump(); // '/'
            let mut prefix_text = String::new();
            while let Some(c) = self.stream.peek() {
                if c.is_ascii_digit() {
                    prefix_text.push(c);
                    self.stream.bump();
                } else {
                    break;
                }
            }
            let prefix: u8 = prefix_text.parse().unwrap_or(255);
            let cidr = Cidr::new(address, prefix).ok_or_else(|| LexError::InvalidCidrPrefix {
                text: format!("{text}/{prefix_text}"),
                span: self.span_from(start),
            })?;
            return Ok(Token::new(TokenKind::Cidr(cidr), self.span_from(start)));
        }

        Ok(Token::new(TokenKind::IpAddress(address), self.span_from(start)))
    }

    // -- strings (raw and interpolated) ----------------------------------------

    /// Scans a string literal starting at the opening `"`. If it contains no
    /// `#{...}` interpolation, returns a single `String` token. Otherwise it
    /// lexes the whole literal eagerly — fragment, nested expression tokens,
    /// fragment, ... — and buffers everything but the first token in
    /// `pending`, so callers keep seeing one token at a time.
    fn lex_string_head(&mut self, start: u32) -> Result<Token, LexError> {
        self.stream.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.stream.peek() {
                None => return Err(LexError::UnterminatedString { span: self.span_from(start) }),
                Some('"') => {
                    self.stream.bump();
                    return Ok(Token::new(TokenKind::String(text), self.span_from(start)));
                }
                Some('\\') => {
                    self.stream.bump();
                    text.push(self.lex_escape(start)?);
                }
                Some('#') if self.stream.peek2() == Some('{') => {
                    self.stream.bump();
                    self.stream.bump();
                    return self.lex_interpolated_tail(start, text);
                }
                Some(c) => {
                    self.stream.bump();
                    text.push(c);
                }
            }
        }
    }

    fn lex_escape(&mut self, start: u32) -> Result<char, LexError> {
        match self.stream.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('#') => Ok('#'),
            Some(other) => Ok(other),
            None => Err(LexError::UnterminatedString { span: self.span_from(start) }),
        }
    }

    /// Having just consumed the opening `#{` of an interpolation, lex the
    /// nested expression's tokens (recursively handling further nested
    /// strings/interpolations), then continue scanning string fragments —
    /// possibly hitting more `#{` sections — until the closing quote.
    fn lex_interpolated_tail(&mut self, start: u32, head_fragment: String) -> Result<Token, LexError> {
        let mut out = vec![Token::new(
            TokenKind::StringFragment(head_fragment),
            self.span_from(start),
        )];

        loop {
            let tok_start = self.stream.offset();
            // Expressions inside `#{...}` never contain a bare '}', so the
            // first one we see always closes this interpolation.
            if self.stream.peek() == Some('}') {
                self.stream.bump();
                out.push(Token::new(TokenKind::InterpolationEnd, self.span_from(tok_start)));
                break;
            }
            if self.stream.peek().is_none() {
                return Err(LexError::UnterminatedInterpolation { span: self.span_from(start) });
            }
            // Regex literals can't appear as a bare interpolated expression
            // position meaningfully different from any other primary, so
            // allow them just like a normal primary-expression token stream.
            let regex_allowed = matches!(out.last().map(|t| &t.kind), Some(TokenKind::Operator(_)) | None);
            out.push(self.next_token(regex_allowed)?);
        }

        // Resume scanning the string body for another fragment.
        let mut fragment = String::new();
        loop {
            match self.stream.peek() {
                None => return Err(LexError::UnterminatedString { span: self.span_from(start) }),
                Some('"') => {
                    self.stream.bump();
                    out.push(Token::new(TokenKind::StringEnd(fragment), self.span_from(start)));
                    break;
                }
                Some('\\') => {
                    self.stream.bump();
                    fragment.push(self.lex_escape(start)?);
                }
                Some('#') if self.stream.peek2() == Some('{') => {
                    self.stream.bump();
                    self.stream.bump();
                    let nested = self.lex_interpolated_tail(start, fragment)?;
                    out.push(nested);
                    out.extend(self.pending.drain(..));
                    break;
                }
                Some(c) => {
                    self.stream.bump();
                    fragment.push(c);
                }
            }
        }

        let mut out = out.into_iter();
        let first = out.next().expect("always at least StringFragment");
        self.pending.extend(out);
        Ok(first)
    }

    // -- regex literals ---------------------------------------------------------

    fn lex_regex(&mut self, start: u32) -> Result<Token, LexError> {
        self.stream.bump(); // opening '/'
        let mut pattern = String::new();
        loop {
            match self.stream.peek() {
                None | Some('\n') => return Err(LexError::UnterminatedRegex { span: self.span_from(start) }),
                Some('/') => {
                    self.stream.bump();
                    break;
                }
                Some('\\') => {
                    self.stream.bump();
                    pattern.push('\\');
                    if let Some(c) = self.stream.bump() {
                        pattern.push(c);
                    }
                }
                Some(c) => {
                    self.stream.bump();
                    pattern.push(c);
                }
            }
        }
        Ok(Token::new(TokenKind::Regex(pattern), self.span_from(start)))
    }

    // -- punctuation / operators -------------------------------------------------

    fn lex_punct_or_operator(&mut self, start: u32, c: char) -> Result<Token, LexError> {
        self.stream.bump();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Operator(Operator::Plus),
            '-' => TokenKind::Operator(Operator::Minus),
            '%' => TokenKind::Operator(Operator::Percent),
            '~' => TokenKind::Operator(Operator::Tilde),
            '*' => {
                if self.stream.peek() == Some('*') {
                    self.stream.bump();
                    TokenKind::Operator(Operator::Pow)
                } else {
                    TokenKind::Operator(Operator::Star)
                }
            }
            '/' => TokenKind::Operator(Operator::Slash),
            '=' => match self.stream.peek() {
                Some('=') => {
                    self.stream.bump();
                    TokenKind::Operator(Operator::Eq)
                }
                Some('^') => {
                    self.stream.bump();
                    TokenKind::Operator(Operator::PrefixMatch)
                }
                Some('$') => {
                    self.stream.bump();
                    TokenKind::Operator(Operator::SuffixMatch)
                }
                Some('~') => {
                    self.stream.bump();
                    TokenKind::Operator(Operator::RegexMatch)
                }
                _ => TokenKind::Operator(Operator::Assign),
            },
            '!' if self.stream.peek() == Some('=') => {
                self.stream.bump();
                TokenKind::Operator(Operator::Ne)
            }
            '<' => {
                if self.stream.peek() == Some('=') {
                    self.stream.bump();
                    TokenKind::Operator(Operator::Le)
                } else {
                    TokenKind::Operator(Operator::Lt)
                }
            }
            '>' => {
                if self.stream.peek() == Some('=') {
                    self.stream.bump();
                    TokenKind::Operator(Operator::Ge)
                } else {
                    TokenKind::Operator(Operator::Gt)
                }
            }
            other => return Err(LexError::UnexpectedChar { found: other, span: self.span_from(start) }),
        };
        Ok(Token::new(kind, self.span_from(start)))
    }
}

enum IpAddrKind {
    V4,
    V6,
}

/// Length (in bytes) of the maximal prefix of `s` whose characters satisfy
/// `pred`.
fn max_prefix_len(s: &str, pred: impl Fn(char) -> bool) -> usize {
    s.char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Tries progressively shorter prefixes of `s` (by char boundary) until
/// `valid` accepts one, returning its byte length. Addresses are lexed this
/// way because trailing characters (a CIDR `/32`, statement punctuation)
/// can make the maximal charset-matching prefix invalid while a shorter
/// prefix is a well-formed address.
fn longest_valid_prefix(s: &str, valid: impl Fn(&str) -> bool) -> Option<usize> {
    let boundaries: Vec<usize> = s.char_indices().map(|(i, _)| i).chain(std::iter::once(s.len())).collect();
    for &end in boundaries.iter().rev() {
        if end == 0 {
            continue;
        }
        if valid(&s[..end]) {
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_diagnostics::SourceMap;

    fn tokens(src: &str) -> Vec<TokenKind> {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", src.to_string());
        let mut lexer = Lexer::new(&map, id);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token(true).expect("lex ok");
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn lexes_keywords_and_idents() {
        let toks = tokens("handler main foo_bar");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Handler),
                TokenKind::Ident("main".into()),
                TokenKind::Ident("foo_bar".into()),
            ]
        );
    }

    #[test]
    fn lexes_number_with_unit_suffix() {
        let toks = tokens("1kbyte");
        assert_eq!(toks, vec![TokenKind::Number(1024)]);
    }

    #[test]
    fn lexes_plain_number() {
        assert_eq!(tokens("42"), vec![TokenKind::Number(42)]);
    }

    #[test]
    fn rejects_unknown_unit_suffix() {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", "3furlongs".to_string());
        let mut lexer = Lexer::new(&map, id);
        assert!(lexer.next_token(true).is_err());
    }

    #[test]
    fn lexes_ipv4_literal() {
        assert_eq!(
            tokens("192.168.0.1"),
            vec![TokenKind::IpAddress("192.168.0.1".parse().unwrap())]
        );
    }

    #[test]
    fn lexes_cidr_literal() {
        let toks = tokens("10.0.0.0/8");
        match &toks[0] {
            TokenKind::Cidr(c) => {
                assert_eq!(c.address, "10.0.0.0".parse::<IpAddr>().unwrap());
                assert_eq!(c.prefix, 8);
            }
            other => panic!("expected Cidr, got {other:?}"),
        }
    }

    #[test]
    fn lexes_ipv6_literal() {
        let toks = tokens("::1");
        assert_eq!(toks, vec![TokenKind::IpAddress("::1".parse().unwrap())]);
    }

    #[test]
    fn lexes_plain_string() {
        assert_eq!(tokens("\"hi\""), vec![TokenKind::String("hi".into())]);
    }

    #[test]
    fn lexes_interpolated_string() {
        let toks = tokens("\"hi #{1+2}\"");
        assert_eq!(
            toks,
            vec![
                TokenKind::StringFragment("hi ".into()),
                TokenKind::Number(1),
                TokenKind::Operator(Operator::Plus),
                TokenKind::Number(2),
                TokenKind::InterpolationEnd,
                TokenKind::StringEnd("".into()),
            ]
        );
    }

    #[test]
    fn lexes_regex_literal() {
        assert_eq!(tokens("/^a+$/"), vec![TokenKind::Regex("^a+$".into())]);
    }

    #[test]
    fn lexes_dotted_builtin_name() {
        assert_eq!(tokens("proxy.cluster"), vec![TokenKind::Ident("proxy.cluster".into())]);
    }

    #[test]
    fn line_comment_is_skipped() {
        assert_eq!(tokens("1 # comment\n2"), vec![TokenKind::Number(1), TokenKind::Number(2)]);
    }
}
