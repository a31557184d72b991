use crate::shader::error::ShaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Number(f64),
    True,
    False,
    Let,

    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Assign,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,

    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,

    Question,
    Colon,

    Eof,
}

fn keyword(text: &str) -> Option<TokenKind> {
    Some(match text {
        "let" => TokenKind::Let,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}

fn pair(a: u8, b: u8) -> Option<TokenKind> {
    Some(match (a, b) {
        (b'&', b'&') => TokenKind::AndAnd,
        (b'|', b'|') => TokenKind::OrOr,
        (b'=', b'=') => TokenKind::EqEq,
        (b'!', b'=') => TokenKind::Ne,
        (b'<', b'=') => TokenKind::Le,
        (b'>', b'=') => TokenKind::Ge,
        _ => return None,
    })
}

fn single(c: u8) -> Option<TokenKind> {
    Some(match c {
        b'(' => TokenKind::LParen,
        b')' => TokenKind::RParen,
        b',' => TokenKind::Comma,
        b'.' => TokenKind::Dot,
        b';' => TokenKind::Semicolon,
        b'=' => TokenKind::Assign,
        b'+' => TokenKind::Plus,
        b'-' => TokenKind::Minus,
        b'*' => TokenKind::Star,
        b'/' => TokenKind::Slash,
        b'%' => TokenKind::Percent,
        b'!' => TokenKind::Bang,
        b'<' => TokenKind::Lt,
        b'>' => TokenKind::Gt,
        b'?' => TokenKind::Question,
        b':' => TokenKind::Colon,
        _ => return None,
    })
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

struct Cursor<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn eat_while(&mut self, pred: impl Fn(u8) -> bool) -> usize {
        let start = self.pos;
        while self.peek_at(0).is_some_and(&pred) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// Skip whitespace, `// line` and `/* block */` comments.
    fn skip_trivia(&mut self) -> Result<(), ShaderError> {
        loop {
            self.eat_while(|c| c.is_ascii_whitespace());
            match (self.peek_at(0), self.peek_at(1)) {
                (Some(b'/'), Some(b'/')) => {
                    self.eat_while(|c| c != b'\n');
                }
                (Some(b'/'), Some(b'*')) => {
                    let open = self.pos;
                    self.pos += 2;
                    loop {
                        match (self.peek_at(0), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                return Err(ShaderError::new(open, "unterminated block comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, ShaderError> {
        let start = self.pos;
        let int_digits = self.eat_while(|c| c.is_ascii_digit());
        if self.peek_at(0) == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            self.eat_while(|c| c.is_ascii_digit());
        } else if int_digits == 0 {
            return Err(ShaderError::new(start, "invalid number"));
        }

        if matches!(self.peek_at(0), Some(b'e' | b'E')) {
            let e_pos = self.pos;
            self.pos += 1;
            if matches!(self.peek_at(0), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.eat_while(|c| c.is_ascii_digit()) == 0 {
                return Err(ShaderError::new(e_pos, "number exponent needs digits"));
            }
        }

        // `2x` is neither a number nor an identifier.
        if self.peek_at(0).is_some_and(is_ident_continue) {
            return Err(ShaderError::new(
                start,
                "identifier cannot start with a digit",
            ));
        }

        self.src[start..self.pos]
            .parse()
            .map(TokenKind::Number)
            .map_err(|_| ShaderError::new(start, "invalid number"))
    }

    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        self.eat_while(is_ident_continue);
        let text = &self.src[start..self.pos];
        keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_owned()))
    }

    fn punct(&mut self, c: u8) -> Result<TokenKind, ShaderError> {
        if let Some(kind) = self.peek_at(1).and_then(|next| pair(c, next)) {
            self.pos += 2;
            return Ok(kind);
        }
        let Some(kind) = single(c) else {
            let ch = self.src[self.pos..].chars().next().unwrap_or('?');
            return Err(ShaderError::new(
                self.pos,
                format!("unexpected character '{ch}'"),
            ));
        };
        self.pos += 1;
        Ok(kind)
    }

    fn next_token(&mut self) -> Result<Option<Token>, ShaderError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek_at(0) else {
            return Ok(None);
        };
        let starts_number =
            c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()));
        let kind = if starts_number {
            self.number()?
        } else if is_ident_start(c) {
            self.word()
        } else {
            self.punct(c)?
        };
        Ok(Some(Token {
            kind,
            span: Span {
                start,
                end: self.pos,
            },
        }))
    }
}

/// Tokenize a program. The result always ends with [`TokenKind::Eof`].
pub(crate) fn lex(input: &str) -> Result<Vec<Token>, ShaderError> {
    let mut cursor = Cursor::new(input);
    let mut out = Vec::new();
    while let Some(token) = cursor.next_token()? {
        out.push(token);
    }
    out.push(Token {
        kind: TokenKind::Eof,
        span: Span {
            start: input.len(),
            end: input.len(),
        },
    });
    Ok(out)
}
