use crate::shader::ast::{BinaryOp, Expr, LetStmt, Lit, Program, UnaryOp};
use crate::shader::error::ShaderError;
use crate::shader::lexer::{Token, TokenKind, lex};

pub(crate) fn parse_program(src: &str) -> Result<Program, ShaderError> {
    let tokens = lex(src)?;
    let mut p = Parser { tokens, pos: 0 };

    let mut lets = Vec::new();
    while p.peek().kind == TokenKind::Let {
        let offset = p.bump().span.start;
        let name = p.expect_ident()?;
        p.expect(TokenKind::Assign)?;
        let value = p.parse_expr()?;
        p.expect(TokenKind::Semicolon)?;
        lets.push(LetStmt {
            name,
            value,
            offset,
        });
    }

    let result = p.parse_expr()?;
    p.consume(TokenKind::Semicolon);
    p.expect(TokenKind::Eof)?;
    Ok(Program { lets, result })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> &Token {
        let t = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn offset(&self) -> usize {
        self.peek().span.start
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ShaderError> {
        if self.peek().kind == kind {
            self.bump();
            Ok(())
        } else {
            Err(ShaderError::new(
                self.offset(),
                format!("expected {kind:?}, found {:?}", self.peek().kind),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ShaderError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Ident(name) => Ok(name),
            other => Err(ShaderError::new(
                t.span.start,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ShaderError> {
        let cond = self.parse_or()?;
        let offset = self.offset();
        if !self.consume(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
            offset,
        })
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ShaderError>,
    ) -> Result<Expr, ShaderError> {
        let mut e = next(self)?;
        'outer: loop {
            let offset = self.offset();
            for (kind, op) in ops {
                if self.consume(kind.clone()) {
                    let r = next(self)?;
                    e = Expr::Binary {
                        op: *op,
                        left: Box::new(e),
                        right: Box::new(r),
                        offset,
                    };
                    continue 'outer;
                }
            }
            return Ok(e);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ShaderError> {
        self.binary_level(&[(TokenKind::OrOr, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ShaderError> {
        self.binary_level(&[(TokenKind::AndAnd, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ShaderError> {
        self.binary_level(
            &[(TokenKind::EqEq, BinaryOp::Eq), (TokenKind::Ne, BinaryOp::Ne)],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, ShaderError> {
        self.binary_level(
            &[
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Ge, BinaryOp::Ge),
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Gt, BinaryOp::Gt),
            ],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr, ShaderError> {
        self.binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Self::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr, ShaderError> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ShaderError> {
        let offset = self.offset();
        if self.consume(TokenKind::Minus) {
            let e = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(e),
                offset,
            });
        }
        if self.consume(TokenKind::Bang) {
            let e = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(e),
                offset,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ShaderError> {
        let mut e = self.parse_primary()?;

        loop {
            let offset = self.offset();
            if self.consume(TokenKind::Dot) {
                let fields = self.expect_ident()?;
                e = Expr::Swizzle {
                    base: Box::new(e),
                    fields,
                    offset,
                };
                continue;
            }

            if self.consume(TokenKind::LParen) {
                let func = match e {
                    Expr::Ident { name, .. } => name,
                    _ => {
                        return Err(ShaderError::new(
                            offset,
                            "call target must be an identifier",
                        ));
                    }
                };
                let args = self.parse_args()?;
                e = Expr::Call { func, args, offset };
                continue;
            }

            break;
        }

        Ok(e)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ShaderError> {
        let mut args = Vec::new();
        if self.consume(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.consume(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen)?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ShaderError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Number(v) => Ok(Expr::Lit(Lit::Num(v))),
            TokenKind::True => Ok(Expr::Lit(Lit::Bool(true))),
            TokenKind::False => Ok(Expr::Lit(Lit::Bool(false))),
            TokenKind::Ident(name) => Ok(Expr::Ident {
                name,
                offset: t.span.start,
            }),
            TokenKind::LParen => {
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            other => Err(ShaderError::new(
                t.span.start,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}
