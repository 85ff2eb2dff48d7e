//! Recursive-descent parser for rule conditions and action statements.
//!
//! Precedence, loosest first: `||`/`or`, `&&`/`and`, `!`/`not`,
//! comparison (non-associative), `+ -`, `* / %`, unary `-`, method call.

use crate::ast::{ArithOp, Assignment, CompareOp, Expr, Literal};
use crate::error::SyntaxError;
use crate::lexer::{lex, Spanned, Token};

/// Compile a condition or value expression.
pub fn parse_expr(src: &str) -> Result<Expr, SyntaxError> {
    let tokens = lex(src)?;
    let mut p = Parser::new(&tokens, src);
    let e = p.parse_expr()?;
    p.expect_eof()?;
    Ok(e)
}

/// Compile an action statement of the form `variable = expression`.
pub fn parse_assignment(src: &str) -> Result<Assignment, SyntaxError> {
    let tokens = lex(src)?;
    let mut p = Parser::new(&tokens, src);
    let target = p.take_word()?;
    if p.peek() != &Token::Assign {
        return Err(p.err(format!(
            "expected '=' after assignment target, got {:?}",
            p.peek()
        )));
    }
    p.advance();
    let value = p.parse_expr()?;
    p.expect_eof()?;
    Ok(Assignment { target, value })
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], src: &'a str) -> Self {
        Parser {
            tokens,
            pos: 0,
            src,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn advance(&mut self) -> &Spanned {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.src, self.cur().pos, msg)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), Token::Word(x) if x == w)
    }

    fn take_word(&mut self) -> Result<String, SyntaxError> {
        if let Token::Word(w) = self.peek().clone() {
            self.advance();
            Ok(w)
        } else {
            Err(self.err(format!("expected identifier, got {:?}", self.peek())))
        }
    }

    fn expect_rparen(&mut self) -> Result<(), SyntaxError> {
        if self.peek() == &Token::RParen {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected ')', got {:?}", self.peek())))
        }
    }

    fn expect_eof(&self) -> Result<(), SyntaxError> {
        if self.peek() == &Token::Eof {
            Ok(())
        } else {
            Err(self.err(format!("unexpected trailing {:?}", self.peek())))
        }
    }

    // -- Expression parsing --------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and_expr()?;
        while self.peek() == &Token::OrOr || self.is_word("or") {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary_expr()?;
        while self.peek() == &Token::AndAnd || self.is_word("and") {
            self.advance();
            let right = self.parse_unary_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.peek() == &Token::Bang || self.is_word("not") {
            self.advance();
            let e = self.parse_unary_expr()?;
            return Ok(Expr::Not(Box::new(e)));
        }
        self.parse_compare_expr()
    }

    fn parse_compare_expr(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Token::Eq => CompareOp::Eq,
            Token::Neq => CompareOp::Neq,
            Token::Lt => CompareOp::Lt,
            Token::Lte => CompareOp::Lte,
            Token::Gt => CompareOp::Gt,
            Token::Gte => CompareOp::Gte,
            Token::Assign => {
                return Err(self.err("'=' is assignment; use '==' to compare"));
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_negation()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::Percent => ArithOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_negation()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_negation(&mut self) -> Result<Expr, SyntaxError> {
        if self.peek() == &Token::Minus {
            self.advance();
            // Fold "-<number>" into a literal so "-1" compares like "1" does.
            if let Token::Number(n) = self.peek().clone() {
                if !matches!(self.tokens.get(self.pos + 1).map(|s| &s.token), Some(Token::Dot)) {
                    self.advance();
                    return Ok(Expr::Literal(Literal::Number(format!("-{}", n))));
                }
            }
            let e = self.parse_negation()?;
            return Ok(Expr::Neg(Box::new(e)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut e = self.parse_primary()?;
        while self.peek() == &Token::Dot {
            self.advance();
            let method = self.take_word()?;
            if self.peek() != &Token::LParen {
                return Err(self.err(format!(
                    "expected '(' after method '{}', got {:?}",
                    method,
                    self.peek()
                )));
            }
            self.advance();
            let mut args = Vec::new();
            if self.peek() != &Token::RParen {
                loop {
                    args.push(self.parse_expr()?);
                    if self.peek() == &Token::Comma {
                        self.advance();
                        continue;
                    }
                    break;
                }
            }
            self.expect_rparen()?;
            e = Expr::Call {
                receiver: Box::new(e),
                method,
                args,
            };
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().clone() {
            Token::Word(w) if w == "true" => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Token::Word(w) if w == "false" => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Token::Word(w) if matches!(w.as_str(), "and" | "or" | "not") => {
                Err(self.err(format!("unexpected keyword '{}'", w)))
            }
            Token::Word(w) => {
                self.advance();
                Ok(Expr::Var(w))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Text(s)))
            }
            Token::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect_rparen()?;
                Ok(e)
            }
            Token::Eof => Err(self.err("unexpected end of expression")),
            other => Err(self.err(format!("expected term, got {:?}", other))),
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.to_string()))
    }

    fn num(n: &str) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Number(n.to_string())))
    }

    #[test]
    fn parse_method_call() {
        let e = parse_expr("step1_first_Name.equalsIgnoreCase('Doe')").unwrap();
        assert_eq!(
            e,
            Expr::Call {
                receiver: var("step1_first_Name"),
                method: "equalsIgnoreCase".to_string(),
                args: vec![Expr::Literal(Literal::Text("Doe".to_string()))],
            }
        );
    }

    #[test]
    fn parse_precedence_and_binds_tighter_than_or() {
        let e = parse_expr("a || b && c").unwrap();
        assert_eq!(
            e,
            Expr::Or(var("a"), Box::new(Expr::And(var("b"), var("c"))))
        );
    }

    #[test]
    fn parse_word_operators() {
        let e = parse_expr("not a and b or c").unwrap();
        assert_eq!(
            e,
            Expr::Or(
                Box::new(Expr::And(Box::new(Expr::Not(var("a"))), var("b"))),
                var("c")
            )
        );
    }

    #[test]
    fn parse_arithmetic_precedence() {
        let e = parse_expr("a + b * 2 > 10").unwrap();
        assert_eq!(
            e,
            Expr::Compare {
                op: CompareOp::Gt,
                left: Box::new(Expr::Arith {
                    op: ArithOp::Add,
                    left: var("a"),
                    right: Box::new(Expr::Arith {
                        op: ArithOp::Mul,
                        left: var("b"),
                        right: num("2"),
                    }),
                }),
                right: num("10"),
            }
        );
    }

    #[test]
    fn parse_negative_literal() {
        let e = parse_expr("x >= -1.5").unwrap();
        assert_eq!(
            e,
            Expr::Compare {
                op: CompareOp::Gte,
                left: var("x"),
                right: num("-1.5"),
            }
        );
    }

    #[test]
    fn parse_negated_variable() {
        let e = parse_expr("-x").unwrap();
        assert_eq!(e, Expr::Neg(var("x")));
    }

    #[test]
    fn parse_assignment_statement() {
        let a = parse_assignment(" calculation = 1").unwrap();
        assert_eq!(a.target, "calculation");
        assert_eq!(a.value, Expr::Literal(Literal::Number("1".to_string())));
    }

    #[test]
    fn parse_assignment_with_expression() {
        let a = parse_assignment("bmi = weight / (height * height)").unwrap();
        assert_eq!(a.target, "bmi");
        assert_eq!(a.value.variables(), vec!["weight", "height"]);
    }

    #[test]
    fn parse_assignment_requires_target() {
        let err = parse_assignment("= 1").unwrap_err();
        assert!(err.message.contains("expected identifier"));
    }

    #[test]
    fn parse_single_equals_in_condition_rejected() {
        let err = parse_expr("a = 1").unwrap_err();
        assert!(err.message.contains("use '=='"));
    }

    #[test]
    fn parse_trailing_tokens_rejected() {
        let err = parse_expr("a == 1 2").unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn parse_empty_rejected() {
        let err = parse_expr("   ").unwrap_err();
        assert!(err.message.contains("unexpected end"));
    }

    #[test]
    fn parse_no_arg_method() {
        let e = parse_expr("!name.isEmpty()").unwrap();
        assert_eq!(
            e,
            Expr::Not(Box::new(Expr::Call {
                receiver: var("name"),
                method: "isEmpty".to_string(),
                args: vec![],
            }))
        );
    }

    #[test]
    fn parse_is_deterministic() {
        let src = "(a == 'x' || b != 2) && c.contains(\"y\")";
        assert_eq!(parse_expr(src).unwrap(), parse_expr(src).unwrap());
    }
}
