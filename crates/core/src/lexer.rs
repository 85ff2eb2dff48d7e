use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifiers and keywords — distinguished in the parser
    Word(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    /// Numeric literal, kept as written so the evaluator parses it exactly
    Number(String),
    LParen,
    RParen,
    Comma,
    Dot,
    // Assignment (actions only)
    Assign,
    // Comparison operators
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    // Arithmetic operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // Logical operators
    AndAnd,
    OrOr,
    Bang,
    // End of input
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0usize;

    let next_is = |pos: usize, want: char| pos + 1 < chars.len() && chars[pos + 1] == want;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let tok_pos = pos;

        // String literal, either quote style
        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut s = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(SyntaxError::new(
                        src,
                        tok_pos,
                        "unterminated string literal",
                    ));
                }
                let sc = chars[pos];
                if sc == quote {
                    pos += 1;
                    break;
                }
                if sc == '\\' {
                    pos += 1;
                    if pos >= chars.len() {
                        return Err(SyntaxError::new(
                            src,
                            tok_pos,
                            "unterminated escape in string",
                        ));
                    }
                    match chars[pos] {
                        '"' => s.push('"'),
                        '\'' => s.push('\''),
                        '\\' => s.push('\\'),
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        other => {
                            s.push('\\');
                            s.push(other);
                        }
                    }
                    pos += 1;
                    continue;
                }
                s.push(sc);
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                pos: tok_pos,
            });
            continue;
        }

        // Number. A leading '-' is always a separate Minus token; the parser
        // folds it into a unary negation.
        if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos < chars.len()
                && chars[pos] == '.'
                && pos + 1 < chars.len()
                && chars[pos + 1].is_ascii_digit()
            {
                pos += 1; // consume '.'
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            let s: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Number(s),
                pos: tok_pos,
            });
            continue;
        }

        let (token, width) = match c {
            '=' if next_is(pos, '=') => (Token::Eq, 2),
            '=' => (Token::Assign, 1),
            '!' if next_is(pos, '=') => (Token::Neq, 2),
            '!' => (Token::Bang, 1),
            '<' if next_is(pos, '=') => (Token::Lte, 2),
            '<' => (Token::Lt, 1),
            '>' if next_is(pos, '=') => (Token::Gte, 2),
            '>' => (Token::Gt, 1),
            '&' if next_is(pos, '&') => (Token::AndAnd, 2),
            '|' if next_is(pos, '|') => (Token::OrOr, 2),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            '.' => (Token::Dot, 1),
            _ => (Token::Eof, 0),
        };
        if width > 0 {
            tokens.push(Spanned {
                token,
                pos: tok_pos,
            });
            pos += width;
            continue;
        }

        // Identifier / keyword
        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Word(word),
                pos: tok_pos,
            });
            continue;
        }

        return Err(SyntaxError::new(
            src,
            tok_pos,
            format!("unexpected character '{}'", c),
        ));
    }

    tokens.push(Spanned {
        token: Token::Eof,
        pos: chars.len(),
    });
    Ok(tokens)
}
