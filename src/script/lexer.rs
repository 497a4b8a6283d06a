use std::fmt;

use num_bigint::BigInt;

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Int(BigInt),
    Str(String),
    // Keywords
    Fn,
    Let,
    If,
    Else,
    While,
    Return,
    Assert,
    Fail,
    True,
    False,
    None,
    Concrete,
    Symbolic,
    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Semi,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Ident(name) => return write!(f, "`{}`", name),
            Token::Int(n) => return write!(f, "`{}`", n),
            Token::Str(s) => return write!(f, "{:?}", s),
            Token::Fn => "fn",
            Token::Let => "let",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Return => "return",
            Token::Assert => "assert",
            Token::Fail => "fail",
            Token::True => "true",
            Token::False => "false",
            Token::None => "none",
            Token::Concrete => "concrete",
            Token::Symbolic => "symbolic",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Semi => ";",
            Token::Assign => "=",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
        };
        write!(f, "`{}`", s)
    }
}

/// A token and the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "fn" => Token::Fn,
        "let" => Token::Let,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "return" => Token::Return,
        "assert" => Token::Assert,
        "fail" => Token::Fail,
        "true" => Token::True,
        "false" => Token::False,
        "none" => Token::None,
        "concrete" => Token::Concrete,
        "symbolic" => Token::Symbolic,
        _ => return None,
    })
}

/// Splits `src` into tokens. `//` starts a comment running to the end of the line.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        if c == '\n' {
            line += 1;
            chars.next();
            continue;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let start = line;
        let token = if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '_' {
                    if d != '_' {
                        digits.push(d);
                    }
                    chars.next();
                } else {
                    break;
                }
            }
            let n = digits
                .parse::<BigInt>()
                .map_err(|_| SyntaxError::new(start, format!("invalid integer `{}`", digits)))?;
            Token::Int(n)
        } else if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    word.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            keyword(&word).unwrap_or(Token::Ident(word))
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    None => return Err(SyntaxError::new(start, "unterminated string")),
                    Some('"') => break,
                    Some('\n') => return Err(SyntaxError::new(start, "newline in string")),
                    Some('\\') => match chars.next() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('\\') => s.push('\\'),
                        Some('"') => s.push('"'),
                        Some(other) => return Err(SyntaxError::new(line, format!("unknown escape `\\{}`", other))),
                        None => return Err(SyntaxError::new(start, "unterminated string")),
                    },
                    Some(other) => s.push(other),
                }
            }
            Token::Str(s)
        } else {
            chars.next();
            let next = chars.peek().copied();
            if c == '/' && next == Some('/') {
                while chars.peek().map_or(false, |&d| d != '\n') {
                    chars.next();
                }
                continue;
            }
            let pair = match (c, next) {
                ('=', Some('=')) => Some(Token::Eq),
                ('!', Some('=')) => Some(Token::Ne),
                ('<', Some('=')) => Some(Token::Le),
                ('>', Some('=')) => Some(Token::Ge),
                ('&', Some('&')) => Some(Token::AndAnd),
                ('|', Some('|')) => Some(Token::OrOr),
                _ => None,
            };
            if let Some(t) = pair {
                chars.next();
                tokens.push(Spanned { token: t, line: start });
                continue;
            }
            match c {
                '{' => Token::LBrace,
                '}' => Token::RBrace,
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                ';' => Token::Semi,
                '=' => Token::Assign,
                '<' => Token::Lt,
                '>' => Token::Gt,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '!' => Token::Bang,
                _ => return Err(SyntaxError::new(start, format!("unexpected character `{}`", c))),
            }
        };
        tokens.push(Spanned { token, line: start });
    }

    Ok(tokens)
}
