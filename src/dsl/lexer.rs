use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Num(i64),
    Decimal(f64),

    LBrace,   // {
    RBrace,   // }
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Eq,       // =
    At,       // @
    Dot,      // .
    Arrow,    // ->

    Eof,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character: {0}")]
    UnexpectedChar(char),
    #[error("Unterminated string")]
    UnterminatedString,
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('#') => {
                    while let Some(&c) = self.chars.peek() {
                        self.chars.next();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_ident(&mut self, first: char) -> String {
        let mut s = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn read_string(&mut self) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(s),
                Some('\\') => {
                    if let Some(c) = self.chars.next() {
                        match c {
                            'n' => s.push('\n'),
                            't' => s.push('\t'),
                            'r' => s.push('\r'),
                            _ => s.push(c),
                        }
                    }
                }
                Some(c) => s.push(c),
                None => return Err(LexError::UnterminatedString),
            }
        }
    }

    /// Integer or decimal literal; `first` may be a leading minus sign.
    fn read_number(&mut self, first: char) -> Result<Token, LexError> {
        let mut s = String::from(first);
        let mut decimal = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.chars.next();
            } else if c == '.' && !decimal {
                decimal = true;
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if !decimal {
            if let Ok(n) = s.parse() {
                return Ok(Token::Num(n));
            }
        }
        // Integers beyond i64 read as decimals.
        s.parse()
            .map(Token::Decimal)
            .map_err(|_| LexError::InvalidNumber(s))
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let c = match self.chars.next() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        let tok = match c {
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '=' => Token::Eq,
            '@' => Token::At,
            '.' => Token::Dot,
            '-' => match self.chars.peek() {
                Some('>') => {
                    self.chars.next();
                    Token::Arrow
                }
                Some(d) if d.is_ascii_digit() => self.read_number(c)?,
                _ => return Err(LexError::UnexpectedChar(c)),
            },
            '"' => Token::Str(self.read_string()?),
            c if c.is_ascii_digit() => self.read_number(c)?,
            c if c.is_alphabetic() || c == '_' => Token::Ident(self.read_ident(c)),
            _ => return Err(LexError::UnexpectedChar(c)),
        };

        Ok(tok)
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            if tok == Token::Eof {
                tokens.push(tok);
                break;
            }
            tokens.push(tok);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokens() {
        let tokens = Lexer::new("entity User { }").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("entity".into()),
                Token::Ident("User".into()),
                Token::LBrace,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unicode_ident() {
        let tokens = Lexer::new("entity ユーザー { 名前 string }").tokenize().unwrap();
        assert_eq!(tokens[1], Token::Ident("ユーザー".into()));
        assert_eq!(tokens[3], Token::Ident("名前".into()));
    }

    #[test]
    fn test_comments() {
        let input = "# comment\nentity User { # inline\n}";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("entity".into()),
                Token::Ident("User".into()),
                Token::LBrace,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = Lexer::new("255 -1 1.5 (10, 2)").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Num(255),
                Token::Num(-1),
                Token::Decimal(1.5),
                Token::LParen,
                Token::Num(10),
                Token::Comma,
                Token::Num(2),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_oversized_integer_is_decimal() {
        let tokens = Lexer::new("100000000000000000000").tokenize().unwrap();
        assert_eq!(tokens, vec![Token::Decimal(1e20), Token::Eof]);
    }

    #[test]
    fn test_symbols() {
        let tokens = Lexer::new("-> . = @ [ ]").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Arrow,
                Token::Dot,
                Token::Eq,
                Token::At,
                Token::LBracket,
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            Lexer::new("\"users").tokenize(),
            Err(LexError::UnterminatedString)
        );
    }
}
