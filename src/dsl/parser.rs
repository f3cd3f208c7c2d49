use super::ast::*;
use super::lexer::{LexError, Lexer, Token};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Unexpected token: {0:?}, expected {1}")]
    Unexpected(Token, &'static str),
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("Duplicate property {property} in entity {entity}")]
    DuplicateProperty { entity: String, property: String },
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> &Token {
        let tok = self.tokens.get(self.pos).unwrap_or(&Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance().clone() {
            Token::Ident(s) => Ok(s),
            tok => Err(ParseError::Unexpected(tok, "identifier")),
        }
    }

    /// Identifier, or a quoted string for names that are not identifiers.
    fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.advance().clone() {
            Token::Ident(s) | Token::Str(s) => Ok(s),
            tok => Err(ParseError::Unexpected(tok, "name")),
        }
    }

    fn expect_str(&mut self) -> Result<String, ParseError> {
        match self.advance().clone() {
            Token::Str(s) => Ok(s),
            tok => Err(ParseError::Unexpected(tok, "string")),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        let tok = self.advance().clone();
        if tok == expected {
            Ok(())
        } else {
            Err(ParseError::Unexpected(tok, "specific token"))
        }
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == name)
    }

    pub fn parse(&mut self) -> Result<Document, ParseError> {
        let mut entities: Vec<Entity> = Vec::new();

        while *self.peek() != Token::Eof {
            if self.check_ident("entity") {
                self.advance();
                let entity = self.parse_entity()?;
                if entities.iter().any(|e| e.name == entity.name) {
                    return Err(ParseError::DuplicateEntity(entity.name));
                }
                entities.push(entity);
            } else {
                return Err(ParseError::Unexpected(self.peek().clone(), "entity"));
            }
        }

        Ok(Document { entities })
    }

    fn parse_entity(&mut self) -> Result<Entity, ParseError> {
        let name = self.expect_name()?;
        self.expect(Token::LBrace)?;

        let mut columns = Vec::new();
        let mut hints = Vec::new();
        let mut seen = HashSet::new();

        while *self.peek() != Token::RBrace {
            if *self.peek() == Token::At {
                hints.push(self.parse_hint()?);
            } else {
                let column = self.parse_column()?;
                if !seen.insert(column.name.clone()) {
                    return Err(ParseError::DuplicateProperty {
                        entity: name,
                        property: column.name,
                    });
                }
                columns.push(column);
            }
        }

        self.expect(Token::RBrace)?;

        Ok(Entity {
            name,
            columns,
            hints,
        })
    }

    fn parse_column(&mut self) -> Result<Column, ParseError> {
        let name = self.expect_name()?;
        let typ = self.parse_type()?;
        let mut modifiers = Vec::new();

        loop {
            if self.check_ident("pk") {
                self.advance();
                modifiers.push(ColumnModifier::Pk);
            } else if self.check_ident("not") {
                self.advance();
                if !self.check_ident("null") {
                    return Err(ParseError::Unexpected(self.peek().clone(), "null"));
                }
                self.advance();
                modifiers.push(ColumnModifier::NotNull);
            } else if self.check_ident("null") {
                self.advance();
                modifiers.push(ColumnModifier::Null);
            } else if self.check_ident("unique") {
                self.advance();
                modifiers.push(ColumnModifier::Unique);
            } else if self.check_ident("index") {
                self.advance();
                modifiers.push(ColumnModifier::Index);
            } else if self.check_ident("increment") {
                self.advance();
                modifiers.push(ColumnModifier::Increment);
            } else if self.check_ident("default") {
                self.advance();
                let val = self.parse_default_value()?;
                modifiers.push(ColumnModifier::Default(val));
            } else if self.check_ident("map") {
                self.advance();
                modifiers.push(ColumnModifier::Map(self.expect_str()?));
            } else if self.check_ident("collate") {
                self.advance();
                modifiers.push(ColumnModifier::Collate(self.expect_str()?));
            } else if self.check_ident("doc") {
                self.advance();
                modifiers.push(ColumnModifier::Doc(self.expect_str()?));
            } else if self.check_ident("fk") {
                self.advance();
                modifiers.push(ColumnModifier::Fk(self.parse_foreign_key()?));
            } else {
                break;
            }
        }

        Ok(Column {
            name,
            typ,
            modifiers,
        })
    }

    fn parse_type(&mut self) -> Result<TypeRef, ParseError> {
        let name = self.expect_ident()?;
        let mut args = Vec::new();
        if *self.peek() == Token::LParen {
            self.advance();
            loop {
                match self.advance().clone() {
                    Token::Num(n) => args.push(n),
                    tok => return Err(ParseError::Unexpected(tok, "type argument")),
                }
                match self.advance().clone() {
                    Token::Comma => continue,
                    Token::RParen => break,
                    tok => return Err(ParseError::Unexpected(tok, ", or )")),
                }
            }
        }
        Ok(TypeRef { name, args })
    }

    fn parse_default_value(&mut self) -> Result<Literal, ParseError> {
        match self.advance().clone() {
            Token::Ident(s) => {
                // Check for function call: IDENT()
                if *self.peek() == Token::LParen {
                    self.advance(); // consume (
                    let mut args = String::new();
                    // Parse arguments until )
                    loop {
                        match self.peek() {
                            Token::RParen => {
                                self.advance();
                                break;
                            }
                            Token::Eof => {
                                return Err(ParseError::Unexpected(Token::Eof, ")"));
                            }
                            _ => {
                                let tok = self.advance().clone();
                                match tok {
                                    Token::Ident(a) => args.push_str(&a),
                                    Token::Num(n) => args.push_str(&n.to_string()),
                                    Token::Decimal(n) => args.push_str(&n.to_string()),
                                    Token::Str(st) => {
                                        args.push('"');
                                        args.push_str(&st);
                                        args.push('"');
                                    }
                                    Token::Comma => args.push_str(", "),
                                    _ => {}
                                }
                            }
                        }
                    }
                    Ok(Literal::Ident(format!("{}({})", s, args)))
                } else {
                    Ok(Literal::Ident(s))
                }
            }
            Token::Str(s) => Ok(Literal::Str(s)),
            Token::Num(n) => Ok(Literal::Int(n)),
            Token::Decimal(n) => Ok(Literal::Decimal(n)),
            tok => Err(ParseError::Unexpected(tok, "default value")),
        }
    }

    fn parse_hint(&mut self) -> Result<Hint, ParseError> {
        self.expect(Token::At)?;
        let mut key = self.expect_ident()?;

        while *self.peek() == Token::Dot {
            self.advance();
            key.push('.');
            key.push_str(&self.expect_ident()?);
        }

        self.expect(Token::Eq)?;

        let value = match self.advance().clone() {
            Token::Num(n) => HintValue::Int(n),
            Token::Str(s) => HintValue::Str(s),
            Token::Ident(s) => HintValue::Ident(s),
            tok => return Err(ParseError::Unexpected(tok, "hint value")),
        };

        Ok(Hint { key, value })
    }

    /// `-> Target.column [options]`
    fn parse_foreign_key(&mut self) -> Result<ForeignKeyRef, ParseError> {
        self.expect(Token::Arrow)?;
        let target = self.expect_name()?;
        self.expect(Token::Dot)?;
        let column = self.expect_name()?;

        let mut options = Vec::new();
        if *self.peek() == Token::LBracket {
            self.advance();
            while *self.peek() != Token::RBracket {
                options.push(self.parse_fk_option()?);
                if *self.peek() == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(Token::RBracket)?;
        }

        Ok(ForeignKeyRef {
            target,
            column,
            options,
        })
    }

    fn parse_fk_option(&mut self) -> Result<FkOption, ParseError> {
        let key = self.expect_ident()?;
        if *self.peek() != Token::Eq {
            return Ok(FkOption::Kind(key));
        }
        self.advance();

        match key.as_str() {
            "on_delete" => Ok(FkOption::OnDelete(self.expect_ident()?)),
            "on_update" => Ok(FkOption::OnUpdate(self.expect_ident()?)),
            "through" => Ok(FkOption::Through(self.expect_name()?)),
            "join" | "inverse" => {
                let name = self.expect_name()?;
                self.expect(Token::Arrow)?;
                let referenced = self.expect_name()?;
                if key == "join" {
                    Ok(FkOption::JoinColumn { name, referenced })
                } else {
                    Ok(FkOption::InverseColumn { name, referenced })
                }
            }
            _ => Err(ParseError::Unexpected(
                Token::Ident(key),
                "on_delete, on_update, through, join or inverse",
            )),
        }
    }
}
