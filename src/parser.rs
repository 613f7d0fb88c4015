use std::rc::Rc;

use crate::ast::{BinaryOp, Expression, Statement, Var};
use crate::error::{ControlKind, Error};
use crate::tokenizer::{Keyword, Token, TokenKind, TokenSource};

/// Recursive-descent parser. Each `next_statement` call consumes exactly one
/// statement from the token source, or reports end of input.
pub struct Parser {
    tokens: TokenSource,
    // unclosed ( and [ pairs; newlines are skipped while inside them
    depth: usize,
}

impl Parser {
    pub fn new(tokens: TokenSource) -> Self {
        Parser { tokens, depth: 0 }
    }

    /// Drops the rest of the current input line. Used by the REPL to recover
    /// after an error without misreading the remains of the bad line.
    pub fn reset_line(&mut self) {
        self.tokens.reset_line();
        self.depth = 0;
    }

    pub fn next_statement(&mut self) -> Result<Option<Statement>, Error> {
        let token = loop {
            let token = self.tokens.next()?;
            match token.kind {
                TokenKind::Newline | TokenKind::Semicolon => continue,
                TokenKind::Eof => return Ok(None),
                _ => break token,
            }
        };
        let stmt = self.statement(token)?;
        self.terminate_statement()?;
        Ok(Some(stmt))
    }

    // Fetches the next token, skipping newlines inside parentheses/brackets.
    fn next_token(&mut self) -> Result<Token, Error> {
        loop {
            let token = self.tokens.next()?;
            if self.depth > 0 && token.kind == TokenKind::Newline {
                continue;
            }
            return Ok(token);
        }
    }

    fn unexpected(&self, token: &Token, expecting: &str) -> Error {
        token
            .syntax_error(format!(
                "Unexpected token \"{}\". Expecting {}.",
                token.kind, expecting
            ))
            .into()
    }

    fn expect_variable(&mut self) -> Result<Var, Error> {
        let token = self.next_token()?;
        match &token.kind {
            TokenKind::Variable(name) => {
                let name: Rc<str> = name.as_str().into();
                Ok(Var { token, name })
            }
            _ => Err(self.unexpected(&token, "variable name")),
        }
    }

    fn expect(&mut self, kind: TokenKind, expecting: &str) -> Result<Token, Error> {
        let token = self.next_token()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.unexpected(&token, expecting))
        }
    }

    // A statement ends at a newline, `;`, `}`, or end of file. The closing
    // brace and eof also end the surrounding construct, so they go back.
    fn terminate_statement(&mut self) -> Result<(), Error> {
        let token = self.tokens.next()?;
        match token.kind {
            TokenKind::Newline | TokenKind::Semicolon => Ok(()),
            TokenKind::RightBrace | TokenKind::Eof => {
                self.tokens.push(token);
                Ok(())
            }
            _ => Err(self.unexpected(&token, "end of statement")),
        }
    }

    fn statement(&mut self, first: Token) -> Result<Statement, Error> {
        match &first.kind {
            TokenKind::Keyword(kw) => match kw {
                Keyword::If => self.if_statement(first),
                Keyword::Var => self.var_statement(first),
                Keyword::Loop => self.loop_statement(first),
                Keyword::While => self.while_statement(first),
                Keyword::Import => self.import_statement(first),
                Keyword::Unimport => self.unimport_statement(first),
                Keyword::Undefine => {
                    let vars = self.variable_list()?;
                    Ok(Statement::Undefine { token: first, vars })
                }
                Keyword::Export => {
                    let vars = self.variable_list()?;
                    Ok(Statement::Export { token: first, vars })
                }
                Keyword::Func => self.func_def(first),
                Keyword::Proc => self.proc_def(first),
                Keyword::Break => Ok(Statement::Control {
                    token: first,
                    kind: ControlKind::Break,
                }),
                Keyword::Next => Ok(Statement::Control {
                    token: first,
                    kind: ControlKind::Next,
                }),
                Keyword::Done => Ok(Statement::Control {
                    token: first,
                    kind: ControlKind::Done,
                }),
                Keyword::Return => {
                    let expr = self.expression()?;
                    Ok(Statement::Return { token: first, expr })
                }
                Keyword::Else | Keyword::WithPrefix => Err(self.unexpected(&first, "statement")),
            },
            TokenKind::Variable(name) => {
                let name: Rc<str> = name.as_str().into();
                let next = self.tokens.next()?;
                if next.kind == TokenKind::Equal {
                    let rhs = self.expression()?;
                    return Ok(Statement::Assignment {
                        token: first.clone(),
                        lhs: Var { token: first, name },
                        rhs,
                    });
                }
                self.tokens.push(next);
                let callee = Expression::Var(Var {
                    token: first.clone(),
                    name,
                });
                let args = self.call_arguments()?;
                Ok(Statement::ProcCall {
                    token: first,
                    proc: callee,
                    args,
                })
            }
            TokenKind::LeftParen => {
                self.depth += 1;
                let inner = self.expression()?;
                self.expect(TokenKind::RightParen, "')'")?;
                self.depth -= 1;
                let callee = self.postfix_suffixes(inner)?;
                let args = self.call_arguments()?;
                Ok(Statement::ProcCall {
                    token: first,
                    proc: callee,
                    args,
                })
            }
            _ => Err(self.unexpected(&first, "statement")),
        }
    }

    // { <statement>* } with newlines and semicolons between statements
    fn block(&mut self) -> Result<Vec<Statement>, Error> {
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut body = Vec::new();
        loop {
            let token = self.tokens.next()?;
            match token.kind {
                TokenKind::Newline | TokenKind::Semicolon => continue,
                TokenKind::RightBrace => return Ok(body),
                TokenKind::Eof => {
                    return Err(self.unexpected(&token, "statement or '}'"));
                }
                _ => {
                    body.push(self.statement(token)?);
                    self.terminate_statement()?;
                }
            }
        }
    }

    // if <expression> { <statement>* } [ else { <statement>* } ]
    fn if_statement(&mut self, start: Token) -> Result<Statement, Error> {
        let test = self.expression()?;
        let body = self.block()?;
        // else must follow the closing brace on the same line; peeking
        // across a newline would leave the REPL waiting for more input
        let next = self.tokens.next()?;
        let else_body = if next.kind == TokenKind::Keyword(Keyword::Else) {
            self.block()?
        } else {
            self.tokens.push(next);
            Vec::new()
        };
        Ok(Statement::If {
            token: start,
            test,
            body,
            else_body,
        })
    }

    // var <variable> [= <expression>] (, <variable> [= <expression>])*
    fn var_statement(&mut self, start: Token) -> Result<Statement, Error> {
        let mut vars = Vec::new();
        loop {
            let var = self.expect_variable()?;
            let next = self.tokens.next()?;
            let init = if next.kind == TokenKind::Equal {
                Some(self.expression()?)
            } else {
                self.tokens.push(next);
                None
            };
            vars.push((var, init));
            let next = self.tokens.next()?;
            if next.kind != TokenKind::Comma {
                self.tokens.push(next);
                return Ok(Statement::Var { token: start, vars });
            }
        }
    }

    // loop { ... } is while true { ... }
    fn loop_statement(&mut self, start: Token) -> Result<Statement, Error> {
        let body = self.block()?;
        Ok(Statement::While {
            token: start.clone(),
            test: Expression::Bool {
                token: start,
                value: true,
            },
            body,
        })
    }

    // while <expression> { <statement>* }
    fn while_statement(&mut self, start: Token) -> Result<Statement, Error> {
        let test = self.expression()?;
        let body = self.block()?;
        Ok(Statement::While {
            token: start,
            test,
            body,
        })
    }

    // import <string> [withprefix <variable>]
    fn import_statement(&mut self, start: Token) -> Result<Statement, Error> {
        let path = self.module_path()?;
        let next = self.tokens.next()?;
        let prefix = if next.kind == TokenKind::Keyword(Keyword::WithPrefix) {
            Some(self.expect_variable()?)
        } else {
            self.tokens.push(next);
            None
        };
        Ok(Statement::Import {
            token: start,
            path,
            prefix,
        })
    }

    // unimport <string>
    fn unimport_statement(&mut self, start: Token) -> Result<Statement, Error> {
        let path = self.module_path()?;
        Ok(Statement::Unimport { token: start, path })
    }

    fn module_path(&mut self) -> Result<String, Error> {
        let token = self.next_token()?;
        match &token.kind {
            TokenKind::Str(path) => Ok(path.clone()),
            _ => Err(self.unexpected(&token, "module path string")),
        }
    }

    // <variable> (, <variable>)*
    fn variable_list(&mut self) -> Result<Vec<Var>, Error> {
        let mut vars = vec![self.expect_variable()?];
        loop {
            let next = self.tokens.next()?;
            if next.kind != TokenKind::Comma {
                self.tokens.push(next);
                return Ok(vars);
            }
            vars.push(self.expect_variable()?);
        }
    }

    // func <variable> ( [<variable> (, <variable>)*] ) { <statement>* }
    fn func_def(&mut self, start: Token) -> Result<Statement, Error> {
        let name = self.expect_variable()?;
        self.expect(TokenKind::LeftParen, "'('")?;
        self.depth += 1;
        let mut params = Vec::new();
        let next = self.next_token()?;
        if next.kind != TokenKind::RightParen {
            self.tokens.push(next);
            loop {
                params.push(self.expect_variable()?);
                let next = self.next_token()?;
                match next.kind {
                    TokenKind::Comma => continue,
                    TokenKind::RightParen => break,
                    _ => return Err(self.unexpected(&next, "',' or ')'")),
                }
            }
        }
        self.depth -= 1;
        let body = Rc::new(self.block()?);
        Ok(Statement::FuncDef {
            token: start,
            name,
            params,
            body,
        })
    }

    // proc <variable> [<variable> (, <variable>)*] { <statement>* }
    fn proc_def(&mut self, start: Token) -> Result<Statement, Error> {
        let name = self.expect_variable()?;
        let mut params = Vec::new();
        loop {
            let next = self.tokens.next()?;
            match next.kind {
                TokenKind::LeftBrace => {
                    self.tokens.push(next);
                    break;
                }
                TokenKind::Variable(_) => {
                    self.tokens.push(next);
                    params.push(self.expect_variable()?);
                    let sep = self.tokens.next()?;
                    match sep.kind {
                        TokenKind::Comma => continue,
                        TokenKind::LeftBrace => {
                            self.tokens.push(sep);
                            break;
                        }
                        _ => return Err(self.unexpected(&sep, "',' or '{'")),
                    }
                }
                _ => return Err(self.unexpected(&next, "parameter name or '{'")),
            }
        }
        let body = Rc::new(self.block()?);
        Ok(Statement::ProcDef {
            token: start,
            name,
            params,
            body,
        })
    }

    // Arguments of a proc-call statement: everything up to the statement
    // terminator, comma-separated. Zero arguments is legal.
    fn call_arguments(&mut self) -> Result<Vec<Expression>, Error> {
        let next = self.tokens.next()?;
        match next.kind {
            TokenKind::Newline
            | TokenKind::Semicolon
            | TokenKind::RightBrace
            | TokenKind::Eof => {
                self.tokens.push(next);
                return Ok(Vec::new());
            }
            _ => self.tokens.push(next),
        }
        let mut args = vec![self.expression()?];
        loop {
            let next = self.tokens.next()?;
            if next.kind != TokenKind::Comma {
                self.tokens.push(next);
                return Ok(args);
            }
            args.push(self.expression()?);
        }
    }

    pub fn expression(&mut self) -> Result<Expression, Error> {
        self.logic()
    }

    fn binary(
        &mut self,
        next_level: fn(&mut Self) -> Result<Expression, Error>,
        operator: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expression, Error> {
        let mut expr = next_level(self)?;
        loop {
            let token = self.next_token()?;
            let op = match operator(&token.kind) {
                Some(op) => op,
                None => {
                    self.tokens.push(token);
                    return Ok(expr);
                }
            };
            let right = next_level(self)?;
            expr = Expression::Op {
                token,
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
    }

    fn logic(&mut self) -> Result<Expression, Error> {
        self.binary(Self::comparison, |kind| match kind {
            TokenKind::And => Some(BinaryOp::And),
            TokenKind::Or => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expression, Error> {
        self.binary(Self::term, |kind| match kind {
            TokenKind::EqualEqual => Some(BinaryOp::Equal),
            TokenKind::BangEqual => Some(BinaryOp::NotEqual),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::LessEqual => Some(BinaryOp::LessEqual),
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
            _ => None,
        })
    }

    fn term(&mut self) -> Result<Expression, Error> {
        self.binary(Self::factor, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Plus),
            TokenKind::Minus => Some(BinaryOp::Minus),
            _ => None,
        })
    }

    fn factor(&mut self) -> Result<Expression, Error> {
        self.binary(Self::unary, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Multiply),
            TokenKind::Slash => Some(BinaryOp::Divide),
            TokenKind::Percent => Some(BinaryOp::Modulo),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expression, Error> {
        let token = self.next_token()?;
        match token.kind {
            TokenKind::Minus => Ok(Expression::Negative {
                token,
                expr: Box::new(self.unary()?),
            }),
            TokenKind::Not => Ok(Expression::Not {
                token,
                expr: Box::new(self.unary()?),
            }),
            _ => {
                self.tokens.push(token);
                let atom = self.atom()?;
                self.postfix_suffixes(atom)
            }
        }
    }

    // <expr>[<expr>] and <expr>(<args>), left-associative
    fn postfix_suffixes(&mut self, mut expr: Expression) -> Result<Expression, Error> {
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::LeftBracket => {
                    self.depth += 1;
                    let index = self.expression()?;
                    self.expect(TokenKind::RightBracket, "']'")?;
                    self.depth -= 1;
                    expr = Expression::Index {
                        token,
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::LeftParen => {
                    self.depth += 1;
                    let mut args = Vec::new();
                    let next = self.next_token()?;
                    if next.kind != TokenKind::RightParen {
                        self.tokens.push(next);
                        loop {
                            args.push(self.expression()?);
                            let next = self.next_token()?;
                            match next.kind {
                                TokenKind::Comma => continue,
                                TokenKind::RightParen => break,
                                _ => return Err(self.unexpected(&next, "',' or ')'")),
                            }
                        }
                    }
                    self.depth -= 1;
                    expr = Expression::FuncCall {
                        token,
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => {
                    self.tokens.push(token);
                    return Ok(expr);
                }
            }
        }
    }

    fn atom(&mut self) -> Result<Expression, Error> {
        let token = self.next_token()?;
        match &token.kind {
            TokenKind::Number(value) => {
                let value = Rc::new(value.clone());
                Ok(Expression::Number { token, value })
            }
            TokenKind::Str(value) => {
                let value: Rc<str> = value.as_str().into();
                Ok(Expression::Str { token, value })
            }
            TokenKind::Bool(value) => {
                let value = *value;
                Ok(Expression::Bool { token, value })
            }
            TokenKind::Variable(name) => {
                let name: Rc<str> = name.as_str().into();
                Ok(Expression::Var(Var { token, name }))
            }
            TokenKind::LeftParen => {
                self.depth += 1;
                let inner = self.expression()?;
                self.expect(TokenKind::RightParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => Err(self.unexpected(&token, "expression")),
        }
    }
}
