use crate::ast::{
    Argument, BinaryOp, Expr, FunctionDecl, Literal, Parameter, Program, Stmt, UnaryOp,
};
use crate::tokenizer::{Position, Token, TokenKind, Tokenizer};
use std::sync::Arc;

/// Parser error types
#[derive(Debug, Clone)]
pub enum ParseError {
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        position: Position,
    },
    UnexpectedEndOfInput {
        expected: String,
        position: Position,
    },
    InvalidSyntax {
        message: String,
        position: Position,
    },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnexpectedToken {
                expected,
                found,
                position,
            } => {
                write!(
                    f,
                    "Expected {} but found {:?} at line {}, column {}",
                    expected, found, position.line, position.column
                )
            }
            ParseError::UnexpectedEndOfInput { expected, position } => {
                write!(
                    f,
                    "Unexpected end of input, expected {} at line {}, column {}",
                    expected, position.line, position.column
                )
            }
            ParseError::InvalidSyntax { message, position } => {
                write!(
                    f,
                    "Invalid syntax: {} at line {}, column {}",
                    message, position.line, position.column
                )
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Tokenizes and parses a complete source text.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let tokens = Tokenizer::new(source)
        .tokenize()
        .map_err(|message| ParseError::InvalidSyntax {
            message,
            position: Position::new(1, 1, 0),
        })?;
    Parser::with_source(tokens, source).parse()
}

/// Recursive descent parser for SolvraScript
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    source: Vec<char>,
    // One entry per function body being parsed; set when that body yields.
    generator_flags: Vec<bool>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_source(tokens, "")
    }

    /// Parser that can also recover declaration text from `source`.
    pub fn with_source(tokens: Vec<Token>, source: &str) -> Self {
        Self {
            tokens,
            current: 0,
            source: source.chars().collect(),
            generator_flags: Vec::new(),
        }
    }

    /// Parse a complete SolvraScript program
    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let position = self.current_position();
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }

        Ok(Program::new(statements, position))
    }

    /// Parse a single statement
    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match &self.peek().kind {
            TokenKind::Let => self.parse_variable_declaration(),
            TokenKind::At | TokenKind::Fn => self.parse_function_declaration(),
            TokenKind::Import => self.parse_import_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Yield => self.parse_yield_statement(),
            TokenKind::Break => {
                let position = self.current_position();
                self.advance();
                self.consume_statement_terminator()?;
                Ok(Stmt::Break { position })
            }
            TokenKind::Continue => {
                let position = self.current_position();
                self.advance();
                self.consume_statement_terminator()?;
                Ok(Stmt::Continue { position })
            }
            TokenKind::LeftBrace => self.parse_block_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    /// Parse variable declaration: `let name [= value];`
    fn parse_variable_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Let, "Expected 'let'")?;
        let name = self.consume_identifier("Expected variable name")?;

        let initializer = if self.check(&TokenKind::Equal) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_statement_terminator()?;

        Ok(Stmt::Let {
            name,
            initializer,
            position,
        })
    }

    /// Parse function declaration: `[@decorator ...] fn name(params) { body }`
    fn parse_function_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        let start_offset = position.offset;

        let mut decorators = Vec::new();
        while self.check(&TokenKind::At) {
            self.advance();
            decorators.push(self.parse_call()?);
        }

        self.consume(&TokenKind::Fn, "Expected 'fn'")?;
        let name = self.consume_identifier("Expected function name")?;

        self.consume(&TokenKind::LeftParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let param_position = self.current_position();
            let param_name = self.consume_identifier("Expected parameter name")?;
            let default_value = if self.check(&TokenKind::Equal) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(Parameter {
                name: param_name,
                default_value,
                position: param_position,
            });
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.consume(&TokenKind::RightParen, "Expected ')' after parameters")?;

        let nested = !self.generator_flags.is_empty();
        self.generator_flags.push(false);
        let body = self.parse_block();
        let is_generator = self.generator_flags.pop().unwrap_or(false);
        let body = body?;

        let end_offset = self.previous_end_offset();
        let source = self.slice_source(start_offset, end_offset);

        Ok(Stmt::FunctionDecl {
            decl: Arc::new(FunctionDecl {
                name,
                params,
                body,
                decorators,
                is_generator,
                nested,
                source,
                position,
            }),
        })
    }

    /// Parse import declaration: `import name;`
    fn parse_import_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Import, "Expected 'import'")?;
        let module = self.consume_identifier("Expected module name after 'import'")?;
        self.consume_statement_terminator()?;
        Ok(Stmt::Import { module, position })
    }

    /// Parse if statement: `if condition { body } [else if ... | else { body }]`
    fn parse_if_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::If, "Expected 'if'")?;

        let condition = self.parse_expression()?;
        let then_branch = self.parse_block()?;

        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            if self.check(&TokenKind::If) {
                Some(vec![self.parse_if_statement()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            position,
        })
    }

    /// Parse while statement: `while condition { body }`
    fn parse_while_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::While, "Expected 'while'")?;

        let condition = self.parse_expression()?;
        let body = self.parse_block()?;

        Ok(Stmt::While {
            condition,
            body,
            position,
        })
    }

    /// Parse for statement: `for variable in iterable { body }`
    fn parse_for_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::For, "Expected 'for'")?;

        let variable = self.consume_identifier("Expected variable name")?;
        self.consume(&TokenKind::In, "Expected 'in' after for variable")?;

        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;

        Ok(Stmt::For {
            variable,
            iterable,
            body,
            position,
        })
    }

    /// Parse return statement: `return [expression];`
    fn parse_return_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Return, "Expected 'return'")?;

        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_statement_terminator()?;

        Ok(Stmt::Return { value, position })
    }

    /// Parse yield statement: `yield expression;`
    fn parse_yield_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Yield, "Expected 'yield'")?;

        match self.generator_flags.last_mut() {
            Some(flag) => *flag = true,
            None => {
                return Err(ParseError::InvalidSyntax {
                    message: "'yield' outside of a function".to_string(),
                    position,
                });
            }
        }

        let value = self.parse_expression()?;
        self.consume_statement_terminator()?;
        Ok(Stmt::Yield { value, position })
    }

    fn parse_block_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        let statements = self.parse_block()?;
        Ok(Stmt::Block {
            statements,
            position,
        })
    }

    /// Parse `{ statements }`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.consume(&TokenKind::LeftBrace, "Expected '{'")?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedEndOfInput {
                    expected: "'}'".to_string(),
                    position: self.current_position(),
                });
            }
            statements.push(self.parse_statement()?);
        }

        self.consume(&TokenKind::RightBrace, "Expected '}'")?;
        Ok(statements)
    }

    /// Parse expression statement or assignment: `expression;` / `target = value;`
    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expression()?;
        let position = expr.position().clone();

        if self.check(&TokenKind::Equal) {
            let equal_position = self.current_position();
            self.advance();
            if !matches!(
                expr,
                Expr::Identifier { .. } | Expr::Index { .. } | Expr::Member { .. }
            ) {
                return Err(ParseError::InvalidSyntax {
                    message: "Invalid assignment target".to_string(),
                    position: equal_position,
                });
            }
            let value = self.parse_expression()?;
            self.consume_statement_terminator()?;
            return Ok(Stmt::Assign {
                target: expr,
                value,
                position,
            });
        }

        self.consume_statement_terminator()?;
        Ok(Stmt::Expression { expr, position })
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical_or()
    }

    /// Parse logical OR expression: left || right
    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_logical_and()?;

        while self.check(&TokenKind::Or) {
            let position = self.current_position();
            self.advance();
            let right = self.parse_logical_and()?;
            expr = Expr::binary(expr, BinaryOp::Or, right, position);
        }

        Ok(expr)
    }

    /// Parse logical AND expression: left && right
    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_equality()?;

        while self.check(&TokenKind::And) {
            let position = self.current_position();
            self.advance();
            let right = self.parse_equality()?;
            expr = Expr::binary(expr, BinaryOp::And, right, position);
        }

        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_comparison()?;

        loop {
            let position = self.current_position();
            let Some(op) = self.match_binary_op(&[TokenKind::EqualEqual, TokenKind::NotEqual])
            else {
                break;
            };
            let right = self.parse_comparison()?;
            expr = Expr::binary(expr, op, right, position);
        }

        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_term()?;

        loop {
            let position = self.current_position();
            let Some(op) = self.match_binary_op(&[
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
            ]) else {
                break;
            };
            let right = self.parse_term()?;
            expr = Expr::binary(expr, op, right, position);
        }

        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_factor()?;

        loop {
            let position = self.current_position();
            let Some(op) = self.match_binary_op(&[TokenKind::Plus, TokenKind::Minus]) else {
                break;
            };
            let right = self.parse_factor()?;
            expr = Expr::binary(expr, op, right, position);
        }

        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_unary()?;

        loop {
            let position = self.current_position();
            let Some(op) =
                self.match_binary_op(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent])
            else {
                break;
            };
            let right = self.parse_unary()?;
            expr = Expr::binary(expr, op, right, position);
        }

        Ok(expr)
    }

    /// Parse unary expression: !, not, -
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let position = self.current_position();
        if let Some(op) = self.match_unary_op(&[TokenKind::Not, TokenKind::Minus]) {
            let operand = self.parse_unary()?;
            return Ok(Expr::unary(op, operand, position));
        }

        self.parse_call()
    }

    /// Parse call, member and index chains: callee(args).field[index]
    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            let position = self.current_position();
            if self.check(&TokenKind::LeftParen) {
                self.advance();
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    position,
                };
            } else if self.check(&TokenKind::Dot) {
                self.advance();
                let property = self.consume_identifier("Expected property name after '.'")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    position,
                };
            } else if self.check(&TokenKind::LeftBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.consume(&TokenKind::RightBracket, "Expected ']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    position,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Parse call arguments after '(' up to and including ')'.
    fn parse_arguments(&mut self) -> Result<Vec<Argument>, ParseError> {
        let mut args = Vec::new();
        let mut seen_named = false;

        while !self.check(&TokenKind::RightParen) {
            let is_named = matches!(self.peek().kind, TokenKind::Identifier(_))
                && matches!(self.peek_next().map(|t| &t.kind), Some(TokenKind::Equal));

            if is_named {
                let name = self.consume_identifier("Expected argument name")?;
                self.advance(); // '='
                let value = self.parse_expression()?;
                args.push(Argument::Named { name, value });
                seen_named = true;
            } else {
                let position = self.current_position();
                let value = self.parse_expression()?;
                if seen_named {
                    return Err(ParseError::InvalidSyntax {
                        message: "Positional argument follows named argument".to_string(),
                        position,
                    });
                }
                args.push(Argument::Positional(value));
            }

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.consume(&TokenKind::RightParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    /// Parse primary expression: literals, identifiers, parenthesized expressions,
    /// list and dict literals
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let position = token.position.clone();

        let literal = match &token.kind {
            TokenKind::Integer(n) => Some(Literal::Integer(*n)),
            TokenKind::Float(f) => Some(Literal::Float(*f)),
            TokenKind::String(s) => Some(Literal::String(s.clone())),
            TokenKind::Boolean(b) => Some(Literal::Boolean(*b)),
            TokenKind::Null => Some(Literal::Null),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(Expr::literal(value, position));
        }

        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::identifier(name, position))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RightBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.check(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.consume(&TokenKind::RightBracket, "Expected ']' after list elements")?;
                Ok(Expr::List { elements, position })
            }
            TokenKind::LeftBrace => self.parse_dict_literal(),
            TokenKind::Eof => Err(ParseError::UnexpectedEndOfInput {
                expected: "expression".to_string(),
                position,
            }),
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other,
                position,
            }),
        }
    }

    /// Parse dict literal: `{ key: value, ... }`
    fn parse_dict_literal(&mut self) -> Result<Expr, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::LeftBrace, "Expected '{'")?;

        let mut entries = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key = self.parse_expression()?;
            self.consume(&TokenKind::Colon, "Expected ':' after dict key")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.consume(&TokenKind::RightBrace, "Expected '}' after dict entries")?;
        Ok(Expr::Dict { entries, position })
    }

    // Utility: peek at current token
    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    // Utility: advance to next token
    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    // Utility: check if current token matches kind
    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            &self.peek().kind == kind
        }
    }

    // Utility: consume token of expected kind, or error
    fn consume(&mut self, kind: &TokenKind, msg: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(ParseError::UnexpectedEndOfInput {
                expected: msg.to_string(),
                position: self.current_position(),
            })
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{:?}", kind),
                found: self.peek().kind.clone(),
                position: self.current_position(),
            })
        }
    }

    // Utility: consume identifier and return its name
    fn consume_identifier(&mut self, msg: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::UnexpectedToken {
                expected: msg.to_string(),
                found: self.peek().kind.clone(),
                position: self.current_position(),
            }),
        }
    }

    fn at_statement_end(&self) -> bool {
        self.is_at_end()
            || self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RightBrace)
    }

    // Utility: consume statement terminator; optional before '}' and at end of input
    fn consume_statement_terminator(&mut self) -> Result<(), ParseError> {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
            Ok(())
        } else if self.at_statement_end() {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: "statement terminator".to_string(),
                found: self.peek().kind.clone(),
                position: self.current_position(),
            })
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn current_position(&self) -> Position {
        self.peek().position.clone()
    }

    /// Character offset just past the most recently consumed token.
    fn previous_end_offset(&self) -> usize {
        self.current
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .map(|token| token.position.offset + 1)
            .unwrap_or(0)
    }

    fn slice_source(&self, start: usize, end: usize) -> String {
        let end = end.min(self.source.len());
        if start >= end {
            return String::new();
        }
        self.source[start..end].iter().collect()
    }

    // Utility: match binary operator and return BinaryOp
    fn match_binary_op(&mut self, kinds: &[TokenKind]) -> Option<BinaryOp> {
        for kind in kinds {
            if self.check(kind) {
                let op = match kind {
                    TokenKind::Plus => BinaryOp::Add,
                    TokenKind::Minus => BinaryOp::Subtract,
                    TokenKind::Star => BinaryOp::Multiply,
                    TokenKind::Slash => BinaryOp::Divide,
                    TokenKind::Percent => BinaryOp::Modulo,
                    TokenKind::EqualEqual => BinaryOp::Equal,
                    TokenKind::NotEqual => BinaryOp::NotEqual,
                    TokenKind::Less => BinaryOp::Less,
                    TokenKind::Greater => BinaryOp::Greater,
                    TokenKind::LessEqual => BinaryOp::LessEqual,
                    TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                    _ => continue,
                };
                self.advance();
                return Some(op);
            }
        }
        None
    }

    // Utility: match unary operator and return UnaryOp
    fn match_unary_op(&mut self, kinds: &[TokenKind]) -> Option<UnaryOp> {
        for kind in kinds {
            if self.check(kind) {
                let op = match kind {
                    TokenKind::Not => UnaryOp::Not,
                    TokenKind::Minus => UnaryOp::Minus,
                    _ => continue,
                };
                self.advance();
                return Some(op);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_function(program: &Program) -> Arc<FunctionDecl> {
        program.functions().next().cloned().unwrap()
    }

    #[test]
    fn parses_precedence() {
        let program = parse_source("let x = 1 + 2 * 3;").unwrap();
        match &program.statements[0] {
            Stmt::Let {
                initializer: Some(Expr::Binary { operator, right, .. }),
                ..
            } => {
                assert_eq!(*operator, BinaryOp::Add);
                assert!(matches!(
                    **right,
                    Expr::Binary {
                        operator: BinaryOp::Multiply,
                        ..
                    }
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn records_declaration_source_with_decorators() {
        let text = "let a = 1;\n@udf_map\n@numargs_expected(2)\nfn add(rec) {\n  return rec;\n}\nlet b = 2;";
        let program = parse_source(text).unwrap();
        let decl = only_function(&program);
        assert_eq!(decl.name, "add");
        assert_eq!(decl.decorators.len(), 2);
        assert_eq!(
            decl.source,
            "@udf_map\n@numargs_expected(2)\nfn add(rec) {\n  return rec;\n}"
        );
        assert!(!decl.nested);
        assert!(!decl.is_generator);
    }

    #[test]
    fn marks_nested_and_generator_functions() {
        let text = "fn outer() { fn inner(x) { yield x; } return inner; }";
        let program = parse_source(text).unwrap();
        let outer = only_function(&program);
        assert!(!outer.is_generator);
        match &outer.body[0] {
            Stmt::FunctionDecl { decl } => {
                assert!(decl.nested);
                assert!(decl.is_generator);
                assert_eq!(decl.source, "fn inner(x) { yield x; }");
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn parses_named_arguments_and_literals() {
        let program = parse_source("f(1, [2, 3], key = {\"a\": 1, 2: null});").unwrap();
        match &program.statements[0] {
            Stmt::Expression {
                expr: Expr::Call { args, .. },
                ..
            } => {
                assert_eq!(args.len(), 3);
                assert!(matches!(args[1], Argument::Positional(Expr::List { .. })));
                assert!(matches!(
                    &args[2],
                    Argument::Named { name, value: Expr::Dict { entries, .. } }
                        if name == "key" && entries.len() == 2
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn parses_else_if_chain_and_index_assignment() {
        let text = "if a { x[0] = 1; } else if b { x.y = 2; } else { z = 3 }";
        let program = parse_source(text).unwrap();
        match &program.statements[0] {
            Stmt::If {
                then_branch,
                else_branch: Some(else_branch),
                ..
            } => {
                assert!(matches!(then_branch[0], Stmt::Assign { .. }));
                assert!(matches!(else_branch[0], Stmt::If { .. }));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn rejects_yield_outside_function() {
        assert!(matches!(
            parse_source("yield 1;"),
            Err(ParseError::InvalidSyntax { .. })
        ));
    }

    #[test]
    fn rejects_positional_after_named() {
        assert!(parse_source("f(a = 1, 2);").is_err());
    }

    #[test]
    fn reports_missing_brace() {
        assert!(matches!(
            parse_source("fn f() { return 1;"),
            Err(ParseError::UnexpectedEndOfInput { .. })
        ));
    }

    #[test]
    fn free_names_skip_local_bindings() {
        let program = parse_source(
            "fn outer(a, b = limit) {
                 let c = a + offset;
                 for item in items { push(c, item.name); }
                 fn inner(x) { return x + depth; }
                 return inner(c) + other.field;
             }",
        )
        .unwrap();
        let names: Vec<String> = only_function(&program).free_names().into_iter().collect();
        assert_eq!(
            names,
            vec!["depth", "items", "limit", "offset", "other", "push"]
        );
    }
}
