//! Análisis sintáctico.
//!
//! El parser es de descenso recursivo, con una función por cada
//! regla de la gramática. La precedencia de operadores se codifica
//! estructuralmente: [`Parser::expression`] resuelve `+` y `-`,
//! [`Parser::term`] resuelve `*` y `/`, y [`Parser::factor`] resuelve
//! literales, identificadores y expresiones entre paréntesis. Cada
//! nivel es asociativo a la izquierda.
//!
//! El primer error sintáctico aborta la fase; no hay resincronización.

use std::iter::Peekable;
use thiserror::Error;

use crate::{
    lex::{Identifier, Keyword, Token},
    source::{Located, Location},
};

/// Árbol de sintaxis abstracta de un programa completo.
///
/// El árbol es una jerarquía estricta de ownership: cada nodo es dueño
/// exclusivo de sus hijos y no existen referencias de hijo a padre. Una
/// vez construido, el AST es inmutable; las fases posteriores lo anotan
/// por medio de tablas aparte.
#[derive(Debug)]
pub struct Ast {
    functions: Vec<FunctionDecl>,
    eof: Location,
}

impl Ast {
    /// Itera sobre las funciones en orden de declaración.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.iter()
    }

    /// Ubicación del final del programa.
    pub fn eof(&self) -> &Location {
        &self.eof
    }
}

/// Definición de una función.
#[derive(Debug)]
pub struct FunctionDecl {
    name: Located<Identifier>,
    body: Vec<Statement>,
}

impl FunctionDecl {
    /// Obtiene el nombre de la función.
    pub fn name(&self) -> &Located<Identifier> {
        &self.name
    }

    /// Obtiene el cuerpo en orden de aparición.
    pub fn body(&self) -> &[Statement] {
        &self.body
    }
}

/// Una sentencia en el cuerpo de una función.
#[derive(Debug, PartialEq)]
pub enum Statement {
    /// `int x = expr;`
    Declaration {
        name: Located<Identifier>,
        init: Located<Expr>,
    },

    /// `x = expr;`
    Assignment {
        target: Located<Identifier>,
        value: Located<Expr>,
    },

    /// `return expr;`
    Return(Located<Expr>),
}

/// Una expresión aritmética.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLiteral(i32),
    Identifier(Identifier),
    Binary(Box<Located<Expr>>, BinOp, Box<Located<Expr>>),
}

/// Operador binario.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Error de análisis sintáctico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected a declaration, an assignment or `return`")]
    ExpectedStatement,

    #[error("Expected an expression")]
    ExpectedExpr,

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

/// Construye el AST de un programa a partir de su flujo de tokens.
///
/// El final del flujo actúa como centinela: toda regla que requiera
/// un token más allá del último falla con [`ParserError::UnexpectedEof`].
pub fn parse(tokens: &[Located<Token>]) -> Result<Ast, Located<ParserError>> {
    let eof = tokens
        .last()
        .map(|token| token.location().clone())
        .unwrap_or_default();

    let mut parser = Parser {
        tokens: tokens.iter().peekable(),
        last_known: Location::default(),
    };

    parser.program(eof)
}

type Parse<T> = Result<T, Located<ParserError>>;

struct Parser<'a> {
    tokens: Peekable<std::slice::Iter<'a, Located<Token>>>,
    last_known: Location,
}

impl<'a> Parser<'a> {
    /// `<program> ::= <function>*`
    fn program(&mut self, eof: Location) -> Parse<Ast> {
        let mut functions = Vec::new();
        while self.tokens.peek().is_some() {
            functions.push(self.function()?);
        }

        Ok(Ast { functions, eof })
    }

    /// `<function> ::= "int" <id> "(" ")" "{" <statement>* "}"`
    fn function(&mut self) -> Parse<FunctionDecl> {
        self.keyword(Keyword::Int)?;
        let name = self.id()?;

        self.expect(Token::OpenParen)?;
        self.expect(Token::CloseParen)?;
        self.expect(Token::OpenCurly)?;

        let mut body = Vec::new();
        while !matches!(self.peek()?, Token::CloseCurly) {
            body.push(self.statement()?);
        }

        self.expect(Token::CloseCurly)?;

        Ok(FunctionDecl { name, body })
    }

    /// `<statement> ::= <declaration> | <assignment> | <return>`
    ///
    /// Una declaración se distingue de una asignación por su token
    /// inicial: `int` comienza una declaración, un identificador
    /// comienza una asignación.
    fn statement(&mut self) -> Parse<Statement> {
        match self.peek()? {
            Token::Keyword(Keyword::Int) => self.declaration(),
            Token::Keyword(Keyword::Return) => self.return_statement(),
            Token::Id(_) => self.assignment(),

            _ => {
                self.next()?;
                self.fail(ParserError::ExpectedStatement)
            }
        }
    }

    /// `<declaration> ::= "int" <id> "=" <expression> ";"`
    fn declaration(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Int)?;
        let name = self.id()?;

        self.expect(Token::Assign)?;
        let init = self.expression()?;
        self.expect(Token::Semicolon)?;

        Ok(Statement::Declaration { name, init })
    }

    /// `<assignment> ::= <id> "=" <expression> ";"`
    fn assignment(&mut self) -> Parse<Statement> {
        let target = self.id()?;

        self.expect(Token::Assign)?;
        let value = self.expression()?;
        self.expect(Token::Semicolon)?;

        Ok(Statement::Assignment { target, value })
    }

    /// `<return> ::= "return" <expression> ";"`
    fn return_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Return)?;
        let expr = self.expression()?;
        self.expect(Token::Semicolon)?;

        Ok(Statement::Return(expr))
    }

    /// `<expression> ::= <term> (("+" | "-") <term>)*`
    fn expression(&mut self) -> Parse<Located<Expr>> {
        let mut lhs = self.term()?;

        loop {
            let op = match self.peek_optional() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break Ok(lhs),
            };

            self.next()?;
            let rhs = self.term()?;

            lhs = binary(lhs, op, rhs);
        }
    }

    /// `<term> ::= <factor> (("*" | "/") <factor>)*`
    fn term(&mut self) -> Parse<Located<Expr>> {
        let mut lhs = self.factor()?;

        loop {
            let op = match self.peek_optional() {
                Some(Token::Times) => BinOp::Mul,
                Some(Token::Divide) => BinOp::Div,
                _ => break Ok(lhs),
            };

            self.next()?;
            let rhs = self.factor()?;

            lhs = binary(lhs, op, rhs);
        }
    }

    /// `<factor> ::= <int> | <id> | "(" <expression> ")"`
    fn factor(&mut self) -> Parse<Located<Expr>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::IntLiteral(integer) => Ok(Located::at(Expr::IntLiteral(integer), location)),
            Token::Id(id) => Ok(Located::at(Expr::Identifier(id), location)),

            Token::OpenParen => {
                let inner = self.expression()?;
                self.expect(Token::CloseParen)?;

                // Los paréntesis se disuelven en el árbol; solo se
                // extiende la ubicación del nodo interior
                let location = Location::span(location, &self.last_known);
                Ok(Located::at(inner.into_inner(), location))
            }

            _ => Err(Located::at(ParserError::ExpectedExpr, location)),
        }
    }

    // --- Primitivas sobre el flujo de tokens ---

    fn peek(&mut self) -> Parse<&'a Token> {
        match self.tokens.peek().copied() {
            Some(token) => Ok(token.as_ref()),
            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn peek_optional(&mut self) -> Option<&'a Token> {
        self.tokens.peek().copied().map(|token| token.as_ref())
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token.clone())
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next().map(Located::into_inner) {
            Ok(found) if found == token => Ok(()),
            Ok(found) => self.fail(ParserError::UnexpectedToken(token, found)),
            Err(_) => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()))
    }
}

/// Forma un nodo binario cuya ubicación cubre ambos operandos.
fn binary(lhs: Located<Expr>, op: BinOp, rhs: Located<Expr>) -> Located<Expr> {
    let location = Location::span(lhs.location().clone(), rhs.location());
    Located::at(Expr::Binary(Box::new(lhs), op, Box::new(rhs)), location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;

    fn ast(source: &str) -> Ast {
        let tokens = Lexer::new(source)
            .try_exhaustive()
            .expect("unexpected lexical error");

        parse(&tokens).expect("unexpected syntax error")
    }

    fn single_return(source: &str) -> Expr {
        let ast = ast(source);
        let function = ast.iter().next().expect("expected a function");

        match function.body() {
            [Statement::Return(expr)] => expr.clone().into_inner(),
            body => panic!("expected a single return, found {:?}", body),
        }
    }

    /// Descompone un nodo binario en sus tres partes.
    fn parts(expr: Expr) -> (Expr, BinOp, Expr) {
        match expr {
            Expr::Binary(lhs, op, rhs) => (lhs.into_inner(), op, rhs.into_inner()),
            other => panic!("expected a binary node, found {:?}", other),
        }
    }

    #[test]
    fn precedence_groups_products_first() {
        // `a * b + c` debe agruparse como `(a * b) + c`
        let (lhs, op, rhs) = parts(single_return("int main() { return a * b + c; }"));

        assert_eq!(op, BinOp::Add);
        assert_eq!(rhs, Expr::Identifier(Identifier::new("c")));

        let (a, inner, b) = parts(lhs);
        assert_eq!(inner, BinOp::Mul);
        assert_eq!(a, Expr::Identifier(Identifier::new("a")));
        assert_eq!(b, Expr::Identifier(Identifier::new("b")));
    }

    #[test]
    fn precedence_keeps_sums_outermost() {
        // `2 + 3 * 4` debe agruparse como `2 + (3 * 4)`
        let (lhs, op, rhs) = parts(single_return("int main() { return 2 + 3 * 4; }"));

        assert_eq!(op, BinOp::Add);
        assert_eq!(lhs, Expr::IntLiteral(2));

        let (three, inner, four) = parts(rhs);
        assert_eq!(inner, BinOp::Mul);
        assert_eq!(three, Expr::IntLiteral(3));
        assert_eq!(four, Expr::IntLiteral(4));
    }

    #[test]
    fn same_level_is_left_associative() {
        // `a - b + c` debe agruparse como `(a - b) + c`
        let (lhs, op, _) = parts(single_return("int main() { return a - b + c; }"));

        assert_eq!(op, BinOp::Add);
        assert_eq!(parts(lhs).1, BinOp::Sub);
    }

    #[test]
    fn parentheses_override_precedence() {
        // `(2 + 3) * 4` debe agruparse como `(2 + 3) * 4`
        let (lhs, op, rhs) = parts(single_return("int main() { return (2 + 3) * 4; }"));

        assert_eq!(op, BinOp::Mul);
        assert_eq!(rhs, Expr::IntLiteral(4));
        assert_eq!(parts(lhs).1, BinOp::Add);
    }

    #[test]
    fn distinguishes_declaration_from_assignment() {
        let ast = ast("int main() { int x = 1; x = 2; return x; }");
        let function = ast.iter().next().unwrap();

        assert!(matches!(function.body()[0], Statement::Declaration { .. }));
        assert!(matches!(function.body()[1], Statement::Assignment { .. }));
        assert!(matches!(function.body()[2], Statement::Return(_)));
    }

    fn syntax_error(source: &str) -> Located<ParserError> {
        let tokens = Lexer::new(source)
            .try_exhaustive()
            .expect("unexpected lexical error");

        parse(&tokens).expect_err("program should not parse")
    }

    #[test]
    fn missing_semicolon_is_rejected() {
        let error = syntax_error("int main() { return 0 }");
        assert!(matches!(
            error.as_ref(),
            ParserError::UnexpectedToken(Token::Semicolon, Token::CloseCurly)
        ));
    }

    #[test]
    fn truncated_program_is_rejected() {
        let error = syntax_error("int main() { return");
        assert!(matches!(
            error.as_ref(),
            ParserError::UnexpectedEof | ParserError::MissingToken(_)
        ));
    }

    #[test]
    fn first_error_reports_its_line() {
        let error = syntax_error("int main() {\n    return 0\n}");
        assert_eq!(error.location().start().line(), 3);
    }
}
