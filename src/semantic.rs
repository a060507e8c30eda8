//! Análisis semántico.
//!
//! Esta fase recorre el AST una única vez por función, en orden de
//! declaración, y construye una tabla plana de símbolos por función
//! (el subconjunto no tiene bloques anidados). El AST no se muta;
//! las tablas resultantes son anotaciones aparte que las fases
//! posteriores consultan.
//!
//! A diferencia del parser, esta fase no se detiene en el primer
//! error: acumula todos los errores encontrados y solo entonces
//! aborta la compilación. La generación de código intermedio nunca
//! ocurre sobre un programa con errores semánticos.

use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use thiserror::Error;

use crate::{
    lex::Identifier,
    parse::{Ast, Expr, FunctionDecl, Statement},
    source::{Located, Location},
};

/// Tipos del lenguaje.
///
/// El subconjunto solo admite `int`, pero las verificaciones de tipo
/// existen como punto de extensión: cada expresión resuelve a un
/// [`Type`] y los operadores binarios exigen operandos enteros.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => fmt.write_str("int"),
        }
    }
}

/// Entrada en una tabla de símbolos.
#[derive(Debug, Clone)]
pub struct Symbol {
    index: usize,
    typ: Type,
    location: Location,
}

impl Symbol {
    /// Posición del símbolo en orden de declaración.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Tipo declarado.
    pub fn typ(&self) -> Type {
        self.typ
    }

    /// Ubicación de la declaración.
    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// Tabla plana de símbolos de una función.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<Identifier, Symbol>,
}

impl SymbolTable {
    /// Inserta una declaración, fallando si el nombre ya existe
    /// en el alcance de la función.
    fn declare(&mut self, id: &Located<Identifier>) -> Semantic<()> {
        if self.symbols.contains_key(id.as_ref()) {
            return Err(Located::at(
                SemanticError::Redeclaration(id.as_ref().clone()),
                id.location().clone(),
            ));
        }

        let symbol = Symbol {
            index: self.symbols.len(),
            typ: Type::Int,
            location: id.location().clone(),
        };

        self.symbols.insert(id.as_ref().clone(), symbol);
        Ok(())
    }

    /// Resuelve un nombre a su símbolo, fallando si no fue declarado
    /// previamente en la misma función.
    pub fn lookup(&self, id: &Identifier, location: &Location) -> Semantic<&Symbol> {
        self.symbols.get(id).ok_or_else(|| {
            Located::at(
                SemanticError::Undeclared(id.clone()),
                location.clone(),
            )
        })
    }

    /// Cantidad de símbolos declarados.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// `true` si la función no declara variables.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Variables de la función en orden de declaración.
    pub fn declaration_order(&self) -> Vec<Identifier> {
        let mut symbols: Vec<_> = self.symbols.iter().collect();
        symbols.sort_by_key(|(_, symbol)| symbol.index);

        symbols.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

/// Tablas de símbolos de todas las funciones del programa.
///
/// Hay una instancia por invocación del compilador; ningún estado
/// semántico es global. Las tablas se entregan explícitamente a las
/// fases que las consultan.
#[derive(Debug, Default)]
pub struct SymbolTables {
    tables: HashMap<Identifier, SymbolTable>,
}

impl SymbolTables {
    /// Obtiene la tabla de una función.
    pub fn of(&self, function: &Identifier) -> Option<&SymbolTable> {
        self.tables.get(function)
    }
}

pub type Semantic<T> = Result<T, Located<SemanticError>>;

/// Error de análisis semántico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Entrypoint not found, define a parameterless `int main()`")]
    NoMain,

    #[error("Redeclaration of `{0}`")]
    Redeclaration(Identifier),

    #[error("Symbol `{0}` is undefined")]
    Undeclared(Identifier),
}

/// Verifica un programa completo.
///
/// Se acumulan todos los errores de todas las funciones; el resultado
/// es exitoso únicamente si ninguna función produjo errores.
pub fn analyze(ast: &Ast) -> Result<SymbolTables, Vec<Located<SemanticError>>> {
    let mut errors = Vec::new();
    let mut tables = HashMap::new();

    let main = ast
        .iter()
        .any(|function| function.name().as_ref().as_ref() == "main");

    if !main {
        errors.push(Located::at(SemanticError::NoMain, ast.eof().clone()));
    }

    for function in ast.iter() {
        let name = function.name();
        if tables.contains_key(name.as_ref()) {
            errors.push(Located::at(
                SemanticError::Redeclaration(name.as_ref().clone()),
                name.location().clone(),
            ));

            continue;
        }

        let mut check = Check {
            table: SymbolTable::default(),
            errors: &mut errors,
        };

        check.scan(function);
        tables.insert(name.as_ref().clone(), check.table);
    }

    if errors.is_empty() {
        Ok(SymbolTables { tables })
    } else {
        Err(errors)
    }
}

/// Estado de verificación de una función.
struct Check<'a> {
    table: SymbolTable,
    errors: &'a mut Vec<Located<SemanticError>>,
}

impl Check<'_> {
    fn scan(&mut self, function: &FunctionDecl) {
        for statement in function.body() {
            match statement {
                Statement::Declaration { name, init } => {
                    // El inicializador se evalúa antes de que el
                    // nombre declarado entre en alcance
                    self.eval(init);

                    if let Err(error) = self.table.declare(name) {
                        self.errors.push(error);
                    }
                }

                Statement::Assignment { target, value } => {
                    self.eval(value);

                    if let Err(error) = self.table.lookup(target.as_ref(), target.location()) {
                        self.errors.push(error);
                    }
                }

                Statement::Return(expr) => {
                    self.eval(expr);
                }
            }
        }
    }

    /// Verifica una expresión y determina su tipo.
    ///
    /// Toda expresión bien formada del subconjunto es de tipo `int`,
    /// por lo cual los operadores binarios nunca producen errores de
    /// tipos; el valor de retorno existe para extensiones futuras.
    fn eval(&mut self, expr: &Located<Expr>) -> Type {
        match expr.as_ref() {
            Expr::IntLiteral(_) => Type::Int,

            Expr::Identifier(id) => {
                if let Err(error) = self.table.lookup(id, expr.location()) {
                    self.errors.push(error);
                }

                Type::Int
            }

            Expr::Binary(lhs, _, rhs) => {
                self.eval(lhs);
                self.eval(rhs);

                Type::Int
            }
        }
    }
}
