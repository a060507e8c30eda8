//! Representación intermedia de código de tres direcciones (TAC).
//!
//! Cada instrucción tiene a lo sumo un destino y dos operandos
//! fuente. Las instrucciones de una función forman una secuencia
//! plana cuyo orden es el orden de ejecución; el subconjunto no
//! tiene saltos, por lo cual toda función es un único bloque básico.
//!
//! Los temporales (`t1, t2, …`) se numeran de forma monotónica por
//! función y nunca se reciclan. En código de línea recta esto implica
//! que cada temporal tiene exactamente un punto de definición, que es
//! el invariante sobre el que descansa el optimizador.

use std::fmt::{self, Display};

use crate::{
    lex::Identifier,
    parse::{Ast, Expr, Statement},
    semantic::SymbolTables,
    source::Located,
};

pub use crate::parse::BinOp;

/// Programa completo en representación intermedia.
#[derive(Debug)]
pub struct Program {
    pub code: Vec<Function>,
}

/// Una función en representación intermedia.
#[derive(Debug)]
pub struct Function {
    pub name: Identifier,

    /// Variables nombradas, en orden de declaración. Este orden
    /// define el layout del stack frame en generación de código.
    pub locals: Vec<Identifier>,

    pub body: Vec<Instruction>,

    /// Mayor número de temporal emitido.
    pub temp_count: u32,
}

/// Un temporal introducido por el compilador.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Temp(pub u32);

impl Display for Temp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Temp(number) = self;
        write!(fmt, "t{}", number)
    }
}

/// Destino de una instrucción: un temporal o una variable nombrada,
/// nunca una constante.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Place {
    Temp(Temp),
    Var(Identifier),
}

impl Display for Place {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Temp(temp) => temp.fmt(fmt),
            Place::Var(id) => id.fmt(fmt),
        }
    }
}

/// Operando fuente de una instrucción.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Const(i32),
    Temp(Temp),
    Var(Identifier),
}

impl From<Place> for Operand {
    fn from(place: Place) -> Self {
        match place {
            Place::Temp(temp) => Operand::Temp(temp),
            Place::Var(id) => Operand::Var(id),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(integer) => integer.fmt(fmt),
            Operand::Temp(temp) => temp.fmt(fmt),
            Operand::Var(id) => id.fmt(fmt),
        }
    }
}

/// Una instrucción de tres direcciones.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// `mov dst, src`
    Mov { dst: Place, src: Operand },

    /// `add/sub/mul/div dst, lhs, rhs`
    Binary {
        op: BinOp,
        dst: Place,
        lhs: Operand,
        rhs: Operand,
    },

    /// `return value`
    Return(Operand),
}

impl Instruction {
    /// Destino de la instrucción, si escribe alguno.
    pub fn dst(&self) -> Option<&Place> {
        match self {
            Instruction::Mov { dst, .. } => Some(dst),
            Instruction::Binary { dst, .. } => Some(dst),
            Instruction::Return(_) => None,
        }
    }

    /// Operandos fuente de la instrucción.
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        let (first, second) = match self {
            Instruction::Mov { src, .. } => (Some(src), None),
            Instruction::Binary { lhs, rhs, .. } => (Some(lhs), Some(rhs)),
            Instruction::Return(value) => (Some(value), None),
        };

        first.into_iter().chain(second)
    }

    /// Operandos fuente de la instrucción, mutables.
    pub fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        let (first, second) = match self {
            Instruction::Mov { src, .. } => (Some(src), None),
            Instruction::Binary { lhs, rhs, .. } => (Some(lhs), Some(rhs)),
            Instruction::Return(value) => (Some(value), None),
        };

        first.into_iter().chain(second)
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Mov { dst, src } => write!(fmt, "mov {}, {}", dst, src),
            Instruction::Binary { op, dst, lhs, rhs } => {
                write!(fmt, "{} {}, {}, {}", mnemonic(*op), dst, lhs, rhs)
            }
            Instruction::Return(value) => write!(fmt, "return {}", value),
        }
    }
}

/// Mnemónico TAC de un operador binario.
fn mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
    }
}

/// Baja un AST semánticamente válido a representación intermedia.
///
/// Esta operación no tiene ruta de error: se invoca únicamente sobre
/// programas que el análisis semántico aceptó, junto a sus tablas de
/// símbolos. Las tablas aportan el orden de declaración de las
/// variables de cada función.
pub fn lower(ast: &Ast, tables: &SymbolTables) -> Program {
    let code = ast
        .iter()
        .map(|function| {
            let name = function.name().as_ref().clone();
            let locals = tables
                .of(&name)
                .map(|table| table.declaration_order())
                .unwrap_or_default();

            let mut lowerer = Lowerer {
                body: Vec::new(),
                temp_count: 0,
            };

            for statement in function.body() {
                lowerer.statement(statement);
            }

            Function {
                name,
                locals,
                body: lowerer.body,
                temp_count: lowerer.temp_count,
            }
        })
        .collect();

    Program { code }
}

/// Estado de descenso de una función a TAC.
struct Lowerer {
    body: Vec<Instruction>,
    temp_count: u32,
}

impl Lowerer {
    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Declaration { name, init } => {
                let src = self.expr(init);
                self.body.push(Instruction::Mov {
                    dst: Place::Var(name.as_ref().clone()),
                    src,
                });
            }

            Statement::Assignment { target, value } => {
                let src = self.expr(value);
                self.body.push(Instruction::Mov {
                    dst: Place::Var(target.as_ref().clone()),
                    src,
                });
            }

            Statement::Return(expr) => {
                let value = self.expr(expr);
                self.body.push(Instruction::Return(value));
            }
        }
    }

    /// Baja una expresión en post-orden.
    ///
    /// Las hojas no emiten instrucciones: se reducen a sí mismas como
    /// operandos. Un nodo binario baja primero ambos hijos, reserva un
    /// temporal fresco y emite una única instrucción cuyo resultado es
    /// ese temporal.
    fn expr(&mut self, expr: &Located<Expr>) -> Operand {
        match expr.as_ref() {
            Expr::IntLiteral(integer) => Operand::Const(*integer),
            Expr::Identifier(id) => Operand::Var(id.clone()),

            Expr::Binary(lhs, op, rhs) => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);

                let temp = self.new_temp();
                self.body.push(Instruction::Binary {
                    op: *op,
                    dst: Place::Temp(temp),
                    lhs,
                    rhs,
                });

                Operand::Temp(temp)
            }
        }
    }

    fn new_temp(&mut self) -> Temp {
        self.temp_count += 1;
        Temp(self.temp_count)
    }
}
