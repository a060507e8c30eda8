//! Generación de código ensamblador.
//!
//! Esta fase traduce un [`Program`](crate::ir::Program) en código
//! intermedio a ensamblador x86 de 32 bits con sintaxis NASM. La
//! traducción es por función: cada una recibe su propio stack frame
//! (ver [`frame`]) y su cuerpo se emite instrucción por instrucción
//! (ver [`x86`]).

use std::io::{self, Write};

use thiserror::Error;

use crate::ir::Program;

mod frame;
mod x86;

/// Errores de generación de código.
///
/// Con la excepción de los errores de E/S, estas condiciones indican
/// un defecto en una fase anterior del compilador y no un programa de
/// entrada inválido.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    /// Error de E/S al escribir el ensamblador.
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// Una instrucción refiere a un nombre sin ranura en el frame.
    #[error("no stack slot was allocated for `{0}` in function `{1}`")]
    MissingSlot(String, String),
}

/// Emite el ensamblador de un programa completo.
///
/// El resultado es un único módulo NASM con una sección `.text` y un
/// símbolo global por función.
pub fn emit<W: Write>(program: &Program, output: &mut W) -> Result<(), CodegenError> {
    writeln!(output, "section .text")?;

    for function in &program.code {
        writeln!(output)?;
        writeln!(output, "global {}", function.name)?;
        writeln!(output, "{}:", function.name)?;

        x86::emit_function(output, function)?;
    }

    Ok(())
}
