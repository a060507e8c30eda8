//! Compilador de un subconjunto de C a ensamblador x86.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST por medio de análisis sintáctico en [`parse`].
//! El árbol sintáctico es validado por análisis semántico en
//! [`semantic`], tras lo cual se genera la representación intermedia
//! de tres direcciones descrita en [`ir`], con lo cual concluyen las
//! fases delanteras del compilador.
//!
//! # Back end
//! Sobre la representación intermedia opera primero el optimizador en
//! [`opt`], que pliega constantes y elimina código muerto hasta
//! alcanzar un punto fijo. El resultado se traduce en [`codegen`] a
//! ensamblador x86 de 32 bits con sintaxis NASM, asignando a cada
//! nombre una ranura en el stack frame de su función. El ensamblado
//! y enlazado del listado resultante se delegan a herramientas
//! externas como `nasm` y `ld`.

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod opt;
pub mod parse;
pub mod semantic;
pub mod source;
