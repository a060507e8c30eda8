//! Emisión de ensamblador x86 de 32 bits, sintaxis NASM.
//!
//! La traducción usa `eax` como acumulador: cada instrucción de tres
//! direcciones carga su primer operando en `eax`, opera sobre él y
//! escribe el resultado de vuelta a su ranura en el frame. La división
//! usa además `ecx` como divisor y `cdq` para extender el signo del
//! dividendo a `edx:eax`.
//!
//! El valor de retorno de la función queda en `eax`, según cdecl.

use std::io::Write;

use super::frame::Frame;
use super::CodegenError;
use crate::ir::{BinOp, Function, Instruction, Operand, Place};

/// Emite el cuerpo de una función, prólogo y epílogo incluidos.
pub fn emit_function<W: Write>(output: &mut W, function: &Function) -> Result<(), CodegenError> {
    let frame = Frame::allocate(function);

    X86Function {
        output,
        function,
        frame,
    }
    .write_asm()
}

struct X86Function<'a, W> {
    output: &'a mut W,
    function: &'a Function,
    frame: Frame,
}

impl<'a, W: Write> X86Function<'a, W> {
    fn write_asm(mut self) -> Result<(), CodegenError> {
        emit!(self, "push", "ebp")?;
        emit!(self, "mov", "ebp, esp")?;

        let size = self.frame.size();
        if size > 0 {
            emit!(self, "sub", "esp, {}", size)?;
        }

        let function = self.function;
        for instruction in &function.body {
            self.put_instruction(instruction)?;
        }

        // Sin `return` explícito al final, la función devuelve cero
        if !matches!(function.body.last(), Some(Instruction::Return(_))) {
            emit!(self, "mov", "eax, 0")?;
            self.epilogue()?;
        }

        Ok(())
    }

    fn put_instruction(&mut self, instruction: &Instruction) -> Result<(), CodegenError> {
        match instruction {
            // mov de memoria a memoria no existe, el valor pasa por eax
            Instruction::Mov { dst, src } => match src {
                Operand::Const(value) => {
                    let dst = self.address(dst)?;
                    emit!(self, "mov", "dword {}, {}", dst, value)?;
                }

                src => {
                    let src = self.operand(src)?;
                    let dst = self.address(dst)?;

                    emit!(self, "mov", "eax, {}", src)?;
                    emit!(self, "mov", "{}, eax", dst)?;
                }
            },

            Instruction::Binary { op, dst, lhs, rhs } => {
                let lhs = self.operand(lhs)?;
                let rhs = self.operand(rhs)?;
                let dst = self.address(dst)?;

                emit!(self, "mov", "eax, {}", lhs)?;

                match op {
                    BinOp::Add => emit!(self, "add", "eax, {}", rhs)?,
                    BinOp::Sub => emit!(self, "sub", "eax, {}", rhs)?,
                    BinOp::Mul => emit!(self, "imul", "eax, {}", rhs)?,

                    BinOp::Div => {
                        emit!(self, "mov", "ecx, {}", rhs)?;
                        emit!(self, "cdq")?;
                        emit!(self, "idiv", "ecx")?;
                    }
                }

                emit!(self, "mov", "{}, eax", dst)?;
            }

            Instruction::Return(value) => {
                let value = self.operand(value)?;

                emit!(self, "mov", "eax, {}", value)?;
                self.epilogue()?;
            }
        }

        Ok(())
    }

    fn epilogue(&mut self) -> Result<(), CodegenError> {
        emit!(self, "mov", "esp, ebp")?;
        emit!(self, "pop", "ebp")?;
        emit!(self, "ret")?;

        Ok(())
    }

    fn operand(&mut self, operand: &Operand) -> Result<String, CodegenError> {
        match operand {
            Operand::Const(value) => Ok(value.to_string()),
            Operand::Temp(temp) => self.address(&Place::Temp(*temp)),
            Operand::Var(id) => self.address(&Place::Var(id.clone())),
        }
    }

    fn address(&mut self, place: &Place) -> Result<String, CodegenError> {
        match self.frame.offset(place) {
            Some(offset) => Ok(format!("[ebp - {}]", offset)),

            None => Err(CodegenError::MissingSlot(
                place.to_string(),
                self.function.name.to_string(),
            )),
        }
    }

    fn output(&mut self) -> &mut W {
        &mut *self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen;
    use crate::ir::{Program, Temp};
    use crate::lex::Identifier;

    fn id(name: &str) -> Identifier {
        Identifier::new(name)
    }

    fn assemble(function: Function) -> String {
        let program = Program {
            code: vec![function],
        };

        let mut buffer = Vec::new();
        codegen::emit(&program, &mut buffer).unwrap();

        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn trivial_function_has_prologue_and_epilogue() {
        let asm = assemble(Function {
            name: id("main"),
            locals: Vec::new(),
            body: vec![Instruction::Return(Operand::Const(0))],
            temp_count: 0,
        });

        let lines: Vec<&str> = asm.lines().map(str::trim).collect();
        assert_eq!(
            lines,
            [
                "section .text",
                "",
                "global main",
                "main:",
                "push    ebp",
                "mov     ebp, esp",
                "mov     eax, 0",
                "mov     esp, ebp",
                "pop     ebp",
                "ret",
            ]
        );
    }

    #[test]
    fn constant_stores_skip_the_accumulator() {
        let asm = assemble(Function {
            name: id("main"),
            locals: vec![id("result")],
            body: vec![
                Instruction::Mov {
                    dst: Place::Var(id("result")),
                    src: Operand::Const(14),
                },
                Instruction::Return(Operand::Var(id("result"))),
            ],
            temp_count: 0,
        });

        assert!(asm.contains("mov     dword [ebp - 4], 14"));
        assert!(asm.contains("mov     eax, [ebp - 4]"));
    }

    #[test]
    fn binary_operations_accumulate_in_eax() {
        let asm = assemble(Function {
            name: id("main"),
            locals: vec![id("x")],
            body: vec![
                Instruction::Mov {
                    dst: Place::Var(id("x")),
                    src: Operand::Const(6),
                },
                Instruction::Binary {
                    op: BinOp::Mul,
                    dst: Place::Temp(Temp(1)),
                    lhs: Operand::Var(id("x")),
                    rhs: Operand::Const(7),
                },
                Instruction::Return(Operand::Temp(Temp(1))),
            ],
            temp_count: 1,
        });

        assert!(asm.contains("mov     eax, [ebp - 4]"));
        assert!(asm.contains("imul    eax, 7"));
        assert!(asm.contains("mov     [ebp - 8], eax"));
    }

    #[test]
    fn division_sign_extends_the_dividend() {
        let asm = assemble(Function {
            name: id("main"),
            locals: Vec::new(),
            body: vec![
                Instruction::Binary {
                    op: BinOp::Div,
                    dst: Place::Temp(Temp(1)),
                    lhs: Operand::Const(-9),
                    rhs: Operand::Const(2),
                },
                Instruction::Return(Operand::Temp(Temp(1))),
            ],
            temp_count: 1,
        });

        assert!(asm.contains("mov     ecx, 2"));
        assert!(asm.contains("cdq"));
        assert!(asm.contains("idiv    ecx"));
    }

    #[test]
    fn functions_reserve_an_aligned_frame() {
        let asm = assemble(Function {
            name: id("main"),
            locals: vec![id("a")],
            body: vec![
                Instruction::Mov {
                    dst: Place::Var(id("a")),
                    src: Operand::Const(1),
                },
                Instruction::Return(Operand::Var(id("a"))),
            ],
            temp_count: 0,
        });

        assert!(asm.contains("sub     esp, 16"));
    }

    #[test]
    fn unallocated_names_are_rejected() {
        let program = Program {
            code: vec![Function {
                name: id("main"),
                locals: Vec::new(),
                body: vec![Instruction::Return(Operand::Var(id("ghost")))],
                temp_count: 0,
            }],
        };

        let mut buffer = Vec::new();
        let error = codegen::emit(&program, &mut buffer).unwrap_err();
        assert!(matches!(error, CodegenError::MissingSlot(..)));
    }
}
