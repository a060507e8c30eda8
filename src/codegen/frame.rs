//! Disposición de stack frames.
//!
//! La política de asignación es deliberadamente simple: cada nombre
//! distinto que aparece en el cuerpo de una función recibe su propia
//! ranura de cuatro bytes durante toda la vida de la función. No hay
//! reutilización de ranuras ni asignación de registros. Las variables
//! ocupan las primeras ranuras en orden de declaración y los
//! temporales las siguen en orden numérico, de modo que la disposición
//! es determinista para un mismo programa de entrada.

use std::collections::{HashMap, HashSet};

use crate::ir::{Function, Operand, Place, Temp};

/// Bytes que ocupa cada valor.
const VALUE_SIZE: u32 = 4;

/// Frontera de alineamiento del frame, según la ABI.
const FRAME_ALIGN: u32 = 16;

/// Stack frame de una función: la ranura de cada nombre y el tamaño
/// total a reservar en el prólogo.
#[derive(Debug)]
pub struct Frame {
    slots: HashMap<Place, u32>,
    size: u32,
}

impl Frame {
    /// Asigna ranuras para los nombres que sobreviven en el cuerpo de
    /// la función. Los nombres declarados pero ausentes del cuerpo
    /// (por ejemplo, eliminados por el optimizador) no ocupan espacio.
    pub fn allocate(function: &Function) -> Frame {
        let mut used = HashSet::new();
        for instruction in &function.body {
            used.extend(instruction.dst().cloned());

            for operand in instruction.operands() {
                match operand {
                    Operand::Temp(temp) => {
                        used.insert(Place::Temp(*temp));
                    }

                    Operand::Var(id) => {
                        used.insert(Place::Var(id.clone()));
                    }

                    Operand::Const(_) => (),
                }
            }
        }

        let mut slots = HashMap::new();
        let mut offset = 0;

        let vars = function.locals.iter().map(|id| Place::Var(id.clone()));
        let temps = (1..=function.temp_count).map(|number| Place::Temp(Temp(number)));

        for place in vars.chain(temps) {
            if used.contains(&place) {
                offset += VALUE_SIZE;
                slots.insert(place, offset);
            }
        }

        Frame {
            slots,
            size: align(offset, FRAME_ALIGN),
        }
    }

    /// Desplazamiento de la ranura de un nombre, relativo a `ebp`.
    ///
    /// El desplazamiento es positivo y se resta: la primera ranura
    /// está en `[ebp - 4]`.
    pub fn offset(&self, place: &Place) -> Option<u32> {
        self.slots.get(place).copied()
    }

    /// Bytes a reservar en el prólogo de la función.
    pub fn size(&self) -> u32 {
        self.size
    }
}

fn align(size: u32, boundary: u32) -> u32 {
    match size % boundary {
        0 => size,
        remainder => size + (boundary - remainder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Instruction};
    use crate::lex::Identifier;

    fn id(name: &str) -> Identifier {
        Identifier::new(name)
    }

    #[test]
    fn vars_precede_temps_in_declaration_order() {
        let function = Function {
            name: id("main"),
            locals: vec![id("x"), id("y")],
            body: vec![
                Instruction::Mov {
                    dst: Place::Var(id("x")),
                    src: Operand::Const(1),
                },
                Instruction::Mov {
                    dst: Place::Var(id("y")),
                    src: Operand::Const(2),
                },
                Instruction::Binary {
                    op: BinOp::Add,
                    dst: Place::Temp(Temp(1)),
                    lhs: Operand::Var(id("x")),
                    rhs: Operand::Var(id("y")),
                },
                Instruction::Return(Operand::Temp(Temp(1))),
            ],
            temp_count: 1,
        };

        let frame = Frame::allocate(&function);
        assert_eq!(frame.offset(&Place::Var(id("x"))), Some(4));
        assert_eq!(frame.offset(&Place::Var(id("y"))), Some(8));
        assert_eq!(frame.offset(&Place::Temp(Temp(1))), Some(12));
        assert_eq!(frame.size(), 16);
    }

    #[test]
    fn dead_names_take_no_space() {
        let function = Function {
            name: id("main"),
            locals: vec![id("waste"), id("result")],
            body: vec![
                Instruction::Mov {
                    dst: Place::Var(id("result")),
                    src: Operand::Const(14),
                },
                Instruction::Return(Operand::Var(id("result"))),
            ],
            temp_count: 0,
        };

        let frame = Frame::allocate(&function);
        assert_eq!(frame.offset(&Place::Var(id("waste"))), None);
        assert_eq!(frame.offset(&Place::Var(id("result"))), Some(4));
        assert_eq!(frame.size(), 16);
    }

    #[test]
    fn empty_frames_reserve_nothing() {
        let function = Function {
            name: id("main"),
            locals: Vec::new(),
            body: vec![Instruction::Return(Operand::Const(0))],
            temp_count: 0,
        };

        let frame = Frame::allocate(&function);
        assert_eq!(frame.size(), 0);
    }
}
