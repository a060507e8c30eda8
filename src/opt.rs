//! Optimización de la representación intermedia.
//!
//! El optimizador reescribe el TAC de cada función in place: las
//! instrucciones se sustituyen o se eliminan, nunca se reordenan.
//! Se aplican tres pasadas en secuencia (plegado de constantes,
//! propagación de constantes y eliminación de código muerto) hasta
//! alcanzar un punto fijo. Una pasada puede habilitar a otra: plegar
//! una instrucción convierte su temporal en constante conocida, lo
//! cual permite propagarla, lo cual a su vez deja muerta la
//! definición original.
//!
//! Toda pasada preserva el comportamiento observable del programa,
//! que en este subconjunto se reduce al valor de retorno de cada
//! función.

use std::collections::{HashMap, HashSet};

use crate::ir::{BinOp, Function, Instruction, Operand, Place, Program, Temp};

/// Tope de rondas del lazo de punto fijo.
///
/// El punto fijo se alcanza en pocas rondas para cualquier entrada
/// razonable; el tope existe para que un defecto en alguna pasada no
/// pueda degenerar en un lazo infinito.
const MAX_ROUNDS: u32 = 8;

/// Optimiza todas las funciones de un programa.
pub fn optimize(program: &mut Program) {
    for function in &mut program.code {
        optimize_function(function);
    }
}

fn optimize_function(function: &mut Function) {
    let mut rounds = 0;
    let mut changed = true;

    while changed && rounds < MAX_ROUNDS {
        changed = false;

        changed |= fold_constants(function);
        changed |= propagate_constants(function);
        changed |= eliminate_dead_code(function);

        rounds += 1;
    }

    recount_temps(function);
}

/// Plegado de constantes.
///
/// Una instrucción binaria cuyos dos operandos son constantes se
/// sustituye por un `mov` de su resultado precomputado. El destino
/// no cambia, de modo que los usos posteriores no se ven afectados.
fn fold_constants(function: &mut Function) -> bool {
    let mut changed = false;

    for instruction in &mut function.body {
        let folded = match instruction {
            Instruction::Binary {
                op,
                dst,
                lhs: Operand::Const(lhs),
                rhs: Operand::Const(rhs),
            } => evaluate(*op, *lhs, *rhs).map(|value| Instruction::Mov {
                dst: dst.clone(),
                src: Operand::Const(value),
            }),

            _ => None,
        };

        if let Some(folded) = folded {
            *instruction = folded;
            changed = true;
        }
    }

    changed
}

/// Evalúa un operador binario sobre constantes.
///
/// La división entre la constante cero nunca se evalúa estáticamente:
/// queda sin plegar y se difiere a la política de error en tiempo de
/// ejecución. Lo mismo aplica a operaciones que desbordan `i32`; el
/// plegado no debe producir en silencio un valor incorrecto.
fn evaluate(op: BinOp, lhs: i32, rhs: i32) -> Option<i32> {
    match op {
        BinOp::Add => lhs.checked_add(rhs),
        BinOp::Sub => lhs.checked_sub(rhs),
        BinOp::Mul => lhs.checked_mul(rhs),
        BinOp::Div if rhs == 0 => None,
        BinOp::Div => lhs.checked_div(rhs),
    }
}

/// Propagación de constantes a través de temporales.
///
/// Como cada temporal tiene exactamente una definición y esta precede
/// a todos sus usos, basta un recorrido hacia adelante: al encontrar
/// `mov tN, constante` se registra el valor, y todo uso posterior de
/// `tN` se sustituye por la constante. Las variables nombradas no se
/// propagan, ya que pueden reasignarse.
fn propagate_constants(function: &mut Function) -> bool {
    let mut known: HashMap<Temp, i32> = HashMap::new();
    let mut changed = false;

    for instruction in &mut function.body {
        for operand in instruction.operands_mut() {
            if let Operand::Temp(temp) = operand {
                if let Some(value) = known.get(temp) {
                    *operand = Operand::Const(*value);
                    changed = true;
                }
            }
        }

        if let Instruction::Mov {
            dst: Place::Temp(temp),
            src: Operand::Const(value),
        } = instruction
        {
            known.insert(*temp, *value);
        }
    }

    changed
}

/// Eliminación de código muerto.
///
/// Un recorrido hacia atrás computa vitalidad exacta para código de
/// línea recta: una instrucción sobrevive si no escribe destino
/// (`return`) o si su destino se lee antes de volver a escribirse.
/// Las instrucciones eliminadas no aportan lecturas, por lo cual una
/// eliminación puede dejar muerta a una definición anterior dentro
/// del mismo recorrido.
fn eliminate_dead_code(function: &mut Function) -> bool {
    let mut live: HashSet<Place> = HashSet::new();
    let mut keep = vec![false; function.body.len()];

    for (index, instruction) in function.body.iter().enumerate().rev() {
        let survives = match instruction.dst() {
            None => true,
            Some(place) => live.contains(place),
        };

        if survives {
            // La escritura mata la vitalidad anterior del destino...
            if let Some(place) = instruction.dst() {
                live.remove(place);
            }

            // ...y las lecturas de los operandos la generan
            for operand in instruction.operands() {
                match operand {
                    Operand::Temp(temp) => {
                        live.insert(Place::Temp(*temp));
                    }
                    Operand::Var(id) => {
                        live.insert(Place::Var(id.clone()));
                    }
                    Operand::Const(_) => (),
                }
            }
        }

        keep[index] = survives;
    }

    let changed = keep.iter().any(|survives| !survives);
    if changed {
        let mut index = 0;
        function.body.retain(|_| {
            let survives = keep[index];
            index += 1;
            survives
        });
    }

    changed
}

/// Recalcula el mayor temporal sobreviviente de la función.
fn recount_temps(function: &mut Function) {
    let mut highest = 0;

    for instruction in &function.body {
        if let Some(Place::Temp(Temp(number))) = instruction.dst() {
            highest = highest.max(*number);
        }

        for operand in instruction.operands() {
            if let Operand::Temp(Temp(number)) = operand {
                highest = highest.max(*number);
            }
        }
    }

    function.temp_count = highest;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lex::{Identifier, Lexer},
        parse, semantic,
    };

    fn optimized(source: &str) -> Program {
        let tokens = Lexer::new(source)
            .try_exhaustive()
            .expect("unexpected lexical error");

        let ast = parse::parse(&tokens).expect("unexpected syntax error");
        let tables = semantic::analyze(&ast).expect("unexpected semantic error");

        let mut program = crate::ir::lower(&ast, &tables);
        optimize(&mut program);
        program
    }

    #[test]
    fn folds_constant_arithmetic_with_precedence() {
        // `2 + 3 * 4` debe plegarse al mismo valor que su evaluación
        // directa: 14, no 20
        let program = optimized("int main() { int result = 2 + 3 * 4; return result; }");
        let result = Identifier::new("result");

        assert_eq!(
            program.code[0].body,
            vec![
                Instruction::Mov {
                    dst: Place::Var(result.clone()),
                    src: Operand::Const(14),
                },
                Instruction::Return(Operand::Var(result)),
            ]
        );

        // Ningún temporal muerto sobrevive al plegado
        assert_eq!(program.code[0].temp_count, 0);
    }

    #[test]
    fn folding_is_left_associative_per_level() {
        let program = optimized("int main() { int r = 10 - 4 - 3; return r; }");

        assert_eq!(
            program.code[0].body[0],
            Instruction::Mov {
                dst: Place::Var(Identifier::new("r")),
                src: Operand::Const(3),
            }
        );
    }

    #[test]
    fn never_folds_division_by_zero() {
        let program = optimized("int main() { return 1 / 0; }");
        let body = &program.code[0].body;

        assert!(matches!(
            body[0],
            Instruction::Binary {
                op: BinOp::Div,
                lhs: Operand::Const(1),
                rhs: Operand::Const(0),
                ..
            }
        ));
    }

    #[test]
    fn removes_dead_temporaries() {
        // `x` se lee, pero el producto intermedio de `waste` no se usa
        let program = optimized("int main() { int x = 1; int waste = x * 2; return x; }");
        let x = Identifier::new("x");

        assert_eq!(
            program.code[0].body,
            vec![
                Instruction::Mov {
                    dst: Place::Var(x.clone()),
                    src: Operand::Const(1),
                },
                Instruction::Return(Operand::Var(x)),
            ]
        );
    }

    #[test]
    fn removes_stores_overwritten_before_any_read() {
        let program = optimized("int main() { int x = 1; x = 2; return x; }");
        let x = Identifier::new("x");

        assert_eq!(
            program.code[0].body,
            vec![
                Instruction::Mov {
                    dst: Place::Var(x.clone()),
                    src: Operand::Const(2),
                },
                Instruction::Return(Operand::Var(x)),
            ]
        );
    }

    #[test]
    fn dead_code_elimination_is_idempotent() {
        let tokens = Lexer::new("int main() { int a = 1; int b = a + 2; return a; }")
            .try_exhaustive()
            .expect("unexpected lexical error");

        let ast = parse::parse(&tokens).expect("unexpected syntax error");
        let tables = semantic::analyze(&ast).expect("unexpected semantic error");
        let mut program = crate::ir::lower(&ast, &tables);

        let function = &mut program.code[0];
        while eliminate_dead_code(function) {}

        let settled = function.body.clone();
        assert!(!eliminate_dead_code(function));
        assert_eq!(function.body, settled);
    }

    #[test]
    fn preserves_computations_on_live_variables() {
        let program = optimized("int main() { int a = 2; int b = a * a; return b; }");
        let body = &program.code[0].body;

        // `a` no es un temporal: su valor no se propaga y el producto
        // debe permanecer
        assert!(body
            .iter()
            .any(|instruction| matches!(instruction, Instruction::Binary { op: BinOp::Mul, .. })));
    }
}
