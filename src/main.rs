//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use std::fs::{self, File};
use std::process::exit;

use anyhow::Context;
use clap::{self, crate_version, Arg};

use minicc::error::Diagnostics;
use minicc::{codegen, ir, lex, opt, parse, semantic};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = clap::App::new("minicc")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .required(true)
                .help("C source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .default_value("-")
                .value_name("FILE")
                .help("Output file ('-' for stdout)"),
        )
        .get_matches();

    let input = args.value_of("input").unwrap();
    let output = args.value_of("output").unwrap();

    let source =
        fs::read_to_string(input).with_context(|| format!("Failed to read: {}", input))?;

    let program = match compile(&source) {
        Ok(program) => program,

        // Los errores del programa de entrada no son errores del driver
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            exit(1);
        }
    };

    match output {
        "-" => {
            let mut stdout = std::io::stdout();
            codegen::emit(&program, &mut stdout).context("Failed to emit to stdout")?;
        }

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            codegen::emit(&program, &mut file)
                .with_context(|| format!("Failed to emit to file: {}", path))?;
        }
    }

    Ok(())
}

/// Corre el front end y el optimizador, deteniéndose en la primera
/// fase que reporte errores.
fn compile(source: &str) -> Result<ir::Program, Diagnostics> {
    let tokens = lex::Lexer::new(source)
        .try_exhaustive()
        .map_err(|errors| Diagnostics::from(errors).kind("lexical error"))?;

    let ast = parse::parse(&tokens)
        .map_err(|error| Diagnostics::from(error).kind("syntax error"))?;

    let tables = semantic::analyze(&ast)
        .map_err(|errors| Diagnostics::from(errors).kind("semantic error"))?;

    let mut program = ir::lower(&ast, &tables);
    opt::optimize(&mut program);

    Ok(program)
}
