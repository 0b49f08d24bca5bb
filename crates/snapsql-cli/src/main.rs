mod cli;
mod logger;
mod schema_io;

use std::io::Read as _;

use clap::Parser;
use snapsql_core::schema::{Constants, FunctionDefinition};
use snapsql_core::{CompileOptions, SnapSqlError};
use snapsql_helpers::IndexMap;
use snapsql_render::RenderOptions;

fn main() {
    if let Err(e) = logger::init() {
        eprintln!("failed to initialize logging: {e}");
    }
    std::process::exit(run(cli::Args::parse()));
}

fn run(args: cli::Args) -> i32 {
    let template = match read_template(&args.template) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let schema = match &args.schema {
        Some(path) => match schema_io::load_schema(path) {
            Ok(schema) => schema,
            Err(e) => {
                eprintln!("error loading schema: {e}");
                return 1;
            }
        },
        None => FunctionDefinition::new(),
    };

    let constants = match &args.constants {
        Some(path) => match schema_io::load_constants(path) {
            Ok(constants) => constants,
            Err(e) => {
                eprintln!("error loading constants: {e}");
                return 1;
            }
        },
        None => Constants::default(),
    };

    let dialect = args.dialect.into();
    let options = CompileOptions::new(dialect);
    let ir = match snapsql_core::compile_with_options(&template, &schema, &constants, &options) {
        Ok(ir) => ir,
        Err(SnapSqlError::Lex(e)) => {
            eprintln!("lex error: {e}");
            return 1;
        }
        Err(SnapSqlError::Compile(e)) => {
            for diagnostic in &e.diagnostics {
                eprintln!("{diagnostic}");
            }
            return 1;
        }
        Err(SnapSqlError::Cancelled) => {
            eprintln!("error: compilation was cancelled");
            return 1;
        }
    };

    if args.compile_only {
        match serde_json::to_string_pretty(&IrJson(&ir)) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error serializing intermediate format: {e}");
                return 1;
            }
        }
        return 0;
    }

    let params = match &args.params {
        Some(path) => match schema_io::load_params(path) {
            Ok(params) => params,
            Err(e) => {
                eprintln!("error loading params: {e}");
                return 1;
            }
        },
        None => IndexMap::default(),
    };

    let render_options = RenderOptions::new(dialect);
    match snapsql_render::render(&ir, params, &render_options) {
        Ok((sql, bound_args)) => {
            println!("{sql}");
            if !bound_args.is_empty() {
                let rendered: Vec<String> = bound_args.iter().map(|v| v.to_string()).collect();
                eprintln!("args: [{}]", rendered.join(", "));
            }
            0
        }
        Err(e) => {
            eprintln!("render error: {e}");
            1
        }
    }
}

fn read_template(path: &std::path::Path) -> std::io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
    }
}

/// Thin wrapper so `IntermediateFormat` only needs `serde` at this crate's
/// edge, keeping `snapsql-core` itself free of a hard `serde` dependency
/// unless its `serde` feature is enabled.
struct IrJson<'a>(&'a snapsql_core::ir::IntermediateFormat);

impl serde::Serialize for IrJson<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::Serialize as _;
        self.0.serialize(serializer)
    }
}
