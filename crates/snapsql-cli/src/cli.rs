use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use snapsql_core::ir::Dialect;

/// Compiles a SnapSQL template and renders it against a parameter set.
#[derive(Debug, Parser)]
#[command(name = "snapsql", version, about)]
pub struct Args {
    /// Template file to compile. Pass `-` (or omit) to read from stdin.
    #[arg(default_value = "-")]
    pub template: PathBuf,

    /// Target SQL dialect.
    #[arg(long, value_enum, default_value = "postgresql")]
    pub dialect: CliDialect,

    /// JSON file mapping parameter name to its declared type.
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// JSON file of constants merged into the evaluation scope.
    #[arg(long)]
    pub constants: Option<PathBuf>,

    /// JSON file of parameter values to render with.
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Only compile; skip the render step.
    #[arg(long)]
    pub compile_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDialect {
    Postgresql,
    Mysql,
    Sqlite,
    Mariadb,
}

impl From<CliDialect> for Dialect {
    fn from(value: CliDialect) -> Self {
        match value {
            CliDialect::Postgresql => Dialect::PostgreSql,
            CliDialect::Mysql => Dialect::MySql,
            CliDialect::Sqlite => Dialect::Sqlite,
            CliDialect::Mariadb => Dialect::MariaDb,
        }
    }
}
