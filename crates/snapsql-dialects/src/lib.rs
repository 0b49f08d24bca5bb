//! Per-dialect rendering configuration: placeholder syntax and
//! identifier quoting style for the four supported targets (spec.md §4.9
//! "Optimizer applies dialect-specific rewrites").
//!
//! This crate owns no parsing; `snapsql_core::ir::Dialect` is the source
//! of truth for which dialects exist, this crate only maps each variant
//! to its rendering rules.

use snapsql_core::ir::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Numbered,
    /// `?`
    Positional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    DoubleQuote,
    Backtick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectConfig {
    pub dialect: Dialect,
    pub placeholder: PlaceholderStyle,
    pub quote: QuoteStyle,
}

impl DialectConfig {
    pub const fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::PostgreSql => Self {
                dialect,
                placeholder: PlaceholderStyle::Numbered,
                quote: QuoteStyle::DoubleQuote,
            },
            Dialect::MySql | Dialect::MariaDb => Self {
                dialect,
                placeholder: PlaceholderStyle::Positional,
                quote: QuoteStyle::Backtick,
            },
            Dialect::Sqlite => Self {
                dialect,
                placeholder: PlaceholderStyle::Positional,
                quote: QuoteStyle::DoubleQuote,
            },
        }
    }

    /// Renders the placeholder for the `nth` (1-based) bound argument.
    pub fn placeholder_text(&self, nth: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Numbered => format!("${nth}"),
            PlaceholderStyle::Positional => "?".to_string(),
        }
    }

    pub fn quote_identifier(&self, ident: &str) -> String {
        match self.quote {
            QuoteStyle::DoubleQuote => format!("\"{}\"", ident.replace('"', "\"\"")),
            QuoteStyle::Backtick => format!("`{}`", ident.replace('`', "``")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgresql_uses_numbered_placeholders() {
        let cfg = DialectConfig::for_dialect(Dialect::PostgreSql);
        assert_eq!(cfg.placeholder_text(1), "$1");
        assert_eq!(cfg.placeholder_text(2), "$2");
    }

    #[test]
    fn mysql_uses_positional_placeholders() {
        let cfg = DialectConfig::for_dialect(Dialect::MySql);
        assert_eq!(cfg.placeholder_text(1), "?");
        assert_eq!(cfg.placeholder_text(7), "?");
    }

    #[test]
    fn mysql_quotes_with_backticks() {
        let cfg = DialectConfig::for_dialect(Dialect::MySql);
        assert_eq!(cfg.quote_identifier("order"), "`order`");
    }

    #[test]
    fn postgresql_quotes_with_double_quotes() {
        let cfg = DialectConfig::for_dialect(Dialect::PostgreSql);
        assert_eq!(cfg.quote_identifier("order"), "\"order\"");
    }
}
