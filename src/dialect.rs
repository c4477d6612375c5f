//! Per-engine formatting rules and limits.
//!
//! The traversal logic is engine-agnostic; everything an engine does
//! differently — identifier quoting, parameter prefixes, string function
//! names, `LIKE` concatenation, `IN`-batch ceilings and the pagination
//! clause — is collected in one immutable [`DialectProfile`] record the
//! compiler consults while emitting.
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// The supported engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Engine {
    /// A generic ANSI-flavored fallback.
    Normal,
    SqlServer,
    MySql,
    Oracle,
    PostgreSql,
    Db2,
    Sybase,
    Access,
    Sqlite,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Normal => "normal",
            Engine::SqlServer => "sqlserver",
            Engine::MySql => "mysql",
            Engine::Oracle => "oracle",
            Engine::PostgreSql => "postgresql",
            Engine::Db2 => "db2",
            Engine::Sybase => "sybase",
            Engine::Access => "access",
            Engine::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// How an engine spells string concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatStyle {
    /// `a + b`
    Plus,
    /// `a || b`
    Pipes,
    /// `CONCAT(a, b)`
    Function,
}

/// One piece of a `LIKE` pattern built from mixed literal and computed
/// fragments.
#[derive(Debug, Clone)]
pub enum PatternPiece {
    /// A literal pattern part, emitted as a quoted string.
    Lit(String),
    /// An already-emitted SQL fragment.
    Frag(String),
}

/// The pre-pagination parts of a `SELECT`, handed to the [`DialectProfile::page`]
/// hook for final assembly.
#[derive(Debug, Clone)]
pub struct SelectParts {
    pub distinct: bool,
    /// The projection list, without the `SELECT` keyword.
    pub projection: String,
    /// Everything from ` FROM` up to and including `HAVING`, with a leading
    /// space; empty for table-less selects.
    pub body: String,
    /// The `ORDER BY` item list, without the keywords.
    pub order_by: Option<String>,
}

impl SelectParts {
    fn render(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.projection);
        sql.push_str(&self.body);
        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql
    }
}

/// The immutable per-engine rule set.
#[derive(Debug, Clone)]
pub struct DialectProfile {
    engine: Engine,
    quote_open: char,
    quote_close: char,
    param_prefix: &'static str,
    length_fn: &'static str,
    substring_fn: &'static str,
    indexof_fn: &'static str,
    /// `true` when the index-of function takes the needle before the
    /// haystack, as `CHARINDEX` does.
    indexof_needle_first: bool,
    /// `None` when the engine has no two-sided `TRIM` and needs
    /// `LTRIM(RTRIM(..))`.
    trim_fn: Option<&'static str>,
    concat_style: ConcatStyle,
    modulo_fn: Option<&'static str>,
    in_batch_ceiling: usize,
}

impl DialectProfile {
    /// The profile for an engine, with its default constants.
    pub fn new(engine: Engine) -> Self {
        match engine {
            Engine::Normal => Self {
                engine,
                quote_open: '"',
                quote_close: '"',
                param_prefix: "@",
                length_fn: "LENGTH",
                substring_fn: "SUBSTRING",
                indexof_fn: "INSTR",
                indexof_needle_first: false,
                trim_fn: Some("TRIM"),
                concat_style: ConcatStyle::Pipes,
                modulo_fn: None,
                in_batch_ceiling: 1000,
            },
            Engine::SqlServer => Self {
                engine,
                quote_open: '[',
                quote_close: ']',
                param_prefix: "@",
                length_fn: "LEN",
                substring_fn: "SUBSTRING",
                indexof_fn: "CHARINDEX",
                indexof_needle_first: true,
                trim_fn: None,
                concat_style: ConcatStyle::Plus,
                modulo_fn: None,
                in_batch_ceiling: 10000,
            },
            Engine::MySql => Self {
                engine,
                quote_open: '`',
                quote_close: '`',
                param_prefix: "@",
                length_fn: "CHAR_LENGTH",
                substring_fn: "SUBSTRING",
                indexof_fn: "INSTR",
                indexof_needle_first: false,
                trim_fn: Some("TRIM"),
                concat_style: ConcatStyle::Function,
                modulo_fn: None,
                in_batch_ceiling: 20000,
            },
            Engine::Oracle => Self {
                engine,
                quote_open: '"',
                quote_close: '"',
                param_prefix: ":",
                length_fn: "LENGTH",
                substring_fn: "SUBSTR",
                indexof_fn: "INSTR",
                indexof_needle_first: false,
                trim_fn: Some("TRIM"),
                concat_style: ConcatStyle::Pipes,
                modulo_fn: Some("MOD"),
                in_batch_ceiling: 1000,
            },
            Engine::PostgreSql => Self {
                engine,
                quote_open: '"',
                quote_close: '"',
                param_prefix: "@",
                length_fn: "LENGTH",
                substring_fn: "SUBSTRING",
                indexof_fn: "STRPOS",
                indexof_needle_first: false,
                trim_fn: Some("TRIM"),
                concat_style: ConcatStyle::Pipes,
                modulo_fn: None,
                in_batch_ceiling: 20000,
            },
            Engine::Db2 => Self {
                engine,
                quote_open: '"',
                quote_close: '"',
                param_prefix: "@",
                length_fn: "LENGTH",
                substring_fn: "SUBSTR",
                indexof_fn: "LOCATE",
                indexof_needle_first: true,
                trim_fn: Some("TRIM"),
                concat_style: ConcatStyle::Pipes,
                modulo_fn: Some("MOD"),
                in_batch_ceiling: 10000,
            },
            Engine::Sybase => Self {
                engine,
                quote_open: '[',
                quote_close: ']',
                param_prefix: "@",
                length_fn: "CHAR_LENGTH",
                substring_fn: "SUBSTRING",
                indexof_fn: "CHARINDEX",
                indexof_needle_first: true,
                trim_fn: None,
                concat_style: ConcatStyle::Plus,
                modulo_fn: None,
                in_batch_ceiling: 128,
            },
            Engine::Access => Self {
                engine,
                quote_open: '[',
                quote_close: ']',
                param_prefix: "@",
                length_fn: "LEN",
                substring_fn: "MID",
                indexof_fn: "INSTR",
                indexof_needle_first: false,
                trim_fn: Some("TRIM"),
                concat_style: ConcatStyle::Plus,
                modulo_fn: None,
                in_batch_ceiling: 128,
            },
            Engine::Sqlite => Self {
                engine,
                quote_open: '`',
                quote_close: '`',
                param_prefix: "@",
                length_fn: "LENGTH",
                substring_fn: "SUBSTR",
                indexof_fn: "INSTR",
                indexof_needle_first: false,
                trim_fn: Some("TRIM"),
                concat_style: ConcatStyle::Pipes,
                modulo_fn: None,
                in_batch_ceiling: 256,
            },
        }
    }

    pub fn normal() -> Self {
        Self::new(Engine::Normal)
    }

    pub fn sql_server() -> Self {
        Self::new(Engine::SqlServer)
    }

    pub fn mysql() -> Self {
        Self::new(Engine::MySql)
    }

    pub fn oracle() -> Self {
        Self::new(Engine::Oracle)
    }

    pub fn postgres() -> Self {
        Self::new(Engine::PostgreSql)
    }

    pub fn db2() -> Self {
        Self::new(Engine::Db2)
    }

    pub fn sybase() -> Self {
        Self::new(Engine::Sybase)
    }

    pub fn access() -> Self {
        Self::new(Engine::Access)
    }

    pub fn sqlite() -> Self {
        Self::new(Engine::Sqlite)
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// The `IN`-batch ceilings are empirically chosen safety margins, not
    /// documented engine limits; callers who have verified their engine can
    /// override them.
    pub fn with_in_batch_ceiling(mut self, ceiling: usize) -> Self {
        assert!(ceiling > 0, "the IN batch ceiling must be positive");
        self.in_batch_ceiling = ceiling;
        self
    }

    pub fn in_batch_ceiling(&self) -> usize {
        self.in_batch_ceiling
    }

    pub fn concat_style(&self) -> ConcatStyle {
        self.concat_style
    }

    pub fn length_fn(&self) -> &'static str {
        self.length_fn
    }

    pub fn substring_fn(&self) -> &'static str {
        self.substring_fn
    }

    pub fn indexof_fn(&self) -> &'static str {
        self.indexof_fn
    }

    pub fn indexof_needle_first(&self) -> bool {
        self.indexof_needle_first
    }

    pub fn trim_fn(&self) -> Option<&'static str> {
        self.trim_fn
    }

    pub fn modulo_fn(&self) -> Option<&'static str> {
        self.modulo_fn
    }

    /// Quotes an identifier, doubling any embedded closing quote.
    pub fn quote(&self, ident: &str) -> String {
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(self.quote_open);
        for c in ident.chars() {
            out.push(c);
            if c == self.quote_close {
                out.push(self.quote_close);
            }
        }
        out.push(self.quote_close);
        out
    }

    /// The SQL spelling of a named parameter.
    pub fn format_param(&self, name: &str) -> String {
        format!("{}{}", self.param_prefix, name)
    }

    /// Folds already-emitted fragments into the engine's concatenation form.
    pub fn concat(&self, parts: &[String]) -> String {
        match self.concat_style {
            ConcatStyle::Plus => format!("({})", parts.join(" + ")),
            ConcatStyle::Pipes => format!("({})", parts.join(" || ")),
            ConcatStyle::Function => format!("CONCAT({})", parts.join(", ")),
        }
    }

    /// Builds the right-hand side of a `LIKE` from literal and computed
    /// pieces, e.g. `'%' + @p + '%'` on SQL Server.
    pub fn like_pattern(&self, pieces: &[PatternPiece]) -> String {
        let rendered: Vec<String> = pieces
            .iter()
            .map(|piece| match piece {
                PatternPiece::Lit(text) => format!("'{}'", text.replace('\'', "''")),
                PatternPiece::Frag(frag) => frag.clone(),
            })
            .collect();

        match self.concat_style {
            ConcatStyle::Plus => rendered.join(" + "),
            ConcatStyle::Pipes => rendered.join(" || "),
            ConcatStyle::Function => format!("CONCAT({})", rendered.join(", ")),
        }
    }

    /// Escapes `LIKE` wildcards in a constant needle. Returns the escaped
    /// text and whether the statement needs an `ESCAPE '\'` clause.
    ///
    /// The bracket-quoting family (SQL Server, Sybase, Access) escapes with
    /// `[..]` and needs no clause; everyone else uses backslash escapes.
    pub fn escape_like(&self, needle: &str) -> (String, bool) {
        let brackets = matches!(self.engine, Engine::SqlServer | Engine::Sybase | Engine::Access);
        let mut escaped = String::with_capacity(needle.len());
        let mut used_escape = false;

        for c in needle.chars() {
            match c {
                '%' | '_' => {
                    if brackets {
                        escaped.push('[');
                        escaped.push(c);
                        escaped.push(']');
                    } else {
                        escaped.push('\\');
                        escaped.push(c);
                        used_escape = true;
                    }
                }
                '[' if brackets => {
                    escaped.push_str("[[]");
                }
                '\\' if !brackets => {
                    escaped.push_str("\\\\");
                    used_escape = true;
                }
                _ => escaped.push(c),
            }
        }

        (escaped, used_escape)
    }

    /// Assembles the final statement, applying the engine's pagination
    /// shape. `take`/`skip` of `None` mean unbounded.
    pub fn page(&self, parts: &SelectParts, take: Option<u64>, skip: Option<u64>) -> Result<String> {
        if take.is_none() && skip.is_none() {
            return Ok(parts.render());
        }

        match self.engine {
            Engine::MySql => {
                let mut sql = parts.render();
                match (take, skip) {
                    (Some(t), None) => sql.push_str(&format!(" LIMIT {t}")),
                    (Some(t), Some(s)) => sql.push_str(&format!(" LIMIT {t} OFFSET {s}")),
                    // MySQL has no bare OFFSET; an unreachable upper bound
                    // stands in for "no limit".
                    (None, Some(s)) => sql.push_str(&format!(" LIMIT {} OFFSET {s}", i64::MAX)),
                    (None, None) => unreachable!(),
                }
                Ok(sql)
            }
            Engine::Sqlite => {
                let mut sql = parts.render();
                match (take, skip) {
                    (Some(t), None) => sql.push_str(&format!(" LIMIT {t}")),
                    (Some(t), Some(s)) => sql.push_str(&format!(" LIMIT {t} OFFSET {s}")),
                    (None, Some(s)) => sql.push_str(&format!(" LIMIT -1 OFFSET {s}")),
                    (None, None) => unreachable!(),
                }
                Ok(sql)
            }
            Engine::Normal | Engine::PostgreSql => {
                let mut sql = parts.render();
                if let Some(t) = take {
                    sql.push_str(&format!(" LIMIT {t}"));
                }
                if let Some(s) = skip {
                    sql.push_str(&format!(" OFFSET {s}"));
                }
                Ok(sql)
            }
            Engine::SqlServer => match skip {
                None | Some(0) => {
                    let take = take.expect("skipless pagination always has a take");
                    let mut sql = String::from("SELECT ");
                    if parts.distinct {
                        sql.push_str("DISTINCT ");
                    }
                    sql.push_str(&format!("TOP ({take}) "));
                    sql.push_str(&parts.projection);
                    sql.push_str(&parts.body);
                    if let Some(order) = &parts.order_by {
                        sql.push_str(" ORDER BY ");
                        sql.push_str(order);
                    }
                    Ok(sql)
                }
                Some(s) => {
                    // OFFSET .. FETCH is only valid after ORDER BY.
                    let mut with_order = parts.clone();
                    if with_order.order_by.is_none() {
                        with_order.order_by = Some("(SELECT NULL)".to_string());
                    }
                    let mut sql = with_order.render();
                    sql.push_str(&format!(" OFFSET {s} ROWS"));
                    if let Some(t) = take {
                        sql.push_str(&format!(" FETCH NEXT {t} ROWS ONLY"));
                    }
                    Ok(sql)
                }
            },
            Engine::Db2 => {
                let mut sql = parts.render();
                if let Some(s) = skip {
                    sql.push_str(&format!(" OFFSET {s} ROWS"));
                }
                if let Some(t) = take {
                    sql.push_str(&format!(" FETCH FIRST {t} ROWS ONLY"));
                }
                Ok(sql)
            }
            Engine::Oracle => {
                let inner = parts.render();
                match skip {
                    None | Some(0) => {
                        let take = take.expect("skipless pagination always has a take");
                        Ok(format!("SELECT * FROM ({inner}) WHERE ROWNUM <= {take}"))
                    }
                    Some(s) => {
                        let upper = match take {
                            Some(t) => format!(" WHERE ROWNUM <= {}", s + t),
                            None => String::new(),
                        };
                        Ok(format!(
                            "SELECT * FROM (SELECT inr_.*, ROWNUM rnum_ FROM ({inner}) inr_{upper}) WHERE rnum_ > {s}"
                        ))
                    }
                }
            }
            Engine::Sybase | Engine::Access => match skip {
                None | Some(0) => {
                    let take = take.expect("skipless pagination always has a take");
                    let mut sql = String::from("SELECT ");
                    if parts.distinct {
                        sql.push_str("DISTINCT ");
                    }
                    sql.push_str(&format!("TOP {take} "));
                    sql.push_str(&parts.projection);
                    sql.push_str(&parts.body);
                    if let Some(order) = &parts.order_by {
                        sql.push_str(" ORDER BY ");
                        sql.push_str(order);
                    }
                    Ok(sql)
                }
                Some(_) => Err(Error::unsupported(format!(
                    "the {} engine has no offset pagination clause",
                    self.engine
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> SelectParts {
        SelectParts {
            distinct: false,
            projection: "t0.`id`".to_string(),
            body: " FROM `orders` t0".to_string(),
            order_by: None,
        }
    }

    #[test]
    fn quoting_doubles_embedded_closing_quotes() {
        assert_eq!("[weird]]name]", DialectProfile::sql_server().quote("weird]name"));
        assert_eq!("`musti`", DialectProfile::mysql().quote("musti"));
        assert_eq!("\"musti\"", DialectProfile::postgres().quote("musti"));
    }

    #[test]
    fn oracle_parameters_use_colon_prefix() {
        assert_eq!(":Status", DialectProfile::oracle().format_param("Status"));
        assert_eq!("@Status", DialectProfile::sql_server().format_param("Status"));
    }

    #[test]
    fn mysql_skip_without_take_uses_unreachable_limit() {
        let sql = DialectProfile::mysql().page(&parts(), None, Some(10)).unwrap();
        assert_eq!(
            "SELECT t0.`id` FROM `orders` t0 LIMIT 9223372036854775807 OFFSET 10",
            sql
        );
    }

    #[test]
    fn sqlite_skip_without_take_uses_negative_limit() {
        let sql = DialectProfile::sqlite().page(&parts(), None, Some(10)).unwrap();
        assert_eq!("SELECT t0.`id` FROM `orders` t0 LIMIT -1 OFFSET 10", sql);
    }

    #[test]
    fn sql_server_take_becomes_top() {
        let sql = DialectProfile::sql_server().page(&parts(), Some(5), None).unwrap();
        assert_eq!("SELECT TOP (5) t0.`id` FROM `orders` t0", sql);
    }

    #[test]
    fn sql_server_offset_fetch_injects_order_when_missing() {
        let sql = DialectProfile::sql_server().page(&parts(), Some(5), Some(10)).unwrap();
        assert_eq!(
            "SELECT t0.`id` FROM `orders` t0 ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY",
            sql
        );
    }

    #[test]
    fn oracle_take_and_skip_nest_rownum_wrappers() {
        let sql = DialectProfile::oracle().page(&parts(), Some(5), Some(10)).unwrap();
        assert_eq!(
            "SELECT * FROM (SELECT inr_.*, ROWNUM rnum_ FROM (SELECT t0.`id` FROM `orders` t0) inr_ WHERE ROWNUM <= 15) WHERE rnum_ > 10",
            sql
        );
    }

    #[test]
    fn sybase_offset_is_unsupported() {
        let err = DialectProfile::sybase().page(&parts(), Some(5), Some(10)).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::UnsupportedOperator(_)
        ));
    }

    #[test]
    fn like_escaping_is_bracket_style_on_sql_server() {
        let (escaped, clause) = DialectProfile::sql_server().escape_like("100%_[x]");
        assert_eq!("100[%][_][[]x]", escaped);
        assert!(!clause);
    }

    #[test]
    fn like_escaping_is_backslash_style_elsewhere() {
        let (escaped, clause) = DialectProfile::postgres().escape_like("100%_");
        assert_eq!("100\\%\\_", escaped);
        assert!(clause);
    }

    #[test]
    fn pattern_concatenation_follows_the_engine_style() {
        let pieces = vec![
            PatternPiece::Lit("%".to_string()),
            PatternPiece::Frag("t0.`code`".to_string()),
            PatternPiece::Lit("%".to_string()),
        ];

        assert_eq!(
            "'%' + t0.`code` + '%'",
            DialectProfile::sql_server().like_pattern(&pieces)
        );
        assert_eq!(
            "CONCAT('%', t0.`code`, '%')",
            DialectProfile::mysql().like_pattern(&pieces)
        );
        assert_eq!(
            "'%' || t0.`code` || '%'",
            DialectProfile::postgres().like_pattern(&pieces)
        );
    }
}
