//! Statement classification and translation from `format` / `pyformat` placeholders
//! (`%s`, `%(name)s`) to Cloud Spanner's `@a0 … @aN` parameters.
use std::collections::BTreeMap;
use std::fmt::Debug;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

use crate::params::cast_for_spanner;
use crate::parser::parse_values;
use crate::{Error, Param, Params, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// `CREATE`, `ALTER` or `DROP`; batched and sent through the database admin API.
    Ddl,
    Insert,
    /// `SELECT` or `WITH`.
    Query,
    /// Any other DML.
    Update,
}

/// Decides how a statement is executed.
///
/// The default implementation treats every statement starting with `WITH` as a query. Implement
/// this trait to route `WITH … UPDATE` style statements as DML instead.
pub trait Classify: Debug + Send + Sync {
    fn classify(&self, sql: &str) -> StatementKind;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl Classify for DefaultClassifier {
    fn classify(&self, sql: &str) -> StatementKind {
        classify(sql)
    }
}

/// Classifies `sql` by its first keyword.
pub fn classify(sql: &str) -> StatementKind {
    match first_keyword(sql).to_ascii_uppercase().as_str() {
        "CREATE" | "ALTER" | "DROP" => StatementKind::Ddl,
        "INSERT" => StatementKind::Insert,
        "SELECT" | "WITH" => StatementKind::Query,
        _ => StatementKind::Update,
    }
}

fn first_keyword(sql: &str) -> &str {
    let sql = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let end = sql
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(sql.len());
    &sql[..end]
}

static UNICODE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\s]*[^\x00-\x7F]+[^\s]*").expect("valid regex"));

static INSERT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*INSERT\s+INTO\s+(?P<table_name>[^\s\(\)]+)\s*\((?P<columns>[^\(\)]+)\)")
        .expect("valid regex")
});

static VALUES_TILL_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)VALUES\s*\(.+$").expect("valid regex"));

/// Wraps every whitespace delimited word containing non-ASCII characters in backticks,
/// unless it is already quoted.
pub fn backtick_unicode(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last_end = 0;
    for m in UNICODE_WORD.find_iter(sql) {
        out.push_str(&sql[last_end..m.start()]);
        let word = m.as_str();
        if word.starts_with('`') || word.ends_with('`') {
            out.push_str(word);
        } else {
            out.push('`');
            out.push_str(word);
            out.push('`');
        }
        last_end = m.end();
    }
    out.push_str(&sql[last_end..]);
    out
}

/// Unescapes `%%` and quotes non-ASCII words so that the statement can be sent to Cloud Spanner.
pub fn sanitize(sql: &str) -> String {
    backtick_unicode(&sql.replace("%%", "%"))
}

enum Placeholder<'a> {
    Positional,
    Named(&'a str),
}

// Matches `%(name)s` at the start of `text`, returning the name.
fn named_placeholder(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("%(")?;
    let close = rest.find(|c: char| c == '(' || c == ')')?;
    let name = &rest[..close];
    if !name.is_empty() && rest[close..].starts_with(")s") {
        Some(name)
    } else {
        None
    }
}

// Splits `sql` around its placeholders; `%%` is left untouched.
fn placeholders(sql: &str) -> (Vec<&str>, Vec<Placeholder<'_>>) {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut found = Vec::new();
    let mut segment_start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] != b'%' {
            idx += 1;
            continue;
        }
        match bytes.get(idx + 1) {
            Some(b'%') => idx += 2,
            Some(b's') => {
                segments.push(&sql[segment_start..idx]);
                found.push(Placeholder::Positional);
                idx += 2;
                segment_start = idx;
            }
            Some(b'(') => match named_placeholder(&sql[idx..]) {
                Some(name) => {
                    segments.push(&sql[segment_start..idx]);
                    found.push(Placeholder::Named(name));
                    // `%(` + name + `)s`
                    idx += name.len() + 4;
                    segment_start = idx;
                }
                None => idx += 1,
            },
            _ => idx += 1,
        }
    }
    segments.push(&sql[segment_start..]);
    (segments, found)
}

/// Rewrites a non-`INSERT` statement's placeholders into `@a0 … @aN` parameters.
///
/// Named parameters are looked up by placeholder name; keys no placeholder refers to are dropped.
/// When named parameters are provided but the statement has no placeholders, the statement is
/// assumed to already use `@name` parameters and is passed through with the parameters untouched.
pub fn rewrite(sql: &str, params: &Params) -> Result<Statement, Error> {
    if params.is_empty() {
        return Ok(Statement::new(sanitize(sql)));
    }

    let (segments, found) = placeholders(sql);

    let values = match params {
        Params::None => Vec::new(),
        Params::Positional(positional) => {
            if positional.len() != found.len() {
                return Err(Error::Programming(format!(
                    "statement has {} placeholders but {} parameters were provided",
                    found.len(),
                    positional.len()
                )));
            }
            positional.clone()
        }
        Params::Named(named) if found.is_empty() => {
            let named = named
                .iter()
                .map(|(name, value)| (name.clone(), cast_for_spanner(value.clone())))
                .collect();
            return Ok(Statement::with_params(sanitize(sql), named));
        }
        Params::Named(named) => found
            .iter()
            .map(|placeholder| match placeholder {
                Placeholder::Named(name) => named.get(*name).cloned().ok_or_else(|| {
                    Error::Programming(format!("missing value for placeholder %({})s", name))
                }),
                Placeholder::Positional => Err(Error::Programming(
                    "positional placeholder %s used with named parameters".to_string(),
                )),
            })
            .collect::<Result<Vec<Param>, Error>>()?,
    };

    let mut out = String::with_capacity(sql.len());
    let mut bound = BTreeMap::new();
    for (idx, (segment, value)) in segments.iter().zip(values).enumerate() {
        let key = format!("a{}", idx);
        out.push_str(segment);
        out.push('@');
        out.push_str(&key);
        bound.insert(key, cast_for_spanner(value));
    }
    out.push_str(segments[found.len()]);

    Ok(Statement::with_params(sanitize(&out), bound))
}

/// Splits an `INSERT` into the statements to execute, one per row when the statement
/// carries several `VALUES` groups.
pub fn rewrite_insert(sql: &str, params: &Params) -> Result<Vec<Statement>, Error> {
    let positional = match params {
        Params::Named(_) => return rewrite(sql, params).map(|statement| vec![statement]),
        Params::None => &[][..],
        Params::Positional(values) => values.as_slice(),
    };

    let captures = INSERT.captures(sql).ok_or_else(|| {
        Error::Programming(format!("could not parse an INSERT statement from {:?}", sql))
    })?;

    let values_match = match VALUES_TILL_END.find(sql) {
        Some(m) => m,
        // INSERT … SELECT …
        None => return rewrite(sql, params).map(|statement| vec![statement]),
    };

    if positional.is_empty() {
        let count = values_match.as_str().matches("%s").count();
        if count > 0 {
            return Err(Error::Programming(format!(
                "no parameters provided yet there are {} %s placeholders",
                count
            )));
        }
        return Ok(vec![Statement::new(sanitize(sql))]);
    }

    let values = parse_values(values_match.as_str())?;

    if values.is_homogeneous() {
        let first = &values.groups()[0];
        let stride = first.len();
        if stride == 0 || positional.len() % stride != 0 {
            return Err(Error::Programming(format!(
                "invalid length: {} parameters is not a multiple of {} placeholders",
                positional.len(),
                stride
            )));
        }
        let template = format!(
            "INSERT INTO {} ({}) VALUES {}",
            &captures["table_name"],
            &captures["columns"],
            first.raw()
        );
        return positional
            .chunks(stride)
            .map(|row| rewrite(&template, &Params::Positional(row.to_vec())))
            .collect();
    }

    let total = values.placeholder_count();
    if total != positional.len() {
        return Err(Error::Programming(format!(
            "invalid length: VALUES(...) has {} placeholders but {} parameters were provided",
            total,
            positional.len()
        )));
    }

    let before_values = sql[..values_match.start()].trim_end();
    let mut remaining = positional;
    values
        .groups()
        .iter()
        .map(|group| {
            let (row, rest) = remaining.split_at(group.placeholder_count());
            remaining = rest;
            rewrite(
                &format!("{} VALUES {}", before_values, group.raw()),
                &Params::Positional(row.to_vec()),
            )
        })
        .collect()
}

/// Appends `WHERE 1=1` to `UPDATE` and `DELETE` statements lacking a top level `WHERE` clause,
/// since Cloud Spanner rejects unqualified DML.
pub fn ensure_where_clause(sql: &str) -> Result<String, Error> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|err| Error::Programming(format!("could not tokenize {:?}: {}", sql, err)))?;

    let mut words = tokens.iter().filter_map(|token| match token {
        Token::Word(word) => Some(word.keyword),
        _ => None,
    });
    if !matches!(words.next(), Some(Keyword::UPDATE) | Some(Keyword::DELETE)) {
        return Ok(sql.to_string());
    }

    let mut depth = 0_i32;
    for token in &tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::Word(word) if depth == 0 && word.keyword == Keyword::WHERE => {
                return Ok(sql.to_string())
            }
            _ => {}
        }
    }

    // a trailing line comment would swallow the clause
    let ends_in_line_comment = tokens
        .iter()
        .rev()
        .find(|token| {
            !matches!(
                token,
                Token::Whitespace(Whitespace::Space | Whitespace::Newline | Whitespace::Tab)
            )
        })
        .map_or(false, |token| {
            matches!(token, Token::Whitespace(Whitespace::SingleLineComment { .. }))
        });
    let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
    if ends_in_line_comment {
        Ok(format!("{}\nWHERE 1=1", trimmed))
    } else {
        Ok(format!("{} WHERE 1=1", trimmed))
    }
}

const RESERVED_KEYWORDS: &[&str] = &[
    "ALL",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "ASC",
    "ASSERT_ROWS_MODIFIED",
    "AT",
    "BETWEEN",
    "BY",
    "CASE",
    "CAST",
    "COLLATE",
    "CONTAINS",
    "CREATE",
    "CROSS",
    "CUBE",
    "CURRENT",
    "DEFAULT",
    "DEFINE",
    "DESC",
    "DISTINCT",
    "DROP",
    "ELSE",
    "END",
    "ENUM",
    "ESCAPE",
    "EXCEPT",
    "EXCLUDE",
    "EXISTS",
    "EXTRACT",
    "FALSE",
    "FETCH",
    "FOLLOWING",
    "FOR",
    "FROM",
    "FULL",
    "GROUP",
    "GROUPING",
    "GROUPS",
    "HASH",
    "HAVING",
    "IF",
    "IGNORE",
    "IN",
    "INNER",
    "INTERSECT",
    "INTERVAL",
    "INTO",
    "IS",
    "JOIN",
    "LATERAL",
    "LEFT",
    "LIKE",
    "LIMIT",
    "LOOKUP",
    "MERGE",
    "NATURAL",
    "NEW",
    "NO",
    "NOT",
    "NULL",
    "NULLS",
    "OF",
    "ON",
    "OR",
    "ORDER",
    "OUTER",
    "OVER",
    "PARTITION",
    "PRECEDING",
    "PROTO",
    "RANGE",
    "RECURSIVE",
    "RESPECT",
    "RIGHT",
    "ROLLUP",
    "ROWS",
    "SELECT",
    "SET",
    "SOME",
    "STRUCT",
    "TABLESAMPLE",
    "THEN",
    "TO",
    "TREAT",
    "TRUE",
    "UNBOUNDED",
    "UNION",
    "UNNEST",
    "USING",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
    "WITHIN",
];

/// Quotes `name` with backticks when it contains `-` or a space, or is a reserved keyword.
pub fn escape_name(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    if name.contains('-') || name.contains(' ') || RESERVED_KEYWORDS.contains(&upper.as_str()) {
        format!("`{}`", name)
    } else {
        name.to_string()
    }
}

/// The inverse of [`escape_name`].
pub fn strip_backticks(name: &str) -> &str {
    if name.len() >= 2 && name.starts_with('`') && name.ends_with('`') {
        &name[1..name.len() - 1]
    } else {
        name
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{named_params, params, Type};

    #[test]
    fn test_classify() {
        assert_eq!(classify("  create table t (a INT64) PRIMARY KEY (a)"), StatementKind::Ddl);
        assert_eq!(classify("ALTER TABLE t ADD COLUMN b STRING(MAX)"), StatementKind::Ddl);
        assert_eq!(classify("DROP INDEX i"), StatementKind::Ddl);
        assert_eq!(classify("insert into t (a) values (1)"), StatementKind::Insert);
        assert_eq!(classify("SELECT 1"), StatementKind::Query);
        assert_eq!(classify("(SELECT 1) UNION ALL (SELECT 2)"), StatementKind::Query);
        assert_eq!(classify("WITH x AS (SELECT 1) SELECT * FROM x"), StatementKind::Query);
        assert_eq!(classify("UPDATE t SET a = 1 WHERE b = 2"), StatementKind::Update);
        assert_eq!(classify("DELETE FROM t"), StatementKind::Update);
        assert_eq!(classify("SELECTED"), StatementKind::Update);
    }

    #[test]
    fn test_positional_rewrite() {
        let statement =
            rewrite("SELECT * FROM t WHERE a=%s AND b=%s", &params![10, "x"]).unwrap();
        assert_eq!(statement.sql, "SELECT * FROM t WHERE a=@a0 AND b=@a1");
        assert_eq!(statement.params.get("a0"), Some(&Param::Int64(10)));
        assert_eq!(statement.params.get("a1"), Some(&Param::String("x".into())));
        assert_eq!(statement.param_types.get("a0"), Some(&Type::Int64));
        assert_eq!(statement.param_types.get("a1"), Some(&Type::String));
    }

    #[test]
    fn test_named_rewrite_ignores_extra_keys() {
        let statement = rewrite(
            "SELECT * FROM t WHERE a=%(x)s",
            &named_params! { "x" => "v", "y" => "ignored" },
        )
        .unwrap();
        assert_eq!(statement.sql, "SELECT * FROM t WHERE a=@a0");
        assert_eq!(statement.params.len(), 1);
        assert_eq!(statement.params.get("a0"), Some(&Param::String("v".into())));
    }

    #[test]
    fn test_named_rewrite_repeated_placeholder() {
        let statement = rewrite(
            "SELECT * FROM t WHERE a=%(x)s OR b=%(x)s",
            &named_params! { "x" => 1 },
        )
        .unwrap();
        assert_eq!(statement.sql, "SELECT * FROM t WHERE a=@a0 OR b=@a1");
        assert_eq!(statement.params.len(), 2);
    }

    #[test]
    fn test_native_named_params_pass_through() {
        let statement = rewrite(
            "SELECT * FROM t WHERE a=@name",
            &named_params! { "name" => "v" },
        )
        .unwrap();
        assert_eq!(statement.sql, "SELECT * FROM t WHERE a=@name");
        assert_eq!(statement.param_types.get("name"), Some(&Type::String));
    }

    #[test]
    fn test_rewrite_errors() {
        assert!(matches!(
            rewrite("SELECT %s, %s", &params![1]),
            Err(Error::Programming(_))
        ));
        assert!(matches!(
            rewrite("SELECT %(a)s", &named_params! { "b" => 1 }),
            Err(Error::Programming(_))
        ));
        assert!(matches!(
            rewrite("SELECT %(a)s, %s", &named_params! { "a" => 1 }),
            Err(Error::Programming(_))
        ));
    }

    #[test]
    fn test_no_params_sanitizes() {
        let statement = rewrite("SELECT '100%%' FROM föö", &Params::None).unwrap();
        assert_eq!(statement.sql, "SELECT '100%' FROM `föö`");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_literal_percent_paren() {
        let statement = rewrite("SELECT * FROM t WHERE a LIKE '%(' AND b=%s", &params![1]).unwrap();
        assert_eq!(statement.sql, "SELECT * FROM t WHERE a LIKE '%(' AND b=@a0");
    }

    #[test]
    fn test_escaped_percent_is_not_a_placeholder() {
        let statement = rewrite("SELECT '%%s', %s", &params![1]).unwrap();
        assert_eq!(statement.sql, "SELECT '%s', @a0");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let inputs = vec![
            ("SELECT * FROM t WHERE a=%s AND b=%s", params![10, "x"]),
            ("SELECT * FROM t WHERE a=%(x)s", named_params! { "x" => "v" }),
            ("SELECT * FROM föö WHERE `bär`=%s", params![true]),
            ("UPDATE t SET a=%s WHERE b=%s", params![1.5, 2]),
        ];
        for (sql, params) in inputs {
            let once = rewrite(sql, &params).unwrap();
            let twice = rewrite(&once.sql, &Params::Named(once.params.clone())).unwrap();
            assert_eq!(once, twice, "{}", sql);
        }
    }

    #[test]
    fn test_backtick_unicode() {
        assert_eq!(backtick_unicode("SELECT * FROM t"), "SELECT * FROM t");
        assert_eq!(
            backtick_unicode("SELECT (föö) FROM `bär` WHERE x = 1"),
            "SELECT `(föö)` FROM `bär` WHERE x = 1"
        );
        assert_eq!(
            backtick_unicode("SELECT ünï, cödé FROM t"),
            "SELECT `ünï,` `cödé` FROM t"
        );
    }

    #[test]
    fn test_homogeneous_insert() {
        let statements =
            rewrite_insert("INSERT INTO T (a,b) VALUES (%s,%s)", &params![1, 2, 3, 4]).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "INSERT INTO T (a,b) VALUES (@a0,@a1)");
        assert_eq!(statements[1].sql, "INSERT INTO T (a,b) VALUES (@a0,@a1)");
        assert_eq!(statements[0].params.get("a0"), Some(&Param::Int64(1)));
        assert_eq!(statements[0].params.get("a1"), Some(&Param::Int64(2)));
        assert_eq!(statements[1].params.get("a0"), Some(&Param::Int64(3)));
        assert_eq!(statements[1].params.get("a1"), Some(&Param::Int64(4)));
    }

    #[test]
    fn test_homogeneous_insert_repeated_groups() {
        let statements = rewrite_insert(
            "INSERT INTO T (a, b) VALUES (%s, %s), (%s, %s), (%s, %s)",
            &params!["a", "b", "c", "d", "e", "f"],
        )
        .unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[2].sql, "INSERT INTO T (a, b) VALUES (@a0, @a1)");
        assert_eq!(statements[2].params.get("a1"), Some(&Param::String("f".into())));
    }

    #[test]
    fn test_homogeneous_insert_bad_stride() {
        assert!(matches!(
            rewrite_insert("INSERT INTO T (a,b) VALUES (%s,%s)", &params![1, 2, 3]),
            Err(Error::Programming(_))
        ));
    }

    #[test]
    fn test_heterogeneous_insert() {
        let statements = rewrite_insert(
            "INSERT INTO T (a,b) VALUES (%s, LOWER(%s)), (UPPER(%s), %s)",
            &params!["A", "B", "C", "D"],
        )
        .unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "INSERT INTO T (a,b) VALUES (@a0, LOWER(@a1))");
        assert_eq!(statements[1].sql, "INSERT INTO T (a,b) VALUES (UPPER(@a0), @a1)");
        assert_eq!(statements[0].params.get("a0"), Some(&Param::String("A".into())));
        assert_eq!(statements[0].params.get("a1"), Some(&Param::String("B".into())));
        assert_eq!(statements[1].params.get("a0"), Some(&Param::String("C".into())));
        assert_eq!(statements[1].params.get("a1"), Some(&Param::String("D".into())));
    }

    #[test]
    fn test_heterogeneous_insert_length_mismatch() {
        assert!(matches!(
            rewrite_insert(
                "INSERT INTO T (a,b) VALUES (%s, LOWER(%s)), (UPPER(%s), %s)",
                &params!["A", "B", "C"],
            ),
            Err(Error::Programming(_))
        ));
    }

    #[test]
    fn test_insert_without_params() {
        let statements =
            rewrite_insert("INSERT INTO T (f1, f2) VALUES (1, 2)", &Params::None).unwrap();
        assert_eq!(statements, vec![Statement::new("INSERT INTO T (f1, f2) VALUES (1, 2)")]);

        let sql = "INSERT INTO T (s, c) SELECT st, zc FROM cus ORDER BY fn, ln";
        let statements = rewrite_insert(sql, &Params::None).unwrap();
        assert_eq!(statements, vec![Statement::new(sql)]);

        assert!(matches!(
            rewrite_insert("INSERT INTO T (f1, f2) VALUES (%s, %s)", &Params::None),
            Err(Error::Programming(_))
        ));
    }

    #[test]
    fn test_insert_select_with_params() {
        let statements = rewrite_insert(
            "INSERT INTO T (a) SELECT a FROM u WHERE b = %s",
            &params![1],
        )
        .unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "INSERT INTO T (a) SELECT a FROM u WHERE b = @a0");
    }

    #[test]
    fn test_unparseable_insert() {
        assert!(matches!(
            rewrite_insert("INSERT T VALUES (%s)", &params![1]),
            Err(Error::Programming(_))
        ));
    }

    #[test]
    fn test_ensure_where_clause() {
        assert_eq!(ensure_where_clause("DELETE FROM t").unwrap(), "DELETE FROM t WHERE 1=1");
        assert_eq!(
            ensure_where_clause("DELETE FROM t WHERE id=1").unwrap(),
            "DELETE FROM t WHERE id=1"
        );
        assert_eq!(
            ensure_where_clause("UPDATE t SET a = (SELECT b FROM u WHERE c = 1);").unwrap(),
            "UPDATE t SET a = (SELECT b FROM u WHERE c = 1) WHERE 1=1"
        );
        assert_eq!(
            ensure_where_clause("UPDATE t /* WHERE */ SET a = 'WHERE'").unwrap(),
            "UPDATE t /* WHERE */ SET a = 'WHERE' WHERE 1=1"
        );
        assert_eq!(
            ensure_where_clause("DELETE FROM t -- purge everything").unwrap(),
            "DELETE FROM t -- purge everything\nWHERE 1=1"
        );
        assert_eq!(
            ensure_where_clause("UPDATE t SET a = 1 -- all of them\n").unwrap(),
            "UPDATE t SET a = 1 -- all of them\nWHERE 1=1"
        );
        assert_eq!(
            ensure_where_clause("SELECT * FROM t").unwrap(),
            "SELECT * FROM t"
        );
        assert!(matches!(
            ensure_where_clause("UPDATE t SET a = 'unterminated"),
            Err(Error::Programming(_))
        ));
    }

    #[test]
    fn test_escape_name() {
        assert_eq!(escape_name("SELECT"), "`SELECT`");
        assert_eq!(escape_name("dashed-value"), "`dashed-value`");
        assert_eq!(escape_name("with space"), "`with space`");
        assert_eq!(escape_name("no"), "`no`");
        assert_eq!(escape_name("name"), "name");
        assert_eq!(strip_backticks("`no`"), "no");
        assert_eq!(strip_backticks("name"), "name");
    }
}
