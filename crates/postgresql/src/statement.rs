//! SQL text for COPY and TRUNCATE.

use parallel_copy_pipeline::{CopyTarget, Delimiter};

/// Double-quote an identifier, doubling any embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified_table(target: &CopyTarget) -> String {
    format!(
        "{}.{}",
        quote_identifier(&target.schema),
        quote_identifier(&target.table)
    )
}

/// The delimiter as a SQL string literal. Tab uses the escape form `E'\t'`.
pub fn delimiter_literal(delimiter: Delimiter) -> String {
    match delimiter.as_char() {
        '\t' => "E'\\t'".to_string(),
        '\'' => "''''".to_string(),
        c => format!("'{c}'"),
    }
}

/// `COPY "schema"."table"(cols) FROM STDIN WITH DELIMITER '<d>' <options>`
///
/// The column list and options are passed through verbatim.
pub fn copy_statement(target: &CopyTarget) -> String {
    let mut sql = format!("COPY {}", qualified_table(target));
    if let Some(columns) = &target.columns {
        sql.push('(');
        sql.push_str(columns);
        sql.push(')');
    }
    sql.push_str(" FROM STDIN WITH DELIMITER ");
    sql.push_str(&delimiter_literal(target.delimiter));

    let options = target.options.trim();
    if !options.is_empty() {
        sql.push(' ');
        sql.push_str(options);
    }
    sql
}

pub fn truncate_statement(target: &CopyTarget) -> String {
    format!("TRUNCATE {}", qualified_table(target))
}
