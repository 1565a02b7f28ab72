use serde::Serialize;
use xorigin_bus::OriginPattern;

use crate::cmd::MatchArgs;
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::{print_rows, OutputFormat};

#[derive(Serialize)]
struct MatchRow {
    pattern: String,
    origin: String,
    matched: bool,
}

pub fn run(args: MatchArgs, format: OutputFormat) -> CliResult<i32> {
    let rows = evaluate(&args.origin, &args.patterns);
    let any = rows.iter().any(|row| row.matched);

    print_rows(
        &rows,
        &["PATTERN", "ORIGIN", "MATCHED"],
        |row| {
            vec![
                row.pattern.clone(),
                row.origin.clone(),
                row.matched.to_string(),
            ]
        },
        format,
    );

    Ok(if any { SUCCESS } else { FAILURE })
}

fn evaluate(origin: &str, patterns: &[String]) -> Vec<MatchRow> {
    patterns
        .iter()
        .map(|pattern| MatchRow {
            pattern: pattern.clone(),
            origin: origin.to_string(),
            matched: OriginPattern::compile(pattern).matches(origin),
        })
        .collect()
}
