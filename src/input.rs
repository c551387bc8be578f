//! # Request Input
//!
//! Requests come from a line-oriented input: one request per line in a
//! protocol-specific format, read from `--input` or from stdin until
//! EOF. The whole input is loaded up front; malformed lines are skipped
//! with a warning and at least one valid line is required.
//!
//! The loaded requests back a [`RequestGenerator`]: a logically infinite
//! sequence where index `i` maps to `requests[i % len]`. Each call hands
//! out a fresh clone, optionally transformed by modifiers (e.g. DNS
//! cache-busting), so the cached originals are never mutated.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::warn;

/// A deterministic, logically infinite request sequence.
pub type RequestGenerator<R> = Arc<dyn Fn(usize) -> R + Send + Sync>;

/// Rewrites a request right before it is handed out.
pub type Modifier<R> = Arc<dyn Fn(R) -> R + Send + Sync>;

/// Builds a round-robin request generator from a line-oriented input.
///
/// `transformer` converts one line into a request; lines it rejects are
/// skipped with a warning. When `input` is `None`, stdin is read to EOF.
pub fn request_generator<R, T>(
    input: Option<&Path>,
    transformer: T,
    modifiers: Vec<Modifier<R>>,
) -> Result<RequestGenerator<R>>
where
    R: Clone + Send + Sync + 'static,
    T: Fn(&str) -> Result<R>,
{
    let requests = match input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            parse(BufReader::new(file), &transformer)?
        }
        None => {
            eprintln!("Reading input lines until EOF:");
            parse(BufReader::new(std::io::stdin()), &transformer)?
        }
    };

    if requests.is_empty() {
        bail!("at least one valid input line is required");
    }

    Ok(Arc::new(move |i| {
        let mut request = requests[i % requests.len()].clone();
        for modifier in &modifiers {
            request = modifier(request);
        }
        request
    }))
}

fn parse<R, T>(reader: BufReader<impl Read>, transformer: &T) -> Result<Vec<R>>
where
    T: Fn(&str) -> Result<R>,
{
    let mut requests = Vec::new();
    for line in reader.lines() {
        let line = line.context("failed to read input line")?;
        match transformer(&line) {
            Ok(request) => requests.push(request),
            Err(err) => warn!(line, %err, "skipping malformed input line"),
        }
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn numbers_file(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        file
    }

    fn parse_number(line: &str) -> Result<u32> {
        line.trim().parse().context("not a number")
    }

    #[test]
    fn generator_round_robins_over_the_input() {
        let file = numbers_file("1\n2\n3\n");
        let generator = request_generator(Some(file.path()), parse_number, Vec::new()).unwrap();

        let drawn: Vec<u32> = (0..7).map(|i| generator(i)).collect();
        assert_eq!(drawn, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn generator_is_deterministic_per_index() {
        let file = numbers_file("10\n20\n");
        let generator = request_generator(Some(file.path()), parse_number, Vec::new()).unwrap();
        assert_eq!(generator(1), generator(1));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let file = numbers_file("1\nnot-a-number\n3\n");
        let generator = request_generator(Some(file.path()), parse_number, Vec::new()).unwrap();
        assert_eq!(generator(0), 1);
        assert_eq!(generator(1), 3);
    }

    #[test]
    fn an_input_without_valid_lines_is_rejected() {
        let file = numbers_file("nope\nstill no\n");
        let result = request_generator(Some(file.path()), parse_number, Vec::new());
        assert!(result
            .err()
            .unwrap()
            .to_string()
            .contains("at least one valid input line"));
    }

    #[test]
    fn modifiers_apply_in_order_to_a_fresh_clone() {
        let file = numbers_file("1\n");
        let double: Modifier<u32> = Arc::new(|n| n * 2);
        let increment: Modifier<u32> = Arc::new(|n| n + 1);
        let generator =
            request_generator(Some(file.path()), parse_number, vec![double, increment]).unwrap();

        // (1 * 2) + 1, recomputed per call from the cached original.
        assert_eq!(generator(0), 3);
        assert_eq!(generator(0), 3);
    }
}
