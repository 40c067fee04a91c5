//! Parser for DIMACS CNF files.
//!
//! Comment lines (`c ...`) are dropped and everything after a line starting
//! with `%` is ignored. The remaining text must be a `p cnf <vars> <clauses>`
//! header followed by whitespace-separated literals, each clause ended by
//! `0`.

use anyhow::{Context, Result, anyhow, bail};
use medusa_core::cnf::{Clause, CnfProblem};
use nom::IResult;
use nom::bytes::complete::tag;
use nom::character::complete::{i32 as literal_value, multispace0, space1, u32 as count};
use nom::combinator::all_consuming;
use nom::multi::many0;
use nom::sequence::{preceded, terminated};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

fn header(input: &str) -> IResult<&str, (u32, u32)> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag("p")(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag("cnf")(input)?;
    let (input, _) = space1(input)?;
    let (input, num_var) = count(input)?;
    let (input, _) = space1(input)?;
    let (input, num_cls) = count(input)?;
    Ok((input, (num_var, num_cls)))
}

fn literals(input: &str) -> IResult<&str, Vec<i32>> {
    terminated(many0(preceded(multispace0, literal_value)), multispace0)(input)
}

/// Removes comment lines and the `%` trailer.
fn strip_comments(text: &str) -> String {
    let mut body = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('%') {
            break;
        }
        if trimmed.starts_with('c') || trimmed.is_empty() {
            continue;
        }
        body.push_str(trimmed);
        body.push('\n');
    }
    body
}

/// Parses DIMACS text into a problem.
///
/// # Returns
///
/// An error when the header is missing, a token is not an integer, or the
/// number of clauses differs from the header.
pub fn parse_dimacs(text: &str) -> Result<CnfProblem> {
    let body = strip_comments(text);
    let (rest, (num_var, num_cls)) =
        header(&body).map_err(|e| anyhow!("missing or malformed p cnf header: {}", e))?;
    let (_, values) =
        all_consuming(literals)(rest).map_err(|e| anyhow!("malformed literal list: {}", e))?;

    let mut clauses: Vec<Clause> = Vec::with_capacity(num_cls as usize);
    let mut current = Vec::new();
    for v in values {
        if v == 0 {
            clauses.push(std::mem::take(&mut current));
        } else {
            current.push(v);
        }
    }
    if !current.is_empty() {
        clauses.push(current);
    }

    if clauses.len() != num_cls as usize {
        bail!(
            "header declares {} clauses, found {}",
            num_cls,
            clauses.len()
        );
    }
    Ok(CnfProblem::new(num_var as usize, clauses))
}

/// Loads and parses a DIMACS file.
pub fn load_dimacs_file<P: AsRef<Path>>(path: P) -> Result<CnfProblem> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to open DIMACS file {}", path.display()))?;
    parse_dimacs(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Renders a problem as DIMACS text.
pub fn to_dimacs(problem: &CnfProblem) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "p cnf {} {}", problem.num_var(), problem.num_cls());
    for clause in problem.clauses() {
        for literal in clause {
            let _ = write!(out, "{} ", literal);
        }
        out.push_str("0\n");
    }
    out
}
