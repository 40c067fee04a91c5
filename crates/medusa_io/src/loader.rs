use crate::parser::load_dimacs_file;
use anyhow::{Context, Result};
use medusa_core::cnf::CnfProblem;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Loads a packed binary CNF file.
pub fn load_packed<P: AsRef<Path>>(path: P) -> Result<CnfProblem> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open packed CNF {}", path.display()))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    let problem = CnfProblem::from_packed(&buffer)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    log::debug!(
        "loaded {}: {} variables, {} clauses",
        path.display(),
        problem.num_var(),
        problem.num_cls()
    );
    Ok(problem)
}

/// Writes a problem in packed binary form, replacing any existing file.
pub fn save_packed<P: AsRef<Path>>(problem: &CnfProblem, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = problem.to_packed().context("Problem does not fit the packed encoding")?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Converts a DIMACS file into the packed binary form.
///
/// # Returns
///
/// The converted problem, so callers can report its dimensions.
pub fn convert_dimacs<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<CnfProblem> {
    let problem = load_dimacs_file(input)?;
    save_packed(&problem, output)?;
    Ok(problem)
}

/// Loads a problem from either format.
///
/// Files with a `.cnf` or `.dimacs` extension are parsed as DIMACS text,
/// anything else is read as packed binary.
pub fn load_problem<P: AsRef<Path>>(path: P) -> Result<CnfProblem> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("cnf") || ext.eq_ignore_ascii_case("dimacs") => {
            load_dimacs_file(path)
        }
        _ => load_packed(path),
    }
}
