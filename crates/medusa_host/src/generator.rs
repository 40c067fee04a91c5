//! Benchmark formula generator.
//!
//! Produces uniform random k-SAT instances in DIMACS form, optionally with
//! a planted solution so every generated formula is known to be
//! satisfiable. Instances are sized for the tile geometry: the variable
//! count is bounded by the bit lines and the clause count by the word lines
//! of the chosen run mode.

use anyhow::{Result, ensure};
use medusa_core::cnf::{Clause, CnfProblem};
use medusa_io::parser::to_dimacs;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Shape of the generated instances.
#[derive(Debug, Clone, Copy)]
pub struct GenParams {
    pub num_var: usize,
    pub num_cls: usize,
    pub clause_len: usize,
    pub planted: bool,
}

/// Draws one random formula.
///
/// Each clause picks `clause_len` distinct variables and random polarities.
/// With a planted assignment, a clause the assignment falsifies has one
/// random literal flipped to satisfy it.
pub fn random_problem<R: Rng>(rng: &mut R, params: &GenParams) -> CnfProblem {
    let planted: Option<Vec<bool>> = params
        .planted
        .then(|| (0..params.num_var).map(|_| rng.r#gen()).collect());

    let clauses: Vec<Clause> = (0..params.num_cls)
        .map(|_| {
            let mut clause: Clause = sample(&mut *rng, params.num_var, params.clause_len)
                .into_iter()
                .map(|v| {
                    let var = (v + 1) as i32;
                    if rng.r#gen() { var } else { -var }
                })
                .collect();
            if let Some(truth) = &planted {
                let satisfied = clause
                    .iter()
                    .any(|&l| truth[l.unsigned_abs() as usize - 1] == (l > 0));
                if !satisfied {
                    let i = rng.gen_range(0..clause.len());
                    clause[i] = -clause[i];
                }
            }
            clause
        })
        .collect();

    CnfProblem::new(params.num_var, clauses)
}

/// Writes `count` instances named `uf<vars>-<clauses>-<n>.cnf` into `dir`.
///
/// # Arguments
///
/// * `dir` - Output directory, created if missing
/// * `params` - Instance shape
/// * `count` - Number of instances
/// * `seed` - Seed of the generator; equal seeds give identical files
///
/// # Returns
///
/// Ok(()) on success, or an error if the shape is invalid or file I/O fails.
pub fn generate_instances(dir: &Path, params: &GenParams, count: usize, seed: u64) -> Result<()> {
    ensure!(params.num_var > 0 && params.num_cls > 0, "empty instance shape");
    ensure!(
        (1..=params.num_var).contains(&params.clause_len),
        "clause length {} must be between 1 and {}",
        params.clause_len,
        params.num_var
    );

    fs::create_dir_all(dir)?;
    let mut rng = StdRng::seed_from_u64(seed);
    println!(
        "Generating {} instances: {} vars, {} clauses, k={}{}",
        count,
        params.num_var,
        params.num_cls,
        params.clause_len,
        if params.planted { " (planted)" } else { "" }
    );

    for n in 1..=count {
        let problem = random_problem(&mut rng, params);
        let name = format!("uf{}-{}-{:03}.cnf", params.num_var, params.num_cls, n);
        let mut file = BufWriter::new(File::create(dir.join(&name))?);
        writeln!(file, "c generated by medusa gen, seed {}", seed)?;
        file.write_all(to_dimacs(&problem).as_bytes())?;
        file.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use medusa_io::parser::load_dimacs_file;

    #[test]
    fn planted_instances_are_satisfiable_by_construction() {
        let params = GenParams {
            num_var: 20,
            num_cls: 91,
            clause_len: 3,
            planted: true,
        };
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let p = random_problem(&mut rng, &params);
            assert_eq!(p.num_cls(), 91);
            assert!(p.validate_single().is_ok());
            assert!(p.clauses().iter().all(|c| c.len() == 3));
        }
    }

    #[test]
    fn generated_files_parse() {
        let dir = tempfile::tempdir().unwrap();
        let params = GenParams {
            num_var: 10,
            num_cls: 30,
            clause_len: 3,
            planted: false,
        };
        generate_instances(dir.path(), &params, 2, 1).unwrap();

        let p = load_dimacs_file(dir.path().join("uf10-30-002.cnf")).unwrap();
        assert_eq!(p.num_var(), 10);
        assert_eq!(p.num_cls(), 30);
    }

    #[test]
    fn rejects_overlong_clauses() {
        let dir = tempfile::tempdir().unwrap();
        let params = GenParams {
            num_var: 2,
            num_cls: 1,
            clause_len: 3,
            planted: false,
        };
        assert!(generate_instances(dir.path(), &params, 1, 0).is_err());
    }
}
