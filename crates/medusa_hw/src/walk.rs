//! ProbSAT local search standing in for the analog oscillator dynamics.
//!
//! The tile settles into a low-energy state by continuously nudging the
//! variables of unsatisfied clauses. The model reproduces that with a
//! probabilistic walk: pick a broken clause, score each of its variables by
//! how many satisfied clauses flipping it would break, and flip one with
//! probability proportional to its score. Occurrence lists and per-clause
//! satisfaction counts keep each flip proportional to the variable degree.

use medusa_core::cnf::Clause;
use rand::Rng;

/// Break-count base by average clause length, interpolated linearly.
const CB_VALUES: [(f64, f64); 6] = [
    (0.0, 2.00),
    (3.0, 2.50),
    (4.0, 2.85),
    (5.0, 3.70),
    (6.0, 5.10),
    (7.0, 7.40),
];

fn fit_cb_value(size: f64) -> f64 {
    let mut i = 0;
    while i + 2 < CB_VALUES.len() && (CB_VALUES[i].0 > size || CB_VALUES[i + 1].0 < size) {
        i += 1;
    }
    let (x1, y1) = CB_VALUES[i];
    let (x2, y2) = CB_VALUES[i + 1];
    (y2 - y1) * (size - x1) / (x2 - x1) + y1
}

/// Occurrence-list index of a literal: `2v` positive, `2v + 1` negated.
fn occurs_index(literal: i32) -> usize {
    let var = literal.unsigned_abs() as usize - 1;
    if literal > 0 { 2 * var } else { 2 * var + 1 }
}

/// Final state of a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Value of variable `i + 1` at index `i`.
    pub values: Vec<bool>,
    /// Flips performed.
    pub flips: u64,
    /// True when every clause is satisfied.
    pub solved: bool,
}

struct Walker<'a> {
    clauses: &'a [Clause],
    values: Vec<bool>,
    occurs: Vec<Vec<usize>>,
    sat_count: Vec<u32>,
    broken: Vec<usize>,
    broken_pos: Vec<Option<usize>>,
    scores: Vec<f64>,
    epsilon: f64,
}

impl<'a> Walker<'a> {
    fn new<R: Rng>(clauses: &'a [Clause], num_var: usize, rng: &mut R) -> Self {
        let values: Vec<bool> = (0..num_var).map(|_| rng.r#gen()).collect();
        let mut walker = Walker {
            clauses,
            values,
            occurs: vec![Vec::new(); 2 * num_var],
            sat_count: vec![0; clauses.len()],
            broken: Vec::new(),
            broken_pos: vec![None; clauses.len()],
            scores: Vec::new(),
            epsilon: 0.0,
        };

        let mut total = 0usize;
        for (ci, clause) in clauses.iter().enumerate() {
            total += clause.len();
            for &literal in clause {
                walker.occurs[occurs_index(literal)].push(ci);
                if walker.literal_true(literal) {
                    walker.sat_count[ci] += 1;
                }
            }
            if walker.sat_count[ci] == 0 {
                walker.add_broken(ci);
            }
        }

        let avg = if clauses.is_empty() {
            3.0
        } else {
            total as f64 / clauses.len() as f64
        };
        walker.populate_scores(fit_cb_value(avg));
        walker
    }

    fn populate_scores(&mut self, cb: f64) {
        let base = 1.0 / cb;
        let mut score = 1.0;
        while score > 1e-300 {
            self.scores.push(score);
            score *= base;
        }
        self.epsilon = score.max(1e-300);
    }

    fn score(&self, breaks: usize) -> f64 {
        self.scores.get(breaks).copied().unwrap_or(self.epsilon)
    }

    fn literal_true(&self, literal: i32) -> bool {
        let value = self.values[literal.unsigned_abs() as usize - 1];
        if literal > 0 { value } else { !value }
    }

    fn add_broken(&mut self, ci: usize) {
        if self.broken_pos[ci].is_none() {
            self.broken_pos[ci] = Some(self.broken.len());
            self.broken.push(ci);
        }
    }

    fn remove_broken(&mut self, ci: usize) {
        if let Some(pos) = self.broken_pos[ci].take() {
            self.broken.swap_remove(pos);
            if let Some(&moved) = self.broken.get(pos) {
                self.broken_pos[moved] = Some(pos);
            }
        }
    }

    /// Satisfied clauses that flipping `var` would break.
    fn break_value(&self, var: usize) -> usize {
        let true_idx = if self.values[var] { 2 * var } else { 2 * var + 1 };
        self.occurs[true_idx]
            .iter()
            .filter(|&&ci| self.sat_count[ci] == 1)
            .count()
    }

    fn flip(&mut self, var: usize) {
        let was_true = if self.values[var] { 2 * var } else { 2 * var + 1 };
        let now_true = was_true ^ 1;
        self.values[var] = !self.values[var];

        for i in 0..self.occurs[was_true].len() {
            let ci = self.occurs[was_true][i];
            self.sat_count[ci] -= 1;
            if self.sat_count[ci] == 0 {
                self.add_broken(ci);
            }
        }
        for i in 0..self.occurs[now_true].len() {
            let ci = self.occurs[now_true][i];
            if self.sat_count[ci] == 0 {
                self.remove_broken(ci);
            }
            self.sat_count[ci] += 1;
        }
    }

    fn step<R: Rng>(&mut self, rng: &mut R) {
        let ci = self.broken[rng.gen_range(0..self.broken.len())];
        let clause = &self.clauses[ci];

        let candidates: Vec<(usize, f64)> = clause
            .iter()
            .map(|l| {
                let var = l.unsigned_abs() as usize - 1;
                (var, self.score(self.break_value(var)))
            })
            .collect();
        let sum: f64 = candidates.iter().map(|c| c.1).sum();

        let mut threshold = rng.r#gen::<f64>() * sum;
        let mut chosen = candidates[candidates.len() - 1].0;
        for &(var, score) in &candidates {
            if threshold < score {
                chosen = var;
                break;
            }
            threshold -= score;
        }
        self.flip(chosen);
    }
}

/// Walks from a random assignment until every clause is satisfied or the
/// flip budget runs out.
///
/// Clauses must be non-empty and reference variables `1..=num_var` only.
///
/// # Arguments
///
/// * `clauses` - Clauses to satisfy
/// * `num_var` - Number of variables in the assignment
/// * `rng` - Source of the initial assignment and of every flip choice
/// * `flip_limit` - Largest number of flips attempted
pub fn probsat<R: Rng>(clauses: &[Clause], num_var: usize, rng: &mut R, flip_limit: u64) -> WalkOutcome {
    let mut walker = Walker::new(clauses, num_var, rng);
    let mut flips = 0;
    while !walker.broken.is_empty() && flips < flip_limit {
        walker.step(rng);
        flips += 1;
    }
    WalkOutcome {
        solved: walker.broken.is_empty(),
        values: walker.values,
        flips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn satisfies(clauses: &[Clause], values: &[bool]) -> bool {
        clauses.iter().all(|c| {
            c.iter().any(|&l| {
                let v = values[l.unsigned_abs() as usize - 1];
                if l > 0 { v } else { !v }
            })
        })
    }

    #[test]
    fn solves_small_satisfiable_formula() {
        let clauses = vec![
            vec![1, -2, 3],
            vec![-1, 2],
            vec![2, -3, 4],
            vec![-4, -1],
            vec![3, 4],
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let out = probsat(&clauses, 4, &mut rng, 10_000);
        assert!(out.solved);
        assert!(satisfies(&clauses, &out.values));
    }

    #[test]
    fn unsatisfiable_formula_exhausts_budget() {
        let clauses = vec![vec![1], vec![-1]];
        let mut rng = StdRng::seed_from_u64(1);
        let out = probsat(&clauses, 1, &mut rng, 50);
        assert!(!out.solved);
        assert_eq!(out.flips, 50);
    }

    #[test]
    fn same_seed_same_walk() {
        let clauses = vec![vec![1, 2], vec![-1, 3], vec![-2, -3], vec![2, 3]];
        let a = probsat(&clauses, 3, &mut StdRng::seed_from_u64(42), 1000);
        let b = probsat(&clauses, 3, &mut StdRng::seed_from_u64(42), 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn cb_interpolates_between_table_points() {
        assert!((fit_cb_value(3.0) - 2.5).abs() < 1e-9);
        assert!((fit_cb_value(3.5) - 2.675).abs() < 1e-9);
    }
}
