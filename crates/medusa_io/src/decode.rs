use bitvec::prelude::*;
use medusa_common::geometry::DOUT_WORDS;
use medusa_core::cnf::CnfProblem;

/// Variable assignment, bit `i` holding variable `i + 1`.
pub type Assignment = BitVec<u32, Lsb0>;

/// Outcome of checking an assignment against a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub satisfied: usize,
    pub total: usize,
}

impl Verdict {
    pub fn is_sat(&self) -> bool {
        self.satisfied == self.total
    }
}

/// Extracts the first `num_var` variable values from output-sample words.
///
/// Variables beyond the sampled width read as false.
pub fn assignment(outputs: &[u32; DOUT_WORDS], num_var: usize) -> Assignment {
    let bits = outputs.view_bits::<Lsb0>();
    let mut values = Assignment::with_capacity(num_var);
    values.extend(bits.iter().by_vals().take(num_var));
    values.resize(num_var, false);
    values
}

/// Packs an assignment back into output-sample words.
pub fn encode_assignment(values: &BitSlice<u32, Lsb0>) -> [u32; DOUT_WORDS] {
    let mut words = [0u32; DOUT_WORDS];
    let bits = words.view_bits_mut::<Lsb0>();
    for (i, value) in values.iter().by_vals().enumerate().take(bits.len()) {
        bits.set(i, value);
    }
    words
}

/// Counts the clauses an assignment satisfies.
pub fn verify(problem: &CnfProblem, values: &BitSlice<u32, Lsb0>) -> Verdict {
    let satisfied = problem.satisfied_count(|var| {
        var.checked_sub(1)
            .and_then(|i| values.get(i).map(|b| *b))
            .unwrap_or(false)
    });
    Verdict {
        satisfied,
        total: problem.num_cls(),
    }
}
