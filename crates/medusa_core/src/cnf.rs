//! CNF problem model.
//!
//! A problem is a variable count plus an ordered list of clauses, each a
//! list of non-zero signed literals. Validation against the tile geometry
//! happens here, before any register is touched. The packed binary form is
//! the on-wire and on-disk representation: little-endian `i16` variable
//! count, clause count, then the literals of each clause followed by a `0`
//! terminator.

use crate::MedusaError;
use alloc::vec::Vec;
use medusa_common::geometry::{MAX_CLS, MAX_CLS_LEN, MAX_VAR};

/// Signed variable reference; the sign carries the polarity.
pub type Literal = i32;

/// A disjunction of literals.
pub type Clause = Vec<Literal>;

/// A formula ready to be programmed into clause memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnfProblem {
    num_var: usize,
    clauses: Vec<Clause>,
}

impl CnfProblem {
    /// Creates a problem without validating it.
    pub fn new(num_var: usize, clauses: Vec<Clause>) -> Self {
        Self { num_var, clauses }
    }

    /// Declared variable count.
    pub fn num_var(&self) -> usize {
        self.num_var
    }

    /// Number of clauses.
    pub fn num_cls(&self) -> usize {
        self.clauses.len()
    }

    /// Clauses in programming order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Checks that the problem fits a tile holding at most `max_cls` clauses.
    ///
    /// # Returns
    ///
    /// The first violation found: empty problem, variable or clause count
    /// over capacity, a clause longer than the bit lines, a zero literal,
    /// a literal beyond the declared variable count, or a variable used
    /// twice in one clause.
    pub fn validate(&self, max_cls: usize) -> Result<(), MedusaError> {
        if self.num_var == 0 || self.clauses.is_empty() {
            return Err(MedusaError::EmptyProblem);
        }
        if self.num_var > MAX_VAR {
            return Err(MedusaError::CapacityExceeded {
                what: "variables",
                requested: self.num_var,
                capacity: MAX_VAR,
            });
        }
        if self.clauses.len() > max_cls {
            return Err(MedusaError::CapacityExceeded {
                what: "clauses",
                requested: self.clauses.len(),
                capacity: max_cls,
            });
        }

        for (i, clause) in self.clauses.iter().enumerate() {
            if clause.len() > MAX_CLS_LEN {
                return Err(MedusaError::CapacityExceeded {
                    what: "clause length",
                    requested: clause.len(),
                    capacity: MAX_CLS_LEN,
                });
            }
            // One bit per variable; num_var is at most 64 by now.
            let mut seen = 0u64;
            for &literal in clause {
                if literal == 0 {
                    return Err(MedusaError::ZeroLiteral { clause: i });
                }
                let var = literal.unsigned_abs() as usize;
                if var > self.num_var {
                    return Err(MedusaError::LiteralOutOfRange { clause: i, literal });
                }
                let bit = 1u64 << (var - 1);
                if seen & bit != 0 {
                    return Err(MedusaError::ConflictingLiteral { clause: i, var });
                }
                seen |= bit;
            }
        }
        Ok(())
    }

    /// Checks that the problem fits a single tile.
    pub fn validate_single(&self) -> Result<(), MedusaError> {
        self.validate(MAX_CLS)
    }

    /// Checks that each half of a coupled split fits its tile.
    ///
    /// `split_halves` never gives either tile more than half (rounded up)
    /// of the clauses, so the combined capacity bound is sufficient.
    pub fn validate_coupled(&self) -> Result<(), MedusaError> {
        self.validate(2 * MAX_CLS)
    }

    /// Splits the clauses for a coupled run.
    ///
    /// The first `num_cls / 2` clauses go to the right tile, the remainder
    /// to the left tile.
    pub fn split_halves(&self) -> (&[Clause], &[Clause]) {
        self.clauses.split_at(self.clauses.len() / 2)
    }

    /// Counts the clauses satisfied by `assignment`.
    ///
    /// `assignment(v)` returns the value of variable `v` (1-based).
    pub fn satisfied_count<A: Fn(usize) -> bool>(&self, assignment: A) -> usize {
        self.clauses
            .iter()
            .filter(|clause| {
                clause.iter().any(|&l| {
                    let value = assignment(l.unsigned_abs() as usize);
                    if l < 0 { !value } else { value }
                })
            })
            .count()
    }

    /// Decodes the packed binary form.
    ///
    /// A trailing odd byte is ignored. The clause count in the header must
    /// match the number of terminated clauses in the body.
    pub fn from_packed(bytes: &[u8]) -> Result<Self, MedusaError> {
        let mut values = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]));

        let num_var = values.next().ok_or(MedusaError::MalformedProblem)?;
        let num_cls = values.next().ok_or(MedusaError::MalformedProblem)?;
        if num_var < 0 || num_cls < 0 {
            return Err(MedusaError::MalformedProblem);
        }

        let mut clauses = Vec::with_capacity(num_cls as usize);
        let mut current = Vec::new();
        for value in values {
            if clauses.len() == num_cls as usize {
                break;
            }
            if value == 0 {
                clauses.push(core::mem::take(&mut current));
            } else {
                current.push(value as Literal);
            }
        }

        if clauses.len() != num_cls as usize {
            return Err(MedusaError::MalformedProblem);
        }
        Ok(Self::new(num_var as usize, clauses))
    }

    /// Encodes the packed binary form.
    ///
    /// # Returns
    ///
    /// `MalformedProblem` when a count or literal does not fit in `i16`.
    pub fn to_packed(&self) -> Result<Vec<u8>, MedusaError> {
        let narrow = |v: i64| i16::try_from(v).map_err(|_| MedusaError::MalformedProblem);

        let total: usize = self.clauses.iter().map(|c| c.len() + 1).sum();
        let mut out = Vec::with_capacity(4 + 2 * total);
        out.extend_from_slice(&narrow(self.num_var as i64)?.to_le_bytes());
        out.extend_from_slice(&narrow(self.clauses.len() as i64)?.to_le_bytes());
        for clause in &self.clauses {
            for &literal in clause {
                out.extend_from_slice(&narrow(literal as i64)?.to_le_bytes());
            }
            out.extend_from_slice(&0i16.to_le_bytes());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use proptest::prelude::*;

    fn problem(num_var: usize, clauses: &[&[i32]]) -> CnfProblem {
        CnfProblem::new(num_var, clauses.iter().map(|c| c.to_vec()).collect())
    }

    #[test]
    fn validation_rejects_bad_problems() {
        assert_eq!(problem(0, &[&[1]]).validate_single(), Err(MedusaError::EmptyProblem));
        assert_eq!(problem(3, &[]).validate_single(), Err(MedusaError::EmptyProblem));
        assert_eq!(
            problem(3, &[&[1, 0, 2]]).validate_single(),
            Err(MedusaError::ZeroLiteral { clause: 0 })
        );
        assert_eq!(
            problem(3, &[&[1], &[-4]]).validate_single(),
            Err(MedusaError::LiteralOutOfRange {
                clause: 1,
                literal: -4
            })
        );
        assert!(matches!(
            problem(MAX_VAR + 1, &[&[1]]).validate_single(),
            Err(MedusaError::CapacityExceeded {
                what: "variables",
                ..
            })
        ));
    }

    #[test]
    fn clause_capacity_is_checked() {
        let clauses = vec![vec![1]; MAX_CLS + 1];
        let p = CnfProblem::new(1, clauses);
        assert!(matches!(
            p.validate_single(),
            Err(MedusaError::CapacityExceeded { what: "clauses", .. })
        ));
        assert!(p.validate_coupled().is_ok());
    }

    #[test]
    fn clause_may_not_repeat_a_variable() {
        assert_eq!(
            problem(2, &[&[1, -1], &[2]]).validate_single(),
            Err(MedusaError::ConflictingLiteral { clause: 0, var: 1 })
        );
        assert_eq!(
            problem(3, &[&[2], &[3, 1, 3]]).validate_coupled(),
            Err(MedusaError::ConflictingLiteral { clause: 1, var: 3 })
        );
        assert_eq!(
            problem(MAX_VAR, &[&[-64, 1, 64]]).validate_single(),
            Err(MedusaError::ConflictingLiteral { clause: 0, var: 64 })
        );
        // The same variable in different clauses is fine.
        assert!(problem(1, &[&[1], &[-1]]).validate_single().is_ok());
    }

    #[test]
    fn empty_clause_is_legal() {
        assert!(problem(2, &[&[1, 2], &[]]).validate_single().is_ok());
    }

    #[test]
    fn split_gives_first_half_to_right() {
        let p = problem(3, &[&[1], &[2], &[3], &[-1], &[-2]]);
        let (right, left) = p.split_halves();
        assert_eq!(right.len(), 2);
        assert_eq!(left.len(), 3);
        assert_eq!(left[0], vec![3]);
    }

    #[test]
    fn packed_form_decodes() {
        let mut bytes = Vec::new();
        for v in [3i16, 2, 1, -2, 0, 3, 0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let p = CnfProblem::from_packed(&bytes).expect("decodes");
        assert_eq!(p, problem(3, &[&[1, -2], &[3]]));
        assert_eq!(p.to_packed().expect("encodes"), bytes);
    }

    #[test]
    fn truncated_packed_form_is_rejected() {
        let mut bytes = Vec::new();
        for v in [3i16, 2, 1, -2, 0, 3] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(CnfProblem::from_packed(&bytes), Err(MedusaError::MalformedProblem));
        assert_eq!(CnfProblem::from_packed(&[1]), Err(MedusaError::MalformedProblem));
    }

    #[test]
    fn satisfied_count_respects_polarity() {
        let p = problem(2, &[&[1, 2], &[-1], &[-2]]);
        assert_eq!(p.satisfied_count(|_| true), 1);
        assert_eq!(p.satisfied_count(|_| false), 2);
        assert_eq!(p.satisfied_count(|v| v == 2), 2);
    }

    proptest! {
        #[test]
        fn repeated_variable_is_rejected_wherever_it_appears(
            vars in prop::collection::btree_set(1..=MAX_VAR as i32, 1..8),
            polarity in any::<u8>(),
            pick in any::<prop::sample::Index>(),
            at in any::<prop::sample::Index>(),
            negate in any::<bool>(),
        ) {
            let mut clause: Vec<i32> = vars
                .iter()
                .enumerate()
                .map(|(i, &v)| if polarity >> (i % 8) & 1 == 1 { -v } else { v })
                .collect();
            let p = CnfProblem::new(MAX_VAR, vec![vec![1], clause.clone()]);
            prop_assert!(p.validate_single().is_ok());

            let original = clause[pick.index(clause.len())];
            let var = original.unsigned_abs() as usize;
            let repeat = if negate { -original } else { original };
            clause.insert(at.index(clause.len() + 1), repeat);
            let p = CnfProblem::new(MAX_VAR, vec![vec![1], clause]);
            prop_assert_eq!(
                p.validate_single(),
                Err(MedusaError::ConflictingLiteral { clause: 1, var })
            );
        }
    }
}
