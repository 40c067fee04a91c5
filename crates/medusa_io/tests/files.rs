use medusa_core::cnf::CnfProblem;
use medusa_core::record::{ResultSink, SolverRunRecord};
use medusa_io::loader::{convert_dimacs, load_packed, load_problem, save_packed};
use medusa_io::results::{RECORD_BYTES, ResultsFile, read_results};
use proptest::prelude::*;
use std::io::Write;

const UF4: &str = "c small uniform instance\np cnf 4 3\n1 -2 3 0\n-1 4 0\n2 -3 -4 0\n%\n0\n";

fn record(seed: u32) -> SolverRunRecord {
    SolverRunRecord {
        outputs: [seed, !seed],
        time_ticks: seed.wrapping_mul(7),
        attempts: 1 + seed % 3,
    }
}

#[test]
fn dimacs_converts_to_packed() {
    let dir = tempfile::tempdir().unwrap();
    let cnf = dir.path().join("uf4.cnf");
    let bin = dir.path().join("uf4.bin");
    std::fs::write(&cnf, UF4).unwrap();

    let converted = convert_dimacs(&cnf, &bin).expect("conversion works");
    assert_eq!(converted.num_var(), 4);
    assert_eq!(converted.num_cls(), 3);

    let bytes = std::fs::read(&bin).unwrap();
    assert_eq!(&bytes[..4], &[4, 0, 3, 0]);
    assert_eq!(load_packed(&bin).unwrap(), converted);
}

#[test]
fn load_problem_dispatches_on_extension() {
    let dir = tempfile::tempdir().unwrap();
    let cnf = dir.path().join("uf4.CNF");
    std::fs::write(&cnf, UF4).unwrap();
    let text = load_problem(&cnf).unwrap();

    let bin = dir.path().join("uf4.dat");
    save_packed(&text, &bin).unwrap();
    assert_eq!(load_problem(&bin).unwrap(), text);
}

#[test]
fn truncated_packed_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Header declares two clauses, body holds one.
    file.write_all(&[2, 0, 2, 0, 1, 0, 0, 0]).unwrap();
    assert!(load_packed(file.path()).is_err());
}

#[test]
fn clearing_results_drops_earlier_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.bin");
    let mut sink = ResultsFile::create(&path).unwrap();

    for i in 0..3 {
        sink.append(&record(i)).unwrap();
    }
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * RECORD_BYTES as u64);

    sink.clear().unwrap();
    sink.append(&record(9)).unwrap();
    assert_eq!(sink.len(), 1);
    assert_eq!(read_results(&path).unwrap(), vec![record(9)]);
}

#[test]
fn partial_record_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; RECORD_BYTES + 3]).unwrap();
    assert!(read_results(file.path()).is_err());
}

proptest! {
    #[test]
    fn packed_files_preserve_problems(
        clauses in prop::collection::vec(
            prop::collection::vec((1i32..=64, any::<bool>()), 1..8),
            1..40,
        )
    ) {
        let clauses: Vec<Vec<i32>> = clauses
            .into_iter()
            .map(|c| c.into_iter().map(|(v, neg)| if neg { -v } else { v }).collect())
            .collect();
        let problem = CnfProblem::new(64, clauses);

        let file = tempfile::NamedTempFile::new().unwrap();
        save_packed(&problem, file.path()).unwrap();
        prop_assert_eq!(load_packed(file.path()).unwrap(), problem);
    }
}
