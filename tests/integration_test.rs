use std::collections::BTreeSet;

use bankmap::cluster::{BankClusterer, ClusterSession};
use bankmap::config::{BitDef, BitWindow, ClusterConfig, Config, SolverConfig};
use bankmap::hypothesis::{MappingHypothesis, XorBankFunction};
use bankmap::memory::{LatencyOracle, PhysAddr};
use bankmap::sample::{AddressSample, SampleReader, write_samples};
use bankmap::solver::{
    SampleOutcome, Solution, Solver, SolverError, SolverSession, known_cpu_solutions,
    solutions_from_bitdefs,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const VIRT_BASE: usize = 0x2000_0000;
const PHYS_BASE: u64 = 0x4000_0000;
const STRIDE: usize = 4096;
const CONFIG_FILE: &str = "config/bankmap.json";

fn bank_bits() -> Vec<BitDef> {
    vec![
        BitDef::Single(14),
        BitDef::Multi(vec![15, 18]),
        BitDef::Multi(vec![16, 19]),
        BitDef::Multi(vec![17, 20]),
    ]
}

fn masks(solutions: &[Solution]) -> BTreeSet<u64> {
    solutions.iter().map(Solution::mask).collect()
}

fn solver_config(lo: usize, hi: usize) -> SolverConfig {
    SolverConfig {
        window: BitWindow::new(lo, hi),
        ..Default::default()
    }
}

/// Random addresses of `bank`, drawn until `count` are found.
fn random_sample(rng: &mut StdRng, f: &XorBankFunction, bank: usize, count: usize) -> AddressSample {
    std::iter::repeat_with(|| rng.random_range(0..1u64 << 30) & !0xfff)
        .filter(|&a| f.bank_of(PhysAddr::new(a)) == bank)
        .take(count)
        .collect()
}

#[test]
fn test_solver_recovers_random_samples() -> anyhow::Result<()> {
    let f = XorBankFunction::from_bitdefs(&bank_bits());
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let config = solver_config(11, 24);
    let mut session = SolverSession::new(&config, solutions_from_bitdefs(&bank_bits()));

    for bank in 0..f.bank_count() {
        let sample = random_sample(&mut rng, &f, bank, 64);
        let outcome = session.process(&sample)?;
        assert!(matches!(outcome, SampleOutcome::Narrowed { .. }));
    }
    let report = session.finish();

    assert!(!report.exhausted);
    assert_eq!(report.samples, 16);
    assert!(report.known_failures.is_empty());
    assert_eq!(masks(&report.solutions), f.masks().iter().copied().collect());
    Ok(())
}

#[test]
fn test_solver_through_sample_file() -> anyhow::Result<()> {
    let f = XorBankFunction::from_bitdefs(&bank_bits());
    let mut rng = StdRng::seed_from_u64(7);
    let samples: Vec<AddressSample> = (0..f.bank_count())
        .map(|bank| random_sample(&mut rng, &f, bank, 32))
        .collect();

    let mut file = Vec::new();
    write_samples(&mut file, samples.iter().enumerate())?;
    let parsed = SampleReader::new(file.as_slice(), 1000).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(parsed, samples);

    let mut session = SolverSession::new(&solver_config(11, 24), vec![]);
    for sample in &parsed {
        session.process(sample)?;
    }
    let report = session.finish();
    assert_eq!(masks(&report.solutions), f.masks().iter().copied().collect());
    Ok(())
}

#[test]
fn test_shipped_config_matches_defaults() -> anyhow::Result<()> {
    let config = Config::from_jsonfile(CONFIG_FILE)?;
    assert_eq!(config, Config::default());
    Ok(())
}

#[test]
fn test_evaluation_ignores_bit_order() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut bits: Vec<usize> = (11..=24).collect();
    for depth in 1..=6 {
        bits.shuffle(&mut rng);
        let chosen = &bits[..depth];
        let mut shuffled = chosen.to_vec();
        shuffled.shuffle(&mut rng);
        let (a, b) = (Solution::xor(chosen), Solution::xor(&shuffled));
        for _ in 0..64 {
            let addr: u64 = rng.random();
            assert_eq!(a.evaluate(addr), b.evaluate(addr));
        }
    }
}

#[test]
fn test_validity_ignores_address_order() -> anyhow::Result<()> {
    let f = XorBankFunction::from_bitdefs(&bank_bits());
    let mut rng = StdRng::seed_from_u64(0xadd7);
    let solver = Solver::new(&solver_config(11, 24));
    let known = known_cpu_solutions();

    for bank in [0, 5, 15] {
        let sample = random_sample(&mut rng, &f, bank, 48);
        let mut addrs = sample.addrs().to_vec();
        addrs.shuffle(&mut rng);
        let shuffled = AddressSample::new(addrs);

        let a = solver.find_solutions(&sample)?;
        let b = solver.find_solutions(&shuffled)?;
        assert_eq!(a.slots(), b.slots());
        assert_eq!(
            a.slots().iter().map(Solution::is_valid).collect::<Vec<_>>(),
            b.slots().iter().map(Solution::is_valid).collect::<Vec<_>>()
        );
        for solution in &known {
            assert_eq!(
                solution.is_constant_over(&sample),
                solution.is_constant_over(&shuffled)
            );
        }
    }
    Ok(())
}

#[test]
fn test_unsolvable_sample_aborts() {
    // every combination of bits 11..=13 occurs, so no XOR over them is constant
    let sample: AddressSample = (0..8u64).map(|i| i << 11).collect();
    let mut session = SolverSession::new(&solver_config(11, 13), vec![]);
    let err = session.process(&sample).expect_err("sample has no constant XOR");
    assert!(matches!(err, SolverError::Unsolvable { sample: 0, .. }));
}

#[test]
fn test_disjoint_samples_exhaust_session() -> anyhow::Result<()> {
    let mut session = SolverSession::new(&solver_config(11, 12), vec![]);
    // only b11 is constant
    let first: AddressSample = [0x0u64, 0x1000].into_iter().collect();
    // only b12 is constant
    let second: AddressSample = [0x0u64, 0x800].into_iter().collect();
    assert!(matches!(session.process(&first)?, SampleOutcome::Narrowed { .. }));
    assert_eq!(session.process(&second)?, SampleOutcome::Exhausted);
    assert!(matches!(
        session.process(&first),
        Err(SolverError::Exhausted { sample: 2 })
    ));
    let report = session.finish();
    assert!(report.exhausted);
    assert!(report.solutions.is_empty());
    Ok(())
}

struct TestOracle<'a> {
    callback: &'a dyn Fn((*const u8, *const u8)) -> f64,
}

impl LatencyOracle for TestOracle<'_> {
    unsafe fn measure_latency(&self, a: *const u8, b: *const u8) -> f64 {
        (self.callback)((a, b))
    }
}

/// Clusters a simulated 4 MB block whose latencies follow `f`.
fn clustered_session(f: &XorBankFunction) -> anyhow::Result<ClusterSession> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut session = ClusterSession::from_contiguous(
        VIRT_BASE,
        PhysAddr::new(PHYS_BASE),
        4 * 1024 * 1024,
        STRIDE,
        4096,
    );
    assert_eq!(session.len(), 1024);

    let phys = |p: *const u8| PhysAddr::new(PHYS_BASE + (p as usize - VIRT_BASE) as u64);
    let oracle = TestOracle {
        callback: &|(a, b)| {
            if f.bank_of(phys(a)) == f.bank_of(phys(b)) {
                400.0
            } else {
                200.0
            }
        },
    };
    let clusterer = BankClusterer::new(ClusterConfig::default(), None);
    let clusters = clusterer.cluster(&mut session, &oracle, f)?;
    assert_eq!(clusters, f.bank_count());
    assert!(session.inconsistencies().is_empty());
    Ok(session)
}

#[test]
fn test_cluster_matches_mapping() -> anyhow::Result<()> {
    let f = XorBankFunction::from_bitdefs(&bank_bits());
    let mut session = clustered_session(&f)?;

    let report = session.check_mapping(&f, &ClusterConfig::default())?;
    assert!(report.is_consistent());
    assert_eq!(report.clusters, 16);
    assert_eq!(report.occupancy_range(), Some((64, 64, 64.0)));
    assert_eq!(session.banks().len(), 16);
    Ok(())
}

#[test]
fn test_incomplete_mapping_aliases_clusters() -> anyhow::Result<()> {
    let f = XorBankFunction::from_bitdefs(&bank_bits());
    let mut session = clustered_session(&f)?;

    let partial = XorBankFunction::new(f.masks()[..3].to_vec());
    let report = session.check_mapping(&partial, &ClusterConfig::default())?;
    assert!(!report.is_consistent());
    assert_eq!(report.aliases.len(), 8);
    assert!(report.mismatches.is_empty());
    assert_eq!(report.occupancy.len(), 8);
    // aliased masters keep their own bank id although the bank table lists only the first
    assert_eq!(session.banks().len(), 8);
    let masters: Vec<usize> = session.masters().collect();
    assert_eq!(masters.len(), 16);
    assert!(masters.iter().all(|&m| session.entries()[m].bank().is_some()));
    Ok(())
}

#[test]
fn test_cluster_groups_recover_function() -> anyhow::Result<()> {
    let f = XorBankFunction::from_bitdefs(&bank_bits());
    let session = clustered_session(&f)?;
    let groups = session.groups(8);
    assert_eq!(groups.len(), 16);

    // the block spans bits 12..=21; bits outside are constant
    let mut solver = SolverSession::new(&solver_config(12, 21), solutions_from_bitdefs(&bank_bits()));
    for (_, sample) in &groups {
        assert_eq!(sample.len(), 64);
        solver.process(sample)?;
    }
    let report = solver.finish();
    assert!(report.known_failures.is_empty());
    assert_eq!(masks(&report.solutions), f.masks().iter().copied().collect());

    let recovered = XorBankFunction::from_solutions(&report.solutions);
    let mut banks = BTreeSet::new();
    for (_, sample) in &groups {
        let ids: BTreeSet<usize> = sample.addrs().iter().map(|&a| recovered.bank_of(a)).collect();
        assert_eq!(ids.len(), 1);
        banks.extend(ids);
    }
    assert_eq!(banks.len(), 16);
    Ok(())
}
