use std::time::Instant;

use ising_sim::{Ensemble, EnsembleConfig, RunConfig};

const L: usize = 128;
const SYSNUM: usize = 16;
const N_SWEEPS: usize = 50;
const B: f64 = 0.44;

fn main() {
    let config = EnsembleConfig::square(L, SYSNUM, 0.5, B, 0.0).with_seed(42);
    let mut ensemble = Ensemble::new(config).unwrap();

    println!(
        "Lattice: {}x{}  |  Members: {}  |  Sweeps: {}  |  b = {}",
        L, L, SYSNUM, N_SWEEPS, B
    );
    println!("{}", "-".repeat(70));

    for sequential in [true, false] {
        let run = RunConfig::fresh(N_SWEEPS + 1).sequential(sequential);
        let t0 = Instant::now();
        ensemble.simulate(&run).unwrap();
        let elapsed = t0.elapsed().as_secs_f64();

        let per_sweep = elapsed / N_SWEEPS as f64 * 1000.0;
        let mode = if sequential { "sequential" } else { "parallel" };
        println!(
            "{:<10}  Total: {:.3} s  |  {:.3} ms/sweep  |  acceptance {:.3}",
            mode,
            elapsed,
            per_sweep,
            ensemble.acceptance_rate().unwrap_or(0.0)
        );
    }
}
