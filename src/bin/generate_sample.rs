use std::path::PathBuf;

use anyhow::{bail, Result};

use rusty_treeview::data::loader::load_file;
use rusty_treeview::data::{DataMatrix, DataModel, FileSet, LabelInfo, ModelWriter, TreeInfo};

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Expression profile over the time points: one induction peak plus noise.
fn generate_profile(
    n_arrays: usize,
    peak: (f64, f64, f64),
    noise_level: f64,
    missing_rate: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    let (mu, sigma, amp) = peak;
    (0..n_arrays)
        .map(|t| {
            if rng.next_f64() < missing_rate {
                f64::NAN
            } else {
                let v = gaussian(t as f64, mu, sigma, amp) + rng.gauss(0.0, noise_level);
                (v * 1000.0).round() / 1000.0
            }
        })
        .collect()
}

/// Merge neighbours level by level until one root is left. Correlation
/// drops with every level.
fn balanced_tree(leaves: &[String], rng: &mut SimpleRng) -> Vec<Vec<String>> {
    let mut level: Vec<String> = leaves.to_vec();
    let mut rows = Vec::new();
    let mut depth = 0;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => {
                    let id = format!("NODE{}X", rows.len() + 1);
                    let corr = (0.95 - 0.15 * depth as f64 + rng.gauss(0.0, 0.02)).clamp(-1.0, 1.0);
                    rows.push(vec![
                        id.clone(),
                        left.clone(),
                        right.clone(),
                        format!("{corr:.6}"),
                    ]);
                    next.push(id);
                }
                [single] => next.push(single.clone()),
                _ => {}
            }
        }
        level = next;
        depth += 1;
    }
    rows
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let output = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "sample_data.cdt".to_string()),
    );
    let mut rng = SimpleRng::new(42);

    let n_arrays = 12;
    let genes_per_cluster = 8;
    // (peak time point, width, amplitude) per cluster
    let clusters = [("early", (2.0, 1.5, 2.5)), ("mid", (6.0, 2.0, -2.0)), ("late", (10.0, 1.0, 3.0))];

    let mut gene_rows = Vec::new();
    let mut values = Vec::new();
    for (name, peak) in &clusters {
        for i in 0..genes_per_cluster {
            let g = gene_rows.len();
            gene_rows.push(vec![
                format!("GENE{g}X"),
                format!("YAL{:03}W", g + 1),
                format!("{name} gene {}", i + 1),
                "1".to_string(),
            ]);
            values.push(generate_profile(n_arrays, *peak, 0.15, 0.03, &mut rng));
        }
    }

    let array_rows: Vec<Vec<String>> = (0..n_arrays)
        .map(|t| vec![format!("t{}", t * 10), format!("ARRY{t}X"), "1".to_string()])
        .collect();

    let gene_ids: Vec<String> = gene_rows.iter().map(|r| r[0].clone()).collect();
    let array_ids: Vec<String> = array_rows.iter().map(|r| r[1].clone()).collect();
    let gtr_rows = balanced_tree(&gene_ids, &mut rng);
    let atr_rows = balanced_tree(&array_ids, &mut rng);

    let strings = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let row_labels = LabelInfo::from_parts(strings(&["GID", "YORF", "NAME", "GWEIGHT"]), gene_rows);
    let col_labels = LabelInfo::from_parts(strings(&["NAME", "AID", "EWEIGHT"]), array_rows);
    let mut model = DataModel::from_stores(row_labels, col_labels, DataMatrix::from_rows(values));
    model.set_gtr(TreeInfo::from_rows(gtr_rows));
    model.set_atr(TreeInfo::from_rows(atr_rows));

    let report = ModelWriter::new(FileSet::from_path(&output)).write_all(&mut model);
    for (kind, path) in &report.written {
        println!("Wrote {kind} to {}", path.display());
    }
    if let Err(e) = report.into_result() {
        bail!("could not write sample data: {e}");
    }
    println!(
        "{} genes x {n_arrays} arrays in {} clusters",
        model.n_rows(),
        clusters.len()
    );

    // Read it back to make sure the files load as a set.
    let (reloaded, _) = load_file(&output)?;
    print!("{}", reloaded.summary());
    Ok(())
}
