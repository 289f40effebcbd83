use ndarray::{Array2, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use statrs::distribution::{ContinuousCDF, StudentsT};

use scmetab_core::errors::{DataError, DataResult};
use scmetab_core::models::Group;
use scmetab_io::gmt::GeneSetCollection;
use scmetab_io::matrix::ExprMatrix;

/// Per-cell pathway scores: pathway rows, cell columns.
#[derive(Debug, Clone)]
pub struct CellScores {
    pub pathways: Vec<String>,
    pub cells: Vec<String>,
    pub scores: Array2<f64>,
}

/// Per-group pathway activity with permutation significance.
#[derive(Debug, Clone)]
pub struct ActivityMatrix {
    pub pathways: Vec<String>,
    pub groups: Vec<String>,
    pub activity: Array2<f64>,
    pub p_value: Array2<f64>,
}

/// A generic pathway-by-group statistic table.
#[derive(Debug, Clone)]
pub struct GroupMatrix {
    pub pathways: Vec<String>,
    pub groups: Vec<String>,
    pub values: Array2<f64>,
}

/// One pathway's differential result between two cell sets.
#[derive(Debug, Clone)]
pub struct PathwayTest {
    pub pathway: String,
    pub log2_ratio: f64,
    pub p_value: f64,
    pub q_value: f64,
}

/// Scores pathway activity per group within one subset.
pub trait PathwayScorer {
    fn score(
        &self,
        expr: &ExprMatrix,
        groups: &[Group],
        gene_sets: &GeneSetCollection,
    ) -> DataResult<ActivityMatrix>;
}

/// Tests pathways for differential score between two cell sets.
pub trait EnrichmentTester {
    fn test(&self, a: &CellScores, b: &CellScores) -> DataResult<Vec<PathwayTest>>;
}

/// Per-cell pathway score: mean expression of the set's genes present in
/// the matrix. Every listed cell must exist in the matrix.
pub fn pathway_cell_scores(
    expr: &ExprMatrix,
    gene_sets: &GeneSetCollection,
    cells: &[String],
) -> DataResult<CellScores> {
    let positions = expr.cell_positions(cells)?;
    let mut scores = Array2::zeros((gene_sets.len(), cells.len()));

    for (p, set) in gene_sets.sets.iter().enumerate() {
        let rows: Vec<usize> = set
            .genes
            .iter()
            .filter_map(|g| expr.gene_row(g))
            .collect();
        for (c, &col) in positions.iter().enumerate() {
            scores[[p, c]] = expr.mean_over_genes(&rows, col);
        }
    }

    Ok(CellScores {
        pathways: gene_sets.sets.iter().map(|s| s.name.clone()).collect(),
        cells: cells.to_vec(),
        scores,
    })
}

/// Pathway heterogeneity per group: coefficient of variation of the
/// per-cell pathway score inside the group. Groups with fewer than two
/// cells, or a non-positive mean score, get `NaN`.
pub fn pathway_heterogeneity(
    expr: &ExprMatrix,
    groups: &[Group],
    gene_sets: &GeneSetCollection,
) -> DataResult<GroupMatrix> {
    let mut values = Array2::from_elem((gene_sets.len(), groups.len()), f64::NAN);

    for (g, group) in groups.iter().enumerate() {
        let scores = pathway_cell_scores(expr, gene_sets, &group.cells)?;
        for p in 0..scores.pathways.len() {
            let row = scores.scores.row(p);
            if row.len() < 2 {
                continue;
            }
            let mean = row.mean().unwrap_or(f64::NAN);
            if !(mean > 0.0) {
                continue;
            }
            values[[p, g]] = sample_sd(row) / mean;
        }
    }

    Ok(GroupMatrix {
        pathways: gene_sets.sets.iter().map(|s| s.name.clone()).collect(),
        groups: groups.iter().map(|g| g.name.clone()).collect(),
        values,
    })
}

/// Default activity scorer.
///
/// Activity of a pathway in a group is the mean per-cell pathway score in
/// the group divided by the mean over all grouped cells of the subset, so
/// 1.0 means "as active as the subset at large". Significance comes from
/// `n_perm` seeded label shuffles, one-sided toward the observed direction
/// with the `(1 + hits) / (1 + n)` estimator; `n_perm = 0` disables it.
#[derive(Debug, Clone)]
pub struct MeanRatioScorer {
    pub n_perm: usize,
    pub seed: u64,
}

impl PathwayScorer for MeanRatioScorer {
    fn score(
        &self,
        expr: &ExprMatrix,
        groups: &[Group],
        gene_sets: &GeneSetCollection,
    ) -> DataResult<ActivityMatrix> {
        let cells: Vec<String> = groups
            .iter()
            .flat_map(|g| g.cells.iter().cloned())
            .collect();
        let scores = pathway_cell_scores(expr, gene_sets, &cells)?;

        let n_pathways = scores.pathways.len();
        let n_groups = groups.len();
        let mut assignment: Vec<usize> = groups
            .iter()
            .enumerate()
            .flat_map(|(g, group)| std::iter::repeat(g).take(group.len()))
            .collect();

        let overall: Vec<f64> = (0..n_pathways)
            .map(|p| scores.scores.row(p).mean().unwrap_or(f64::NAN))
            .collect();

        let mut activity = Array2::from_elem((n_pathways, n_groups), f64::NAN);
        for p in 0..n_pathways {
            if !(overall[p] > 0.0) {
                continue;
            }
            let means = group_means(&assignment, scores.scores.row(p), n_groups);
            for g in 0..n_groups {
                activity[[p, g]] = means[g] / overall[p];
            }
        }

        let mut p_value = Array2::from_elem((n_pathways, n_groups), f64::NAN);
        if self.n_perm > 0 {
            let mut hits = Array2::<f64>::zeros((n_pathways, n_groups));
            let mut rng = StdRng::seed_from_u64(self.seed);

            for _ in 0..self.n_perm {
                assignment.shuffle(&mut rng);
                for p in 0..n_pathways {
                    if !(overall[p] > 0.0) {
                        continue;
                    }
                    let means = group_means(&assignment, scores.scores.row(p), n_groups);
                    for g in 0..n_groups {
                        let observed = activity[[p, g]];
                        let permuted = means[g] / overall[p];
                        let extreme = if observed >= 1.0 {
                            permuted >= observed
                        } else {
                            permuted <= observed
                        };
                        if extreme {
                            hits[[p, g]] += 1.0;
                        }
                    }
                }
            }

            for p in 0..n_pathways {
                for g in 0..n_groups {
                    if activity[[p, g]].is_nan() {
                        continue;
                    }
                    p_value[[p, g]] = (1.0 + hits[[p, g]]) / (1.0 + self.n_perm as f64);
                }
            }
        }

        Ok(ActivityMatrix {
            pathways: scores.pathways,
            groups: groups.iter().map(|g| g.name.clone()).collect(),
            activity,
            p_value,
        })
    }
}

/// Default differential tester: Welch's t-test on per-cell pathway scores,
/// log2 ratio of means as the effect size, Benjamini-Hochberg q-values
/// across pathways.
#[derive(Debug, Clone, Default)]
pub struct WelchTester;

impl EnrichmentTester for WelchTester {
    fn test(&self, a: &CellScores, b: &CellScores) -> DataResult<Vec<PathwayTest>> {
        if a.pathways != b.pathways {
            return Err(DataError::FeatureMismatch("pathway scores".to_string()));
        }

        let p_values: Vec<f64> = (0..a.pathways.len())
            .map(|p| welch_p(a.scores.row(p), b.scores.row(p)))
            .collect();
        let q_values = bh_adjust(&p_values);

        Ok(a.pathways
            .iter()
            .enumerate()
            .map(|(p, pathway)| {
                let mean_a = a.scores.row(p).mean().unwrap_or(f64::NAN);
                let mean_b = b.scores.row(p).mean().unwrap_or(f64::NAN);
                PathwayTest {
                    pathway: pathway.clone(),
                    log2_ratio: ((mean_a + PSEUDO) / (mean_b + PSEUDO)).log2(),
                    p_value: p_values[p],
                    q_value: q_values[p],
                }
            })
            .collect())
    }
}

// offset keeping log ratios finite for zero means
const PSEUDO: f64 = 1e-9;

fn group_means(assignment: &[usize], row: ArrayView1<f64>, n_groups: usize) -> Vec<f64> {
    let mut sums = vec![0.0; n_groups];
    let mut counts = vec![0_usize; n_groups];
    for (c, &g) in assignment.iter().enumerate() {
        sums[g] += row[c];
        counts[g] += 1;
    }
    sums.iter()
        .zip(&counts)
        .map(|(s, &n)| if n > 0 { s / n as f64 } else { f64::NAN })
        .collect()
}

fn sample_sd(row: ArrayView1<f64>) -> f64 {
    let n = row.len() as f64;
    let mean = row.mean().unwrap_or(f64::NAN);
    let var = row.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

/// Two-sided Welch's t-test p-value with Welch-Satterthwaite degrees of
/// freedom. `NaN` when either side has fewer than two observations.
fn welch_p(xs: ArrayView1<f64>, ys: ArrayView1<f64>) -> f64 {
    let (n_a, n_b) = (xs.len() as f64, ys.len() as f64);
    if xs.len() < 2 || ys.len() < 2 {
        return f64::NAN;
    }

    let mean_a = xs.mean().unwrap_or(f64::NAN);
    let mean_b = ys.mean().unwrap_or(f64::NAN);
    let var_a = xs.iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / (n_a - 1.0);
    let var_b = ys.iter().map(|y| (y - mean_b).powi(2)).sum::<f64>() / (n_b - 1.0);

    let se2 = var_a / n_a + var_b / n_b;
    if se2 == 0.0 {
        return if mean_a == mean_b { 1.0 } else { 0.0 };
    }

    let t = (mean_a - mean_b) / se2.sqrt();
    let df = se2 * se2
        / ((var_a / n_a).powi(2) / (n_a - 1.0) + (var_b / n_b).powi(2) / (n_b - 1.0));

    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

/// Benjamini-Hochberg adjustment. `NaN` p-values keep `NaN` q-values and do
/// not count toward the number of tests.
pub fn bh_adjust(p_values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    order.sort_by(|&a, &b| p_values[a].partial_cmp(&p_values[b]).unwrap());

    let m = order.len() as f64;
    let mut q_values = vec![f64::NAN; p_values.len()];
    let mut running = 1.0_f64;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let q = (p_values[idx] * m / (rank + 1) as f64).min(running).min(1.0);
        q_values[idx] = q;
        running = q;
    }
    q_values
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use scmetab_io::gmt::GeneSet;

    fn tiny_matrix() -> ExprMatrix {
        // two pathway genes high in the first two cells, low in the rest
        ExprMatrix::from_parts(
            vec!["g1".to_string(), "g2".to_string(), "g3".to_string()],
            (1..=4).map(|i| format!("c{}", i)).collect(),
            array![
                [8.0, 6.0, 1.0, 1.0],
                [6.0, 8.0, 1.0, 1.0],
                [1.0, 1.0, 1.0, 1.0],
            ],
        )
        .unwrap()
    }

    fn sets() -> GeneSetCollection {
        GeneSetCollection {
            sets: vec![GeneSet {
                name: "PATH".to_string(),
                description: "".to_string(),
                genes: vec!["g1".to_string(), "g2".to_string()],
            }],
        }
    }

    fn groups() -> Vec<Group> {
        vec![
            Group::new("hot", vec!["c1".to_string(), "c2".to_string()]),
            Group::new("cold", vec!["c3".to_string(), "c4".to_string()]),
        ]
    }

    #[rstest]
    fn test_cell_scores_are_gene_means() {
        let scores =
            pathway_cell_scores(&tiny_matrix(), &sets(), &["c1".to_string(), "c3".to_string()])
                .unwrap();
        assert_eq!(scores.scores[[0, 0]], 7.0);
        assert_eq!(scores.scores[[0, 1]], 1.0);
    }

    #[rstest]
    fn test_activity_ratio_and_direction() {
        let scorer = MeanRatioScorer { n_perm: 200, seed: 3 };
        let result = scorer.score(&tiny_matrix(), &groups(), &sets()).unwrap();

        // overall mean score is (7 + 7 + 1 + 1) / 4 = 4
        assert_eq!(result.activity[[0, 0]], 7.0 / 4.0);
        assert_eq!(result.activity[[0, 1]], 1.0 / 4.0);
        // the hot group can't look this extreme under many shuffles
        assert!(result.p_value[[0, 0]] < 0.5);
    }

    #[rstest]
    fn test_scoring_is_deterministic() {
        let scorer = MeanRatioScorer { n_perm: 100, seed: 11 };
        let first = scorer.score(&tiny_matrix(), &groups(), &sets()).unwrap();
        let second = scorer.score(&tiny_matrix(), &groups(), &sets()).unwrap();
        assert_eq!(first.p_value, second.p_value);
        assert_eq!(first.activity, second.activity);
    }

    #[rstest]
    fn test_zero_perm_disables_significance() {
        let scorer = MeanRatioScorer { n_perm: 0, seed: 0 };
        let result = scorer.score(&tiny_matrix(), &groups(), &sets()).unwrap();
        assert!(result.p_value[[0, 0]].is_nan());
    }

    #[rstest]
    fn test_welch_known_value() {
        let xs = ndarray::arr1(&[1.0, 2.0, 3.0, 4.0]);
        let ys = ndarray::arr1(&[2.0, 3.0, 4.0, 5.0]);
        let p = welch_p(xs.view(), ys.view());
        // t = -1.095, df = 6, two-sided p ~= 0.315
        assert!((p - 0.315).abs() < 0.005);
    }

    #[rstest]
    fn test_welch_degenerate_inputs() {
        let flat = ndarray::arr1(&[2.0, 2.0, 2.0]);
        assert_eq!(welch_p(flat.view(), flat.view()), 1.0);

        let single = ndarray::arr1(&[1.0]);
        assert!(welch_p(single.view(), flat.view()).is_nan());
    }

    #[rstest]
    fn test_bh_adjust() {
        let q = bh_adjust(&[0.01, 0.04, 0.03]);
        assert_eq!(q, vec![0.03, 0.04, 0.04]);

        let with_nan = bh_adjust(&[0.05, f64::NAN]);
        assert_eq!(with_nan[0], 0.05);
        assert!(with_nan[1].is_nan());
    }

    #[rstest]
    fn test_heterogeneity_dispersion() {
        let groups = vec![
            Group::new("mixed", vec!["c1".to_string(), "c3".to_string()]),
            Group::new("flat", vec!["c3".to_string(), "c4".to_string()]),
        ];
        let result = pathway_heterogeneity(&tiny_matrix(), &groups, &sets()).unwrap();

        // mixed holds scores 7 and 1, flat holds 1 and 1
        assert!(result.values[[0, 0]] > 1.0);
        assert_eq!(result.values[[0, 1]], 0.0);
    }

    #[rstest]
    fn test_tester_effect_direction() {
        let matrix = tiny_matrix();
        let collection = sets();
        let a = pathway_cell_scores(&matrix, &collection, &["c1".to_string(), "c2".to_string()])
            .unwrap();
        let b = pathway_cell_scores(&matrix, &collection, &["c3".to_string(), "c4".to_string()])
            .unwrap();

        let tests = WelchTester.test(&a, &b).unwrap();
        assert_eq!(tests.len(), 1);
        assert!(tests[0].log2_ratio > 0.0);
        assert_eq!(tests[0].q_value, tests[0].p_value);
    }
}
