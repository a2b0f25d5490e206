use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use splinefit::knots::{KnotSpacing, compute_knot_vectors, unique_sorted};
use splinefit::linalg::MAX_DENSE_EQUATIONS;
use splinefit::{BSpline, BuildError, Builder, DataTable, Smoothing};

fn grid_2d(xs: &[f64], ys: &[f64], mut f: impl FnMut(f64, f64) -> f64) -> DataTable {
    let mut table = DataTable::new();
    for &x in xs {
        for &y in ys {
            table.add_sample(vec![x, y], f(x, y)).unwrap();
        }
    }
    table
}

fn assert_reproduces(spline: &BSpline, table: &DataTable, tolerance: f64) {
    for sample in table {
        let fitted = spline.eval(sample.x()).unwrap();
        assert!(
            (fitted - sample.y()).abs() < tolerance,
            "spline gives {fitted} at {:?}, sample is {}",
            sample.x(),
            sample.y()
        );
    }
}

fn end_multiplicities(knots: &ndarray::Array1<f64>) -> (usize, usize) {
    let first = knots[0];
    let last = knots[knots.len() - 1];
    (
        knots.iter().take_while(|&&k| k == first).count(),
        knots.iter().rev().take_while(|&&k| k == last).count(),
    )
}

#[test]
fn knot_vectors_are_clamped_for_random_grids() {
    let mut rng = StdRng::seed_from_u64(7);
    for trial in 0..20 {
        let n0 = rng.gen_range(6..12);
        let n1 = rng.gen_range(6..12);
        let xs: Vec<f64> = (0..n0).map(|_| rng.gen_range(-5.0..5.0)).collect();
        let ys: Vec<f64> = (0..n1).map(|_| rng.gen_range(0.0..100.0)).collect();
        let table = grid_2d(&xs, &ys, |x, y| x * y);
        let degrees = [trial % 4, (trial + 1) % 4];

        for spacing in [KnotSpacing::AsSampled, KnotSpacing::Equidistant] {
            let knots =
                compute_knot_vectors(&table, spacing, &degrees, &[0, 0], &[], 0.0).unwrap();
            for (dim, knot_vector) in knots.iter().enumerate() {
                let degree = degrees[dim];
                assert!(knot_vector.windows(2).into_iter().all(|w| w[0] <= w[1]));
                assert_eq!(
                    end_multiplicities(knot_vector),
                    (degree + 1, degree + 1),
                    "{spacing:?} dim {dim}: {knot_vector}"
                );
                let unique = unique_sorted(&table.column(dim));
                assert_eq!(knot_vector[0], unique[0]);
                assert_eq!(knot_vector[knot_vector.len() - 1], unique[unique.len() - 1]);
            }
            let spline = BSpline::new(knots, degrees.to_vec()).unwrap();
            for (dim, knot_vector) in spline.knot_vectors().iter().enumerate() {
                assert_eq!(
                    knot_vector.len(),
                    spline.num_basis_functions_per_variable()[dim] + degrees[dim] + 1
                );
            }
        }
    }
}

#[test]
fn unique_sorted_is_idempotent_on_random_input() {
    let mut rng = StdRng::seed_from_u64(11);
    let values: Vec<f64> = (0..200).map(|_| rng.gen_range(0..25) as f64 * 0.5).collect();
    let once = unique_sorted(&values);
    assert_eq!(unique_sorted(&once), once);
    assert!(once.windows(2).all(|w| w[0] < w[1]));
    assert!(once.iter().all(|v| values.contains(v)));
}

#[test]
fn equidistant_padding_widens_the_extent() {
    let table = grid_2d(&[0.0, 2.0, 5.0, 7.0, 10.0], &[1.0, 2.0, 3.0, 4.0], |x, y| x + y);
    let knots = compute_knot_vectors(
        &table,
        KnotSpacing::Equidistant,
        &[1, 1],
        &[0, 0],
        &[],
        0.1,
    )
    .unwrap();
    assert_abs_diff_eq!(knots[0][0], -1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(knots[0][knots[0].len() - 1], 11.0, epsilon = 1e-12);
    assert_abs_diff_eq!(knots[1][0], 0.7, epsilon = 1e-12);
    assert_abs_diff_eq!(knots[1][knots[1].len() - 1], 4.3, epsilon = 1e-12);
}

#[test]
fn univariate_cubic_interpolates_samples() {
    let mut table = DataTable::new();
    for i in 0..=6 {
        let x = i as f64;
        table.add_sample(vec![x], x.sin() + 0.1 * x * x).unwrap();
    }
    let spline = Builder::new(&table).build().unwrap();

    assert_eq!(
        spline.knot_vectors()[0].to_vec(),
        vec![0.0, 0.0, 0.0, 0.0, 2.0, 3.0, 4.0, 6.0, 6.0, 6.0, 6.0]
    );
    assert_eq!(spline.num_basis_functions(), 7);
    assert_reproduces(&spline, &table, 1e-9);
}

#[test]
fn repeated_samples_do_not_change_the_basis() {
    let mut table = DataTable::new();
    for i in 0..=6 {
        let x = i as f64;
        table.add_sample(vec![x], x.cos()).unwrap();
    }
    table.add_sample(vec![3.0], 3.0_f64.cos()).unwrap();

    let spline = Builder::new(&table).build().unwrap();
    assert_eq!(spline.num_basis_functions(), 7);
    assert_reproduces(&spline, &table, 1e-9);
}

#[test]
fn bivariate_quadratic_interpolates_on_dense_path() {
    let xs = [0.0, 0.5, 1.5, 2.0, 3.0];
    let ys = [-1.0, 0.0, 1.0, 2.5, 3.0];
    let table = grid_2d(&xs, &ys, |x, y| (x * y).sin() + x);
    assert!(table.num_samples() < MAX_DENSE_EQUATIONS);

    let spline = Builder::new(&table).degree(2).unwrap().build().unwrap();
    assert_eq!(spline.num_basis_functions_per_variable(), &[5, 5]);
    assert_reproduces(&spline, &table, 1e-8);
}

#[test]
fn bivariate_cubic_interpolates_on_sparse_path() {
    let xs: Vec<f64> = (0..11).map(|i| (i as f64).powf(1.3)).collect();
    let ys: Vec<f64> = (0..11).map(|i| i as f64 * 0.25).collect();
    let table = grid_2d(&xs, &ys, |x, y| (0.3 * x).cos() * (1.0 + y * y));
    assert!(table.num_samples() >= MAX_DENSE_EQUATIONS);

    let spline = Builder::new(&table).build().unwrap();
    assert_eq!(spline.num_basis_functions(), 121);
    assert_reproduces(&spline, &table, 1e-6);
}

#[test]
fn ridge_coefficient_norm_does_not_grow_with_alpha() {
    let mut rng = StdRng::seed_from_u64(3);
    let noise = Normal::new(0.0, 0.2).unwrap();
    let xs: Vec<f64> = (0..8).map(|i| i as f64).collect();
    let table = grid_2d(&xs, &xs, |x, y| (0.5 * x).sin() + 0.1 * y + noise.sample(&mut rng));

    let mut previous = f64::INFINITY;
    for alpha in [0.0, 0.001, 0.01, 0.1, 1.0, 10.0, 1000.0] {
        let spline = Builder::new(&table)
            .smoothing(Smoothing::Identity)
            .alpha(alpha)
            .unwrap()
            .build()
            .unwrap();
        let norm = spline.coefficients().dot(spline.coefficients()).sqrt();
        assert!(norm <= previous + 1e-9, "norm {norm} > {previous} at alpha {alpha}");
        previous = norm;
    }
}

fn noisy_surface() -> DataTable {
    let mut rng = StdRng::seed_from_u64(5);
    let noise = Normal::new(0.0, 0.05).unwrap();
    let xs: Vec<f64> = (0..8).map(|i| i as f64 / 7.0).collect();
    grid_2d(&xs, &xs, |x, y| {
        (3.0 * x).sin() * (2.0 * y).cos() + noise.sample(&mut rng)
    })
}

fn pspline_builder(table: &DataTable) -> Builder {
    let mut builder = Builder::new(table);
    builder
        .knot_spacing(KnotSpacing::Equidistant)
        .num_basis_functions(7)
        .smoothing(Smoothing::PSpline)
        .alpha(0.25)
        .unwrap();
    builder
}

#[test]
fn hfs_zero_iterations_keeps_alpha() {
    let table = noisy_surface();
    let (spline, summary) = pspline_builder(&table).build_with_summary().unwrap();
    assert_eq!(summary.lambda, Some(0.25));
    assert!(summary.hfs_rounds.is_empty());
    assert_eq!(spline.num_basis_functions_per_variable(), &[5, 5]);
}

#[test]
fn hfs_recomputes_lambda_exactly_k_times() {
    let table = noisy_surface();
    for k in 1..=3 {
        let mut builder = pspline_builder(&table);
        builder.hfs_iters(k);
        let (_, summary) = builder.build_with_summary().unwrap();
        assert_eq!(summary.hfs_rounds.len(), k);
        assert_eq!(summary.lambda, summary.hfs_rounds.last().map(|r| r.lambda));
        for round in &summary.hfs_rounds {
            assert!(round.lambda.is_finite() && round.lambda > 0.0);
            assert!(round.effective_dimension > 0.0 && round.effective_dimension < 25.0);
        }
    }
}

/// The centre sample of `noisy_surface`.
const CENTRE: usize = 27;

fn with_centre_value(table: &DataTable, value: f64) -> DataTable {
    let mut modified = DataTable::new();
    for (idx, sample) in table.iter().enumerate() {
        let y = if idx == CENTRE { value } else { sample.y() };
        modified.add_sample(sample.x().to_vec(), y).unwrap();
    }
    modified
}

#[test]
fn pspline_with_zero_weight_ignores_an_outlier() {
    let table = noisy_surface();
    let corrupted = with_centre_value(&table, 100.0);
    let mut weights = vec![1.0; table.num_samples()];
    weights[CENTRE] = 0.0;

    let fit = |data: &DataTable, weights: Option<Vec<f64>>| {
        let mut builder = pspline_builder(data);
        if let Some(w) = weights {
            builder.weights(w).unwrap();
        }
        builder.build().unwrap()
    };

    let clean = fit(&table, Some(weights.clone()));
    let weighted = fit(&corrupted, Some(weights));
    assert!(clean.coefficients().abs_diff_eq(weighted.coefficients(), 1e-8));

    let unweighted = fit(&corrupted, None);
    assert!(!clean.coefficients().abs_diff_eq(unweighted.coefficients(), 1e-3));
}

#[test]
fn too_few_unique_points_fail_before_assembly() {
    let mut table = DataTable::new();
    for x in [0.0, 1.0, 2.0] {
        table.add_sample(vec![x], x).unwrap();
    }
    match Builder::new(&table).build().unwrap_err() {
        BuildError::InsufficientData(msg) => assert!(msg.contains("only 3 unique points")),
        other => panic!("Expected InsufficientData, got {other:?}"),
    }

    // A quadratic basis needs exactly three points.
    let spline = Builder::new(&table).degree(2).unwrap().build().unwrap();
    assert_reproduces(&spline, &table, 1e-10);
}

#[test]
fn wrong_weight_count_fails_at_configuration() {
    let table = noisy_surface();
    let mut builder = Builder::new(&table);
    assert!(matches!(
        builder.weights(vec![1.0; 10]),
        Err(BuildError::InvalidConfig(_))
    ));
}

#[cfg(not(feature = "allow-scatter"))]
#[test]
fn scattered_samples_are_rejected() {
    let mut table = DataTable::new();
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..30 {
        let x = vec![rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
        table.add_sample(x, 1.0).unwrap();
    }
    assert!(!table.is_grid_complete());
    assert!(matches!(
        Builder::new(&table).degree(1).unwrap().build(),
        Err(BuildError::InsufficientData(_))
    ));
}

#[test]
fn bucket_knots_reproduce_a_cubic_polynomial() {
    let mut table = DataTable::new();
    for i in 0..12 {
        let x = i as f64;
        table.add_sample(vec![x], x * x * x - 2.0 * x).unwrap();
    }
    let mut builder = Builder::new(&table);
    builder.knot_spacing(KnotSpacing::Buckets);
    let spline = builder.build().unwrap();

    // Twelve segments exceed the cap of ten, so the fit is a least-squares one.
    assert_eq!(spline.num_basis_functions(), 10);
    assert_reproduces(&spline, &table, 1e-7);
}

#[test]
fn bucket_windows_of_single_values_are_rejected() {
    let mut table = DataTable::new();
    for i in 0..5 {
        table.add_sample(vec![i as f64], i as f64).unwrap();
    }
    let mut builder = Builder::new(&table);
    builder.degree(1).unwrap().knot_spacing(KnotSpacing::Buckets);
    match builder.build().unwrap_err() {
        BuildError::InvalidSpline(msg) => assert!(msg.contains("repeated 3 times"), "{msg}"),
        other => panic!("Expected InvalidSpline, got {other:?}"),
    }
}

#[test]
fn hfs_builds_when_basis_count_matches_sample_count() {
    let mut table = DataTable::new();
    for i in 0..10 {
        let x = i as f64;
        table.add_sample(vec![x], (0.7 * x).sin()).unwrap();
    }
    let mut builder = Builder::new(&table);
    builder
        .smoothing(Smoothing::PSpline)
        .alpha(1e-6)
        .unwrap()
        .hfs_iters(1);

    let (spline, summary) = builder.build_with_summary().unwrap();
    assert_eq!(spline.num_basis_functions(), 10);
    assert_eq!(summary.hfs_rounds.len(), 1);
    assert!(summary.hfs_rounds[0].lambda <= 0.0);
    assert_reproduces(&spline, &table, 1e-4);
}
