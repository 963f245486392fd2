//! Properties of the closed-form plume along the built-in slices.

use plume_core::{
    define_slices, evaluate, evaluate_or_load, AnalyticCase, ArtifactCache, Origin, Slice,
};

#[test]
fn analytic_values_are_non_negative_on_every_slice() {
    let case = AnalyticCase::aligned_point_2d();
    let registry = define_slices().expect("built-in slices");
    for slice in registry.iter() {
        let series = evaluate(&case, slice).expect("evaluate");
        assert_eq!(series.len(), case.samples);
        assert!(
            series.values().iter().all(|v| v.is_finite() && *v >= 0.0),
            "negative or non-finite value on {}",
            slice.name
        );
    }
}

#[test]
fn centerline_decays_downstream_of_near_field() {
    let case = AnalyticCase::aligned_point_2d();
    let slice = Slice::along_x("centerline", 0.5, 1000.0, 0.0).expect("slice");
    let series = evaluate(&case, &slice).expect("evaluate");
    for pair in series.values().windows(2) {
        assert!(pair[1] < pair[0], "centerline not decreasing: {pair:?}");
    }
}

#[test]
fn transverse_profile_peaks_on_axis() {
    let case = AnalyticCase::aligned_point_2d();
    let registry = define_slices().expect("built-in slices");
    let cut = registry.get("x=424.0").expect("transverse slice");
    let series = evaluate(&case, cut).expect("evaluate");
    let first = series.values()[0];
    assert!(series.values().iter().all(|v| *v <= first));
    assert!(series.values()[series.len() - 1] < first * 1e-2);
}

#[test]
fn scenario_centerline_matches_reference_value() {
    // observed [0.01, 0.004, 0.0007] at x = [50, 150, 300] after 1440 days
    let case = AnalyticCase::aligned_point_2d().with_time_days(1440.0);
    let slice = Slice::along_x("centerline", 0.0, 500.0, 0.0).expect("slice");
    let series = evaluate(&case, &slice).expect("evaluate");
    let at_150 = series.interpolate(150.0).expect("inside domain");
    assert!(
        (at_150 - 0.004).abs() <= 0.1 * 0.004,
        "analytic at x=150 is {at_150}"
    );

    let direct = plume_core::concentration(&case, 150.0, 0.0).expect("concentration");
    assert!((direct - 0.004).abs() <= 0.1 * 0.004, "direct value {direct}");
}

#[test]
fn analytic_cache_is_idempotent_and_overwritable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ArtifactCache::new(dir.path()).expect("cache");
    let case = AnalyticCase::aligned_point_2d();
    let registry = define_slices().expect("built-in slices");
    let slice = registry.get("centerline").expect("centerline");

    let first = evaluate_or_load(&case, slice, &cache, false).expect("first");
    assert_eq!(first.origin, Origin::Computed);

    let second = evaluate_or_load(&case, slice, &cache, false).expect("second");
    assert_eq!(second.origin, Origin::Loaded);
    assert_eq!(first.value, second.value);

    let forced = evaluate_or_load(&case, slice, &cache, true).expect("forced");
    assert_eq!(forced.origin, Origin::Computed);
    assert_eq!(forced.value, first.value);

    // a different case is an independent key
    let later = case.clone().with_time_days(2000.0);
    let other = evaluate_or_load(&later, slice, &cache, false).expect("other case");
    assert_eq!(other.origin, Origin::Computed);
    assert_ne!(other.value, first.value);
}

#[test]
fn corrupt_analytic_artifact_is_recomputed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ArtifactCache::new(dir.path()).expect("cache");
    let case = AnalyticCase::aligned_point_2d();
    let registry = define_slices().expect("built-in slices");
    let slice = registry.get("x=0.0").expect("slice");

    let first = evaluate_or_load(&case, slice, &cache, false).expect("first");
    let key = plume_core::analytic::cache_key(&case, slice).expect("key");
    std::fs::write(cache.path_of(&key), b"{ truncated").expect("corrupt artifact");

    let again = evaluate_or_load(&case, slice, &cache, false).expect("recomputed");
    assert_eq!(again.origin, Origin::Computed);
    assert_eq!(again.value, first.value);

    let loaded = evaluate_or_load(&case, slice, &cache, false).expect("loaded");
    assert_eq!(loaded.origin, Origin::Loaded);
}
