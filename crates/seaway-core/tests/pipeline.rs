//! End-to-end runs of the public pipeline API.

use std::sync::Arc;

use approx::assert_relative_eq;
use seaway_core::coords::LatLon;
use seaway_core::{
    run_pipeline, BarrierPredicate, ConductanceTransform, DistanceMatrixBuilder, Error, MdsInit, PipelineConfig,
    RasterGrid, Site, StepMetric, Warning,
};

/// 10×10 open water with one degree per cell, so lon = col and lat = row.
fn open_water() -> RasterGrid {
    RasterGrid::new(10, 10, 0.0, 9.0, 0.0, 9.0, -40.0)
}

fn cells_config() -> PipelineConfig {
    PipelineConfig { step_metric: StepMetric::Cells, ..PipelineConfig::default() }
}

#[test]
fn three_sites_on_open_water() {
    let raster = open_water();
    let sites = vec![Site::new("A", 0.0, 0.0), Site::new("B", 0.0, 6.0), Site::new("C", 6.0, 0.0)];
    let r = run_pipeline(&raster, &sites, &cells_config(), None).unwrap();

    let d = &r.distances;
    let s2 = std::f64::consts::SQRT_2;
    assert_relative_eq!(d.get(0, 1), 6.0, epsilon = 1e-9);
    assert_relative_eq!(d.get(0, 2), 6.0, epsilon = 1e-9);
    assert_relative_eq!(d.get(1, 2), 6.0 * s2, epsilon = 1e-9);
    for i in 0..3 {
        assert_eq!(d.get(i, i), 0.0);
        for j in 0..3 {
            assert_eq!(d.get(i, j), d.get(j, i));
        }
    }

    assert!(r.stress < 1e-6, "right triangle should embed exactly, stress {}", r.stress);
    assert!(r.warnings.is_empty());
    let e = r.embedding.distances();
    for i in 0..3 {
        for j in 0..3 {
            assert_relative_eq!(e.get(i, j), d.get(i, j), epsilon = 1e-6);
        }
    }
    assert_eq!(r.sites.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["A", "B", "C"]);
    assert!(r.sites.iter().all(|s| s.coords.len() == 2));
}

#[test]
fn land_wall_makes_pairs_unreachable() {
    // Full-width land in row 5 splits the water into two basins.
    let raster = RasterGrid::from_fn(10, 10, 0.0, 9.0, 0.0, 9.0, |r, _| if r == 5 { 3.0 } else { -40.0 });
    let sites = vec![
        Site::new("south1", 1.0, 1.0),
        Site::new("south2", 8.0, 2.0),
        Site::new("north", 4.0, 8.0),
    ];
    match run_pipeline(&raster, &sites, &cells_config(), None) {
        Err(Error::UnreachablePair { pairs }) => {
            assert_eq!(pairs.len(), 2);
            assert!(pairs.iter().all(|(a, b)| a == "north" || b == "north"));
        }
        other => panic!("expected UnreachablePair, got {other:?}"),
    }
}

#[test]
fn site_on_land_fails_before_routing() {
    let raster = RasterGrid::from_fn(10, 10, 0.0, 9.0, 0.0, 9.0, |r, c| if r > 7 && c > 7 { 12.0 } else { -40.0 });
    let sites = vec![
        Site::new("sea", 1.0, 1.0),
        Site::new("beach", 9.0, 9.0),
        Site::new("sea2", 5.0, 2.0),
        Site::new("dune", 8.0, 8.0),
    ];
    let err = run_pipeline(&raster, &sites, &cells_config(), None).unwrap_err();
    match err {
        Error::SiteOnBarrier { sites } => assert_eq!(sites, vec!["beach".to_string(), "dune".to_string()]),
        other => panic!("expected SiteOnBarrier, got {other}"),
    }
}

#[test]
fn reused_transition_gives_identical_distances() {
    let raster = RasterGrid::from_fn(16, 12, 0.0, 15.0, 0.0, 11.0, |r, c| {
        if (4..8).contains(&r) && (5..9).contains(&c) { 5.0 } else { -((r * 3 + c) as f32) - 1.0 }
    });
    let sites = vec![
        Site::new("w", 1.0, 5.0),
        Site::new("e", 14.0, 6.0),
        Site::new("n", 7.0, 10.0),
        Site::new("s", 6.0, 1.0),
    ];
    let cfg = PipelineConfig {
        step_metric: StepMetric::Cells,
        conductance: ConductanceTransform::InverseDifference { scale: 10.0 },
        ..PipelineConfig::default()
    };
    let first = run_pipeline(&raster, &sites, &cfg, None).unwrap();
    let second = run_pipeline(&raster, &sites, &cfg, Some(first.transition.clone())).unwrap();

    assert!(Arc::ptr_eq(&first.transition, &second.transition));
    for (a, b) in first.distances.as_slice().iter().zip(second.distances.as_slice()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
    assert_eq!(first.embedding, second.embedding);
}

#[test]
fn transition_from_another_grid_is_rejected() {
    let sites = vec![Site::new("a", 1.0, 1.0), Site::new("b", 7.0, 2.0), Site::new("c", 3.0, 8.0)];
    let first = run_pipeline(&open_water(), &sites, &cells_config(), None).unwrap();

    let mut other = open_water();
    other.set(4, 4, 10.0);
    let err = run_pipeline(&other, &sites, &cells_config(), Some(first.transition)).unwrap_err();
    assert!(matches!(err, Error::ModelMismatch { .. }), "got {err}");
}

#[test]
fn transition_from_another_conductance_is_rejected() {
    let sites = vec![Site::new("a", 1.0, 1.0), Site::new("b", 7.0, 2.0), Site::new("c", 3.0, 8.0)];
    let raster = RasterGrid::from_fn(10, 10, 0.0, 9.0, 0.0, 9.0, |r, c| -((r + c) as f32) * 5.0 - 1.0);
    let first = run_pipeline(&raster, &sites, &cells_config(), None).unwrap();

    let steep = PipelineConfig {
        conductance: ConductanceTransform::InverseDifference { scale: 2.0 },
        ..cells_config()
    };
    let err = run_pipeline(&raster, &sites, &steep, Some(first.transition.clone())).unwrap_err();
    assert!(matches!(err, Error::ModelMismatch { .. }), "got {err}");

    let fresh = run_pipeline(&raster, &sites, &steep, None).unwrap();
    assert!(fresh.distances.get(0, 1) > first.distances.get(0, 1));

    let custom = PipelineConfig { conductance: ConductanceTransform::custom(|_, _| 1.0), ..cells_config() };
    let err = run_pipeline(&raster, &sites, &custom, Some(first.transition)).unwrap_err();
    assert!(matches!(err, Error::ModelMismatch { .. }), "got {err}");
}

#[test]
fn ring_around_an_island_warns_when_flattened_to_one_dimension() {
    // Island in the middle of a 21×21 basin; eight sites ring it.
    let raster = RasterGrid::from_fn(21, 21, 0.0, 20.0, 0.0, 20.0, |r, c| {
        if (7..=13).contains(&r) && (7..=13).contains(&c) { 10.0 } else { -40.0 }
    });
    let sites: Vec<Site> = [(18.0, 10.0), (16.0, 16.0), (10.0, 18.0), (4.0, 16.0), (2.0, 10.0), (4.0, 4.0), (10.0, 2.0), (16.0, 4.0)]
        .iter()
        .enumerate()
        .map(|(i, &(lon, lat))| Site::new(format!("r{i}"), lon, lat))
        .collect();
    let mut cfg = cells_config();
    cfg.mds.dimensions = 1;

    let r = run_pipeline(&raster, &sites, &cfg, None).unwrap();
    assert_eq!(r.embedding.dims(), 1);
    assert!(r.stress > 0.05, "stress {}", r.stress);
    assert_eq!(r.warnings.len(), 1);
    let Warning::HighStress { stress, threshold } = r.warnings[0];
    assert_eq!(stress.to_bits(), r.stress.to_bits());
    assert_eq!(threshold, seaway_core::STRESS_ADVISORY_THRESHOLD);

    // Opposite corners of the ring go round the island.
    let s2 = std::f64::consts::SQRT_2;
    assert_relative_eq!(r.distances.get(1, 5), 14.0 + 5.0 * s2, epsilon = 1e-9);
    assert_relative_eq!(r.distances.get(0, 1), 4.0 + 2.0 * s2, epsilon = 1e-9);
}

#[test]
fn transition_survives_json_round_trip() {
    let sites = vec![Site::new("a", 1.0, 1.0), Site::new("b", 7.0, 2.0), Site::new("c", 3.0, 8.0)];
    let first = run_pipeline(&open_water(), &sites, &cells_config(), None).unwrap();
    let json = first.transition.to_json().unwrap();
    let loaded = Arc::new(seaway_core::TransitionModel::from_json(&json).unwrap());
    let second = run_pipeline(&open_water(), &sites, &cells_config(), Some(loaded)).unwrap();
    for (a, b) in first.distances.as_slice().iter().zip(second.distances.as_slice()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn pipeline_is_deterministic_for_a_seed() {
    let raster = RasterGrid::from_fn(20, 20, 0.0, 19.0, 0.0, 19.0, |r, c| {
        if c == 10 && r > 3 { 1.0 } else { -50.0 }
    });
    let sites: Vec<Site> = [(1.0, 2.0), (18.0, 17.0), (4.0, 15.0), (15.0, 1.0), (9.0, 9.0), (12.0, 6.0)]
        .iter()
        .enumerate()
        .map(|(i, &(lon, lat))| Site::new(format!("s{i}"), lon, lat))
        .collect();
    let mut cfg = cells_config();
    cfg.mds.init = MdsInit::Random;
    cfg.mds.seed = 11;

    let a = run_pipeline(&raster, &sites, &cfg, None).unwrap();
    let b = run_pipeline(&raster, &sites, &cfg, None).unwrap();
    assert_eq!(a.stress.to_bits(), b.stress.to_bits());
    assert_eq!(a.embedding, b.embedding);
    assert_eq!(a.warnings, b.warnings);
    for w in &a.warnings {
        let Warning::HighStress { stress, threshold } = *w;
        assert!(stress > threshold);
    }
}

#[test]
fn geodesic_costs_are_at_least_great_circle_distance() {
    let raster = RasterGrid::new(41, 21, -10.0, 10.0, 40.0, 50.0, -200.0);
    let sites = vec![Site::new("sw", -9.0, 41.0), Site::new("ne", 8.0, 49.0), Site::new("mid", 0.0, 45.0)];
    let builder = DistanceMatrixBuilder::new(BarrierPredicate::default(), StepMetric::Geodesic, ConductanceTransform::Uniform);
    let out = builder.build(&raster, &sites, None).unwrap();
    for i in 0..3 {
        for j in (i + 1)..3 {
            let gc = LatLon::new(sites[i].lat, sites[i].lon).haversine_km(LatLon::new(sites[j].lat, sites[j].lon));
            let d = out.matrix.get(i, j);
            assert!(d >= gc * (1.0 - 1e-9), "{}–{}: grid {d} km < great circle {gc} km", sites[i].id, sites[j].id);
            // 8-connected paths overshoot the great circle by a bounded factor.
            assert!(d <= gc * 1.25, "{}–{}: grid {d} km vs great circle {gc} km", sites[i].id, sites[j].id);
        }
    }
}
