use std::sync::Arc;

use xmatch::{
    run_match, CartesianEngine, ColumnTable, ConfigLoadError, EngineConfig, EngineError,
    ErrorCartesianEngine, GroupMode, MatchEngine, MatchError, MatcherConfig, MatcherState,
    NdRange, PairMode, PipelineError, RowMatcher, RunConfig, SkyEngine, TupleSource, VecTable,
    XmatchConfig,
};

fn table(rows: Vec<Vec<f64>>) -> Arc<dyn TupleSource> {
    Arc::new(VecTable::new("err", rows))
}

#[test]
fn engine_rejects_bad_parameters() {
    assert!(matches!(
        CartesianEngine::new(0, 1.0),
        Err(EngineError::InvalidConfig(_))
    ));
    assert!(CartesianEngine::new(2, 0.0).is_err());
    assert!(CartesianEngine::new(2, f64::NAN).is_err());
    assert!(ErrorCartesianEngine::new(2, -1.0).is_err());
    assert!(SkyEngine::new(4.0).is_err());
    assert!(SkyEngine::from_arcsec(0.0).is_err());
}

#[test]
fn nd_range_rejects_inverted_bounds() {
    assert!(NdRange::new(vec![1.0], vec![0.0]).is_err());
    assert!(NdRange::new(vec![0.0, 0.0], vec![1.0]).is_err());
    assert!(NdRange::new(vec![f64::NAN], vec![1.0]).is_err());
}

#[test]
fn unusable_rows_are_skipped_not_fatal() {
    let engine: Arc<dyn MatchEngine> = Arc::new(CartesianEngine::new(2, 1.0).unwrap());
    let rows = vec![
        vec![0.0, 0.0],
        vec![f64::NAN, 0.0],
        vec![0.2, f64::INFINITY],
        vec![0.1],
        vec![0.3, 0.0],
    ];
    let matcher = RowMatcher::new(engine, vec![table(rows)], MatcherConfig::default()).unwrap();
    let result = matcher
        .find_internal_matches(0, false)
        .unwrap()
        .into_completed()
        .unwrap();
    assert_eq!(result.stats.rows_skipped, 3);
    assert_eq!(result.stats.rows_binned, 2);
    assert_eq!(result.links.len(), 1);
}

#[test]
fn error_engine_skips_negative_errors() {
    let engine: Arc<dyn MatchEngine> = Arc::new(ErrorCartesianEngine::new(1, 1.0).unwrap());
    let rows = vec![vec![0.0, 0.5], vec![0.1, -0.5], vec![0.2, 0.5]];
    let matcher = RowMatcher::new(engine, vec![table(rows)], MatcherConfig::default()).unwrap();
    let result = matcher
        .find_internal_matches(0, false)
        .unwrap()
        .into_completed()
        .unwrap();
    assert_eq!(result.stats.rows_skipped, 1);
    assert_eq!(result.pairs.len(), 1);
}

#[test]
fn huge_error_exhausts_bins() {
    let engine: Arc<dyn MatchEngine> = Arc::new(ErrorCartesianEngine::new(2, 0.001).unwrap());
    let rows = vec![vec![0.0, 0.0, 0.001], vec![0.0, 0.0, 1_000.0]];
    let matcher = RowMatcher::new(engine, vec![table(rows)], MatcherConfig::default()).unwrap();
    let err = matcher.find_internal_matches(0, false).unwrap_err();
    assert!(matches!(err, MatchError::ResourceExhausted(_)));
    assert_eq!(matcher.state(), MatcherState::Done);
}

#[test]
fn ragged_columns_are_rejected() {
    let err = ColumnTable::new("ragged", vec![vec![0.0, 1.0], vec![0.0]]);
    assert!(err.is_err());
}

#[test]
fn invalid_matcher_config_is_reported_up_front() {
    let engine: Arc<dyn MatchEngine> = Arc::new(CartesianEngine::new(2, 1.0).unwrap());
    let err = RowMatcher::new(
        engine,
        vec![table(vec![vec![0.0, 0.0]])],
        MatcherConfig::new().with_channel_capacity(0),
    )
    .err()
    .unwrap();
    assert!(matches!(err, MatchError::InvalidConfig(_)));
}

#[test]
fn unknown_modes_fail_to_parse() {
    assert!(matches!(
        "nearest".parse::<PairMode>(),
        Err(MatchError::UnknownMode(_))
    ));
    assert!(matches!(
        "some".parse::<GroupMode>(),
        Err(MatchError::UnknownMode(_))
    ));
}

#[test]
fn pipeline_surfaces_matcher_errors() {
    let config = XmatchConfig {
        run: RunConfig::Pair {
            a: 0,
            b: 1,
            pair_mode: PairMode::All,
        },
        ..XmatchConfig::default()
    };
    // validation is bypassed when the config is built in code; the matcher
    // still refuses a table paired with itself
    let bad = XmatchConfig {
        run: RunConfig::Pair {
            a: 1,
            b: 1,
            pair_mode: PairMode::All,
        },
        ..config
    };
    let tables = vec![table(vec![vec![0.0, 0.0]]), table(vec![vec![0.0, 0.0]])];
    let err = run_match(&bad, tables).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Match(MatchError::InvalidConfig(_))
    ));
}

#[test]
fn config_errors_carry_their_cause() {
    let err = XmatchConfig::from_yaml("version: [").unwrap_err();
    assert!(matches!(err, ConfigLoadError::YamlParse(_)));

    let yaml = "version: \"1\"\nengine:\n  type: sky\n  max_separation_arcsec: 1000000\n";
    let err = XmatchConfig::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigLoadError::Validation(_)));

    let err = EngineConfig::sky(-1.0).build().err().unwrap();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}

#[test]
fn wrong_tuple_width_fails_before_binning() {
    let engine: Arc<dyn MatchEngine> = Arc::new(ErrorCartesianEngine::new(2, 1.0).unwrap());
    let narrow = table(vec![vec![0.0, 0.0], vec![0.5, 0.0]]);
    let matcher = RowMatcher::new(engine, vec![narrow], MatcherConfig::default()).unwrap();
    let err = matcher.find_internal_matches(0, false).unwrap_err();
    assert!(matches!(
        err,
        MatchError::Engine(EngineError::TupleArity {
            expected: 3,
            actual: 2
        })
    ));
    // nothing ran, so the matcher is still usable
    assert_eq!(matcher.state(), MatcherState::Idle);
}

#[test]
fn column_mapping_width_is_checked_for_every_table() {
    let engine: Arc<dyn MatchEngine> = Arc::new(CartesianEngine::new(2, 1.0).unwrap());
    let wide: Arc<dyn TupleSource> = Arc::new(
        ColumnTable::new("wide", vec![vec![0.0], vec![0.0], vec![0.0]]).unwrap(),
    );
    let good = table(vec![vec![0.0, 0.0]]);
    let matcher =
        RowMatcher::new(engine, vec![good, wide], MatcherConfig::default()).unwrap();
    assert!(matches!(
        matcher.find_pair_matches(0, 1, PairMode::Best),
        Err(MatchError::Engine(EngineError::TupleArity { .. }))
    ));
    assert!(matches!(
        matcher.find_group_matches(&[0, 1], GroupMode::All),
        Err(MatchError::Engine(EngineError::TupleArity { .. }))
    ));
    assert_eq!(matcher.state(), MatcherState::Idle);
}

#[test]
fn pipeline_reports_wrong_tuple_width() {
    let yaml = "version: \"1\"\nengine:\n  type: error_cartesian\n  ndim: 2\n  scale: 1.0\n";
    let config = XmatchConfig::from_yaml(yaml).unwrap();
    let err = run_match(&config, vec![table(vec![vec![0.0, 0.0]])]).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Match(MatchError::Engine(EngineError::TupleArity { .. }))
    ));
}
