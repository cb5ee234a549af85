use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use xmatch::{
    run_match, synthetic_catalogue, MatchResult, RowRef, TupleSource, VecTable, XmatchConfig,
};

fn rows(points: &[&[f64]]) -> Arc<dyn TupleSource> {
    Arc::new(VecTable::new(
        "rows",
        points.iter().map(|p| p.to_vec()).collect(),
    ))
}

fn completed(config: &XmatchConfig, tables: Vec<Arc<dyn TupleSource>>) -> MatchResult {
    run_match(config, tables)
        .expect("pipeline should succeed")
        .into_completed()
        .expect("pipeline should not be cancelled")
}

fn refs(result: &MatchResult) -> Vec<Vec<RowRef>> {
    result.links.iter().map(|l| l.refs().to_vec()).collect()
}

#[test]
fn yaml_file_drives_a_pair_match() {
    let yaml = r#"
version: "1.0"
name: "file driven"
engine:
  type: cartesian
  ndim: 2
  scale: 1.0
matcher:
  chunk_size: 2
run:
  mode: pair
  a: 0
  b: 1
  pair_mode: best
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    let config = XmatchConfig::from_file(file.path()).unwrap();

    let a = rows(&[&[0.0, 0.0], &[10.0, 0.0]]);
    let b = rows(&[&[0.2, 0.0], &[0.4, 0.0], &[10.5, 0.0]]);
    let result = completed(&config, vec![a, b]);
    assert_eq!(
        refs(&result),
        vec![
            vec![RowRef::new(0, 0), RowRef::new(1, 0)],
            vec![RowRef::new(0, 1), RowRef::new(1, 2)],
        ]
    );
    assert_eq!(result.stats.pairs_accepted, 3);
}

#[test]
fn sky_group_match_across_three_catalogues() {
    let yaml = r#"
version: "1"
engine:
  type: sky
  max_separation_arcsec: 2.0
run:
  mode: group
  tables: [0, 1, 2]
  group_mode: one_and_one
"#;
    let config = XmatchConfig::from_yaml(yaml).unwrap();
    // 1 arcsec = 1/3600 degree
    let arcsec = 1.0 / 3600.0;
    let a = rows(&[&[10.0, 20.0], &[200.0, -45.0]]);
    let b = rows(&[&[10.0 + arcsec, 20.0], &[200.0, -45.0 + arcsec]]);
    let c = rows(&[&[10.0, 20.0 - arcsec], &[50.0, 50.0]]);
    let result = completed(&config, vec![a, b, c]);
    assert_eq!(
        refs(&result),
        vec![vec![
            RowRef::new(0, 0),
            RowRef::new(1, 0),
            RowRef::new(2, 0)
        ]]
    );
}

#[test]
fn error_engine_internal_match_with_singles() {
    let yaml = r#"
version: "1"
engine:
  type: error_cartesian
  ndim: 2
  scale: 1.0
run:
  mode: internal
  include_singles: true
"#;
    let config = XmatchConfig::from_yaml(yaml).unwrap();
    let table = rows(&[
        &[0.0, 0.0, 0.6],
        &[1.0, 0.0, 0.6],
        &[5.0, 0.0, 0.3],
        &[6.0, 0.0, 0.3],
    ]);
    let result = completed(&config, vec![table]);
    assert_eq!(
        refs(&result),
        vec![
            vec![RowRef::new(0, 0), RowRef::new(0, 1)],
            vec![RowRef::new(0, 2)],
            vec![RowRef::new(0, 3)],
        ]
    );
    assert!(result.links.partition_ok());
}

#[test]
fn internal_mode_from_yaml_keeps_one_row_per_group() {
    let yaml = r#"
version: "1"
engine:
  type: cartesian
  ndim: 2
  scale: 1.0
run:
  mode: internal
  internal_mode: keep_first
"#;
    let config = XmatchConfig::from_yaml(yaml).unwrap();
    let table = rows(&[&[0.0, 0.0], &[0.4, 0.0], &[0.8, 0.0], &[7.0, 7.0]]);
    let result = completed(&config, vec![table]);
    assert_eq!(
        refs(&result),
        vec![vec![RowRef::new(0, 0)], vec![RowRef::new(0, 3)]]
    );
    assert!(result.pairs.is_empty());
}

#[test]
fn multi_pairwise_from_yaml() {
    let yaml = r#"
version: "1"
engine:
  type: cartesian
  ndim: 2
  scale: 1.0
run:
  mode: multi_pairwise
  reference: 0
  others: [1, 2]
"#;
    let config = XmatchConfig::from_yaml(yaml).unwrap();
    let reference = rows(&[&[0.0, 0.0], &[10.0, 0.0]]);
    let first = rows(&[&[0.1, 0.0], &[0.3, 0.0]]);
    let second = rows(&[&[10.2, 0.0]]);
    let result = completed(&config, vec![reference, first, second]);
    assert_eq!(
        refs(&result),
        vec![
            vec![RowRef::new(0, 0), RowRef::new(1, 0)],
            vec![RowRef::new(0, 1), RowRef::new(2, 0)],
        ]
    );
}

#[test]
fn synthetic_clusters_are_recovered() {
    let config = XmatchConfig::from_yaml(
        "version: \"1\"\nengine:\n  type: cartesian\n  ndim: 3\n  scale: 0.5\n",
    )
    .unwrap();
    // centres are far apart relative to the jitter, so every cluster is one
    // link unless two centres happen to land within reach of each other
    let table: Arc<dyn TupleSource> =
        Arc::new(synthetic_catalogue("clusters", 3, 200, 4, 10_000.0, 0.1, 3));
    let result = completed(&config, vec![table]);
    assert!(result.links.len() <= 200);
    assert!(result.links.len() >= 195);
    assert_eq!(result.links.iter().map(|l| l.len()).sum::<usize>(), 800);
    assert_eq!(result.stats.rows_binned, 800);
}

#[test]
fn result_serialises_to_json() {
    let config = XmatchConfig::default();
    let table = rows(&[&[0.0, 0.0], &[0.5, 0.0]]);
    let result = completed(&config, vec![table]);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["stats"]["pairs_accepted"], 1);
    assert_eq!(json["links"]["links"][0]["refs"][0]["table"], 0);
}
