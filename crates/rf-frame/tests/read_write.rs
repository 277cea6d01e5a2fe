//! Integration tests: `to_root` followed by `read_root` / `read_root_chunks`.

use approx::assert_relative_eq;
use rf_frame::{
    ColumnData, Compression, DataFrame, FrameError, INDEX, Mode, ReadOptions, Series,
    WriteOptions, list_branches, list_trees, read_root, read_root_chunks,
};
use rf_root::{Algorithm, RootError};
use std::path::Path;

fn events(n: usize) -> DataFrame {
    let pt: Vec<f64> = (0..n).map(|i| 5.0 + (i as f64 * 0.37).sin().abs() * 50.0).collect();
    let eta: Vec<f32> = (0..n).map(|i| ((i % 50) as f32 - 25.0) / 10.0).collect();
    let njet: Vec<i32> = (0..n).map(|i| (i % 7) as i32).collect();
    let pass: Vec<bool> = (0..n).map(|i| i % 3 != 0).collect();
    DataFrame::from_columns([
        Series::new("jet_pt", pt),
        Series::new("jet_eta", eta),
        Series::new("njet", njet),
        Series::new("pass", pass),
    ])
    .unwrap()
}

fn write(df: &DataFrame, path: &Path, tree: &str, mode: Mode) {
    df.to_root(path, &WriteOptions::new().with_tree(tree).with_mode(mode)).unwrap();
}

#[test]
fn frame_round_trips_with_range_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.root");
    let df = events(1000);
    write(&df, &path, "events", Mode::Write);

    assert_eq!(list_trees(&path).unwrap(), vec!["events"]);
    let branches = list_branches(&path, "events").unwrap();
    assert_eq!(branches, vec![INDEX, "jet_pt", "jet_eta", "njet", "pass"]);

    let back = read_root(&path, &ReadOptions::new()).unwrap();
    assert_eq!(back.column_names(), df.column_names());
    assert_eq!(back.columns(), df.columns());
    assert_eq!(back.index().unwrap().data, ColumnData::from((0..1000i64).collect::<Vec<_>>()));
}

#[test]
fn explicit_index_is_restored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed.root");
    let labels: Vec<u64> = (0..200).map(|i| 1000 + 3 * i).collect();
    let df = events(200).with_index(Series::new(INDEX, labels.clone())).unwrap();
    write(&df, &path, "t", Mode::Write);

    let back = read_root(&path, &ReadOptions::new().with_columns(["njet"])).unwrap();
    assert_eq!(back.column_names(), vec!["njet"]);
    assert_eq!(back.index().unwrap().data, ColumnData::from(labels));

    let no_index = WriteOptions::new().with_tree("t").with_index(false);
    df.to_root(&path, &no_index).unwrap();
    let back = read_root(&path, &ReadOptions::new()).unwrap();
    assert!(back.index().is_none());
    assert_eq!(back.n_columns(), 4);
}

#[test]
fn every_compression_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let df = events(3000);
    for compression in [
        Compression::none(),
        Compression::new(Algorithm::Zlib, 6),
        Compression::new(Algorithm::Lz4, 1),
        Compression::new(Algorithm::Zstd, 3),
        Compression::new(Algorithm::Lzma, 1),
    ] {
        let path = dir.path().join(format!("c{}.root", compression.setting()));
        let opts = WriteOptions::new().with_compression(compression).with_basket_size(4096);
        df.to_root(&path, &opts).unwrap();
        let back = read_root(&path, &ReadOptions::new().with_tree("default")).unwrap();
        assert_eq!(back.columns(), df.columns(), "{}", compression);
    }
}

fn read_patterns(path: &Path, columns: &[&str], ignore: &[&str]) -> rf_frame::Result<DataFrame> {
    let opts = ReadOptions::new()
        .with_columns(columns.iter().copied())
        .with_ignore(ignore.iter().copied());
    read_root(path, &opts)
}

#[test]
fn column_patterns_select_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patterns.root");
    write(&events(10), &path, "t", Mode::Write);

    let df = read_patterns(&path, &["jet_{eta,pt}", "n*"], &[]).unwrap();
    assert_eq!(df.column_names(), vec!["jet_eta", "jet_pt", "njet"]);
    assert!(df.index().is_some(), "index is read whenever it exists");

    let df = read_patterns(&path, &["*"], &["jet_*", "nothing*"]).unwrap();
    assert_eq!(df.column_names(), vec!["njet", "pass"]);

    let df = read_patterns(&path, &[], &["p?ss"]).unwrap();
    assert_eq!(df.column_names(), vec!["jet_pt", "jet_eta", "njet"]);

    let err = read_patterns(&path, &["missing"], &[]).unwrap_err();
    assert!(matches!(err, FrameError::PatternNoMatch(p) if p == "missing"));
    let err = read_patterns(&path, &["jet_{pt,phi}"], &[]).unwrap_err();
    assert!(matches!(err, FrameError::PatternNoMatch(p) if p == "jet_phi"));
    assert!(matches!(read_patterns(&path, &["*"], &["ind*"]), Err(FrameError::IndexIgnored)));
    assert!(matches!(read_patterns(&path, &["[x"], &[]), Err(FrameError::InvalidPattern { .. })));
}

#[test]
fn where_matches_row_predicate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("where.root");
    let df = events(2500);
    write(&df, &path, "t", Mode::Write);

    let opts = ReadOptions::new()
        .with_columns(["jet_pt"])
        .with_where("jet_pt > 30 && abs(jet_eta) < 1.5 && pass");
    let got = read_root(&path, &opts).unwrap();

    let pt = df.column("jet_pt").unwrap().data.to_f64();
    let eta = df.column("jet_eta").unwrap().data.to_f64();
    let pass = df.column("pass").unwrap().data.to_f64();
    let keep: Vec<usize> = (0..df.n_rows())
        .filter(|&i| pt[i] > 30.0 && eta[i].abs() < 1.5 && pass[i] != 0.0)
        .collect();

    assert_eq!(got.n_rows(), keep.len());
    let got_pt = got.column("jet_pt").unwrap().data.to_f64();
    for (k, &i) in keep.iter().enumerate() {
        assert_relative_eq!(got_pt[k], pt[i]);
    }
    let labels = got.index().unwrap().data.to_f64();
    assert_eq!(labels, keep.iter().map(|&i| i as f64).collect::<Vec<_>>());

    let bad = ReadOptions::new().with_where("nope > 1");
    let err = read_root(&path, &bad).unwrap_err();
    assert!(matches!(err, FrameError::Root(RootError::BranchNotFound(_))));
    let bad = ReadOptions::new().with_where("jet_pt >");
    let err = read_root(&path, &bad).unwrap_err();
    assert!(matches!(err, FrameError::Root(RootError::Expression(_))));
}

#[test]
fn chunks_concatenate_to_full_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.root");
    write(&events(1234), &path, "t", Mode::Write);

    let opts = ReadOptions::new().with_where("njet >= 2").with_chunk_size(100);
    let full = read_root(&path, &opts).unwrap();
    let chunks = read_root_chunks(&path, &opts).unwrap();
    assert_eq!(chunks.n_chunks(), 13);
    assert_eq!(chunks.len(), 13);
    let chunks: Vec<DataFrame> = chunks.collect::<Result<_, _>>().unwrap();
    assert!(chunks.iter().all(|c| c.n_rows() <= 100));
    assert_eq!(DataFrame::vstack(chunks).unwrap(), full);

    let opts = ReadOptions::new().with_chunk_size(0);
    assert!(matches!(read_root_chunks(&path, &opts), Err(FrameError::InvalidOption(_))));
}

#[test]
fn append_adds_trees_and_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("append.root");
    write(&events(30), &path, "a", Mode::Write);
    write(&events(40), &path, "b", Mode::Append);

    assert_eq!(list_trees(&path).unwrap(), vec!["a", "b"]);
    let err = read_root(&path, &ReadOptions::new()).unwrap_err();
    assert!(matches!(&err, FrameError::AmbiguousTree { trees, .. } if trees.len() == 2));
    assert_eq!(read_root(&path, &ReadOptions::new().with_tree("a")).unwrap().n_rows(), 30);

    write(&events(50), &path, "b", Mode::Append);
    assert_eq!(list_trees(&path).unwrap(), vec!["a", "b"]);
    assert_eq!(read_root(&path, &ReadOptions::new().with_tree("b")).unwrap().n_rows(), 50);

    write(&events(5), &path, "c", Mode::Write);
    assert_eq!(list_trees(&path).unwrap(), vec!["c"]);
    assert!(matches!(
        read_root(&path, &ReadOptions::new().with_tree("a")),
        Err(FrameError::Root(RootError::TreeNotFound(_)))
    ));
}

#[test]
fn append_creates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.root");
    write(&events(3), &path, "t", Mode::Append);
    assert_eq!(read_root(&path, &ReadOptions::new()).unwrap().n_rows(), 3);
}

#[test]
fn empty_frame_writes_an_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.root");
    let df = events(0);
    write(&df, &path, "t", Mode::Write);

    let back = read_root(&path, &ReadOptions::new().with_where("jet_pt > 0")).unwrap();
    assert!(back.is_empty());
    assert_eq!(back.column_names(), df.column_names());
    assert_eq!(read_root_chunks(&path, &ReadOptions::new()).unwrap().count(), 0);
}

#[test]
fn non_root_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("text.root");
    std::fs::write(&path, "this is not a ROOT file, just some text padding it out").unwrap();
    assert!(matches!(
        read_root(&path, &ReadOptions::new()),
        Err(FrameError::Root(RootError::BadMagic))
    ));
}
