//! Integration tests: write trees with `RootWriter`, read them back with `RootFile`.

use rf_root::key::Key;
use rf_root::rbuffer::RBuffer;
use rf_root::{
    Algorithm, BranchData, CacheConfig, Compression, LeafType, RootError, RootFile, RootWriter,
    TreeSpec, WriteMode,
};
use std::path::Path;

fn sample(lt: LeafType, n: usize) -> BranchData {
    let idx = 0..n;
    match lt {
        LeafType::Bool => idx.map(|i| i % 3 == 0).collect::<Vec<_>>().into(),
        LeafType::I8 => idx.map(|i| (i % 256) as u8 as i8).collect::<Vec<_>>().into(),
        LeafType::U8 => idx.map(|i| (i % 256) as u8).collect::<Vec<_>>().into(),
        LeafType::I16 => idx.map(|i| (i as i16).wrapping_mul(-7)).collect::<Vec<_>>().into(),
        LeafType::U16 => idx.map(|i| (i * 11) as u16).collect::<Vec<_>>().into(),
        LeafType::I32 => idx.map(|i| i as i32 - 500).collect::<Vec<_>>().into(),
        LeafType::U32 => idx.map(|i| (i as u32) * 3_000_000).collect::<Vec<_>>().into(),
        LeafType::I64 => idx.map(|i| (i as i64 - 10) * 1_000_000_007).collect::<Vec<_>>().into(),
        LeafType::U64 => idx.map(|i| u64::MAX - i as u64).collect::<Vec<_>>().into(),
        LeafType::F32 => idx.map(|i| i as f32 * 0.25 - 3.0).collect::<Vec<_>>().into(),
        LeafType::F64 => idx.map(|i| (i as f64).sin() * 1e3).collect::<Vec<_>>().into(),
    }
}

fn write(path: &Path, mode: WriteMode, spec: &TreeSpec<'_>) {
    let mut w = RootWriter::create(path, mode).expect("create writer");
    w.write_tree(spec).expect("write tree");
    w.finish().expect("finish file");
}

fn compressions() -> Vec<Compression> {
    vec![
        Compression::none(),
        Compression::default(),
        Compression::new(Algorithm::Zlib, 9),
        Compression::new(Algorithm::Lz4, 4),
        Compression::new(Algorithm::Zstd, 5),
        Compression::new(Algorithm::Lzma, 2),
    ]
}

#[test]
fn every_leaf_type_with_every_compression() {
    let dir = tempfile::tempdir().unwrap();
    let columns: Vec<(String, BranchData)> =
        LeafType::ALL.iter().map(|&lt| (format!("b_{}", lt), sample(lt, 777))).collect();

    for compression in compressions() {
        let path = dir.path().join(format!("all_{}.root", compression.setting()));
        let mut spec =
            TreeSpec::new("events").with_title("all types").with_compression(compression);
        for (name, data) in &columns {
            spec = spec.branch(name.clone(), data);
        }
        write(&path, WriteMode::Recreate, &spec);

        let f = RootFile::open(&path).unwrap();
        assert_eq!(f.list_trees().unwrap(), vec!["events"]);
        let tree = f.get_tree("events").unwrap();
        assert_eq!(tree.title, "all types");
        assert_eq!(tree.entries, 777);
        assert_eq!(tree.branches.len(), columns.len());

        for (name, data) in &columns {
            let info = tree.find_branch(name).unwrap();
            assert!(info.is_flat(), "{} should be flat", name);
            assert_eq!(info.leaf_type, Some(data.leaf_type()));
            let got = f.read_branch(&tree, name, 0..tree.entries).unwrap();
            assert_eq!(&got, data, "{} with {}", name, compression);
        }
    }
}

#[test]
fn many_small_baskets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baskets.root");
    let x = sample(LeafType::F64, 10_000);
    let n = sample(LeafType::I32, 10_000);
    let spec = TreeSpec::new("t").branch("x", &x).branch("n", &n).with_basket_size(1000);
    write(&path, WriteMode::Recreate, &spec);

    let f = RootFile::open(&path).unwrap();
    let tree = f.get_tree("t").unwrap();
    assert_eq!(tree.find_branch("x").unwrap().n_baskets, 80); // 125 doubles per basket
    assert_eq!(tree.find_branch("n").unwrap().n_baskets, 40);

    assert_eq!(f.read_branch(&tree, "x", 0..10_000).unwrap(), x);
    assert_eq!(f.read_branch(&tree, "n", 3210..5678).unwrap(), n.slice(3210..5678));
    assert_eq!(f.read_branch(&tree, "x", 9990..20_000).unwrap(), x.slice(9990..10_000));

    let chunks: Vec<BranchData> =
        (0..10).map(|k| f.read_branch(&tree, "x", k * 1000..(k + 1) * 1000).unwrap()).collect();
    let mut joined = BranchData::with_capacity(LeafType::F64, 10_000);
    for c in &chunks {
        joined.extend(c).unwrap();
    }
    assert_eq!(joined, x);
}

#[test]
fn cache_serves_second_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.root");
    let x = sample(LeafType::F32, 5000);
    write(&path, WriteMode::Recreate, &TreeSpec::new("t").branch("x", &x).with_basket_size(4000));

    let mut f = RootFile::open(&path).unwrap();
    f.set_cache_config(CacheConfig { max_bytes: 1 << 20, enabled: true });
    let tree = f.get_tree("t").unwrap();

    f.read_branch(&tree, "x", 0..5000).unwrap();
    let first = f.basket_cache().stats();
    assert_eq!(first.misses, 5);
    f.read_branch(&tree, "x", 0..5000).unwrap();
    let second = f.basket_cache().stats();
    assert_eq!(second.misses, first.misses, "second read should not miss");
    assert_eq!(second.hits, 5);
}

#[test]
fn empty_tree_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.root");
    let x = BranchData::from(Vec::<f64>::new());
    write(&path, WriteMode::Recreate, &TreeSpec::new("t").branch("x", &x));

    let f = RootFile::open(&path).unwrap();
    let tree = f.get_tree("t").unwrap();
    assert_eq!(tree.entries, 0);
    assert!(f.read_branch(&tree, "x", 0..0).unwrap().is_empty());
}

#[test]
fn append_keeps_existing_trees() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("append.root");
    let a = sample(LeafType::I64, 100);
    let b = sample(LeafType::U8, 50);
    let b2 = sample(LeafType::U8, 60);

    write(&path, WriteMode::Recreate, &TreeSpec::new("first").branch("a", &a));
    write(&path, WriteMode::Update, &TreeSpec::new("second").branch("b", &b));
    write(&path, WriteMode::Update, &TreeSpec::new("second").branch("b", &b2));

    let f = RootFile::open(&path).unwrap();
    assert_eq!(f.list_trees().unwrap(), vec!["first", "second"]);
    let cycles: Vec<u16> =
        f.list_keys().unwrap().iter().filter(|k| k.name == "second").map(|k| k.cycle).collect();
    assert_eq!(cycles, vec![1, 2]);

    let first = f.get_tree("first").unwrap();
    assert_eq!(f.read_branch(&first, "a", 0..100).unwrap(), a);
    let second = f.get_tree("second").unwrap();
    assert_eq!(second.entries, 60);
    assert_eq!(f.read_branch(&second, "b", 0..60).unwrap(), b2);
}

#[test]
fn recreate_discards_previous_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recreate.root");
    let a = sample(LeafType::I16, 10);
    write(&path, WriteMode::Recreate, &TreeSpec::new("old").branch("a", &a));
    write(&path, WriteMode::Recreate, &TreeSpec::new("new").branch("a", &a));

    let f = RootFile::open(&path).unwrap();
    assert_eq!(f.list_trees().unwrap(), vec!["new"]);
    assert!(matches!(f.get_tree("old"), Err(RootError::TreeNotFound(_))));
}

#[test]
fn lookup_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lookup.root");
    let a = sample(LeafType::F64, 10);
    write(&path, WriteMode::Recreate, &TreeSpec::new("t").branch("a", &a));

    let f = RootFile::open(&path).unwrap();
    assert!(matches!(f.get_tree("nope"), Err(RootError::TreeNotFound(_))));
    assert!(matches!(f.get_tree("dir/t"), Err(RootError::TreeNotFound(_))));
    let tree = f.get_tree("t").unwrap();
    assert!(matches!(f.read_branch(&tree, "b", 0..1), Err(RootError::BranchNotFound(_))));
}

#[test]
fn truncated_files_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.root");
    let x = sample(LeafType::F64, 2000);
    write(&path, WriteMode::Recreate, &TreeSpec::new("t").branch("x", &x).with_basket_size(2000));
    let bytes = std::fs::read(&path).unwrap();

    // everything needed to reach the data lies before the trailing free-segment record
    for cut in [0, 10, 63, 100, 150, bytes.len() / 2] {
        let result = RootFile::from_bytes(bytes[..cut].to_vec(), "cut.root").and_then(|f| {
            let tree = f.get_tree("t")?;
            f.read_branch(&tree, "x", 0..tree.entries)
        });
        assert!(result.is_err(), "file cut at {} bytes should not read", cut);
    }
}

#[test]
fn corrupted_basket_header_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.root");
    let x = BranchData::from(vec![0.0f64; 4096]);
    write(&path, WriteMode::Recreate, &TreeSpec::new("t").branch("x", &x));

    let mut bytes = std::fs::read(&path).unwrap();
    let seek = {
        let f = RootFile::from_bytes(bytes.clone(), "x.root").unwrap();
        let tree = f.get_tree("t").unwrap();
        tree.find_branch("x").unwrap().basket_seek[0] as usize
    };
    // the first compressed block starts right after the basket key
    let mut r = RBuffer::new(&bytes);
    r.set_pos(seek);
    let tag = seek + Key::read(&mut r).unwrap().key_len as usize;
    assert_eq!(&bytes[tag..tag + 2], b"ZL");
    bytes[tag] = b'Q';

    let f = RootFile::from_bytes(bytes, "x.root").unwrap();
    let tree = f.get_tree("t").unwrap();
    let err = f.read_branch(&tree, "x", 0..4096).unwrap_err();
    assert!(matches!(err, RootError::Decompression(_)), "unexpected error: {}", err);
}
