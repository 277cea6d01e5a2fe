use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rf_root::{
    Algorithm, BranchData, CacheConfig, CompiledExpr, Compression, RootFile, RootWriter, TreeSpec,
    WriteMode,
};
use std::hint::black_box;

const N: usize = 1_000_000;

fn write_fixture(dir: &std::path::Path, compression: Compression) -> std::path::PathBuf {
    let path = dir.join(format!("bench_{}.root", compression.setting()));
    let pt: Vec<f64> = (0..N).map(|i| ((i * 7919) % 1000) as f64 * 0.1).collect();
    let n: Vec<i32> = (0..N).map(|i| (i % 13) as i32).collect();
    let (pt, n) = (BranchData::from(pt), BranchData::from(n));

    let mut w = RootWriter::create(&path, WriteMode::Recreate).unwrap();
    let spec =
        TreeSpec::new("events").branch("pt", &pt).branch("n", &n).with_compression(compression);
    w.write_tree(&spec).unwrap();
    w.finish().unwrap();
    path
}

fn bench_read_branch(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("read_branch");
    group.throughput(Throughput::Bytes((N * 8) as u64));
    group.sample_size(20);

    for compression in [
        Compression::none(),
        Compression::default(),
        Compression::new(Algorithm::Lz4, 4),
        Compression::new(Algorithm::Zstd, 5),
    ] {
        let path = write_fixture(dir.path(), compression);
        let mut f = RootFile::open(&path).unwrap();
        f.set_cache_config(CacheConfig::disabled());
        let tree = f.get_tree("events").unwrap();

        group.bench_with_input(BenchmarkId::new("pt", compression), &tree, |b, tree| {
            b.iter(|| black_box(f.read_branch(tree, "pt", 0..tree.entries).unwrap()))
        });
    }
    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), Compression::default());
    let f = RootFile::open(&path).unwrap();
    let tree = f.get_tree("events").unwrap();
    let pt = f.read_branch(&tree, "pt", 0..tree.entries).unwrap().to_f64();
    let n = f.read_branch(&tree, "n", 0..tree.entries).unwrap().to_f64();
    let expr = CompiledExpr::compile("pt > 25 && (n % 2 == 0 || sqrt(pt) < 3)").unwrap();

    c.bench_function("eval_mask_1m", |b| {
        b.iter(|| black_box(expr.eval_mask(&[&pt, &n], N).unwrap()))
    });
}

criterion_group!(benches, bench_read_branch, bench_selection);
criterion_main!(benches);
