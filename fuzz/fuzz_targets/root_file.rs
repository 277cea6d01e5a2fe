#![no_main]

use libfuzzer_sys::fuzz_target;
use rf_root::RootFile;

fuzz_target!(|data: &[u8]| {
    let Ok(file) = RootFile::from_bytes(data.to_vec(), "fuzz.root") else {
        return;
    };
    let Ok(trees) = file.list_trees() else {
        return;
    };
    for name in trees {
        let Ok(tree) = file.get_tree(&name) else {
            continue;
        };
        for branch in tree.branches.iter().filter(|b| b.is_flat()) {
            let stop = tree.entries.min(1 << 16);
            let _ = file.read_branch(&tree, &branch.name, 0..stop);
        }
    }
});
