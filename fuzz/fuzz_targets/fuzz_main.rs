// SPDX-License-Identifier: AGPL-3.0-or-later
#![no_main]

use libfuzzer_sys::fuzz_target;
use mebdf_core::{export, import, parse, serialize, ConvertConfig, Snapshot};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // serializing is idempotent after the first parse
    let once = serialize(&parse(text).document);
    let twice = serialize(&parse(&once).document);
    assert_eq!(once, twice);

    let config = ConvertConfig::default();
    let snapshot = Snapshot::from_mebdf(text, &config);
    let exported = export(&snapshot, &config).content;
    if let Ok(result) = import(&snapshot, &exported, &config) {
        assert!(result.mutation_ops.is_empty(), "re-import of {exported:?} produced ops");
    }
});
