// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Ensure that all version of each macro can be used

use dmaflow_track::entity::toplevel;
use dmaflow_track::{
    Id, commit, debug, error, info, release, test_helpers, test_init, trace, value, warn,
};

macro_rules! build_with_entity {
    ($name:ident, $macro:ident, $slvl:expr) => (
        #[test]
        fn $name() {
            let (test_tracker, tracker) = test_init!(100);

            let top = toplevel(&tracker, "top");
            test_helpers::check_and_clear(&test_tracker, &["0: created 100, top"]);
            assert_eq!(top.id, Id(100));

            $macro!(top ; "Loc with no args");
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with no args")]);

            $macro!(top ; "Loc with {} argument", 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with 1 argument")]);

            $macro!(top ; "Loc with {}, {} arguments", 1, 1 + 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl,": Loc with 1, 2 arguments")]);

            drop(top);
            test_helpers::check_and_clear(&test_tracker, &["0: destroyed 100"]);
        }
    );
}

build_with_entity!(trace_with_entity, trace, "TRACE");
build_with_entity!(info_with_entity, info, "INFO");
build_with_entity!(debug_with_entity, debug, "DEBUG");
build_with_entity!(warn_with_entity, warn, "WARN");
build_with_entity!(error_with_entity, error, "ERROR");

#[test]
fn child_entities() {
    let (test_tracker, tracker) = test_init!(10);

    let top = toplevel(&tracker, "acquire");
    let producer = top.child("producer");
    test_helpers::check_and_clear(
        &test_tracker,
        &["0: created 10, acquire", "10: created 11, acquire::producer"],
    );

    drop(producer);
    test_helpers::check_and_clear(&test_tracker, &["10: destroyed 11"]);
}

#[test]
fn slot_events() {
    let (test_tracker, tracker) = test_init!(40);

    let top = toplevel(&tracker, "top");
    commit!(top ; 3, 65000);
    release!(top ; 3, 65000);
    value!(top ; 130000);
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 40, top",
            "40: commit slot 3, 65000 bytes",
            "40: release slot 3, 65000 bytes",
            "40: value 130000",
        ],
    );
}
