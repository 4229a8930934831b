// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Ensure that all versions of each macro can be used

use std::io::Read;
use std::rc::Rc;

use lanes_track::builder::{Output, TrackerConfig, setup_trackers};
use lanes_track::entity::{Entity, toplevel};
use lanes_track::{
    Id, connect, create, debug, enter, error, exit, info, set_time, test_helpers, test_init,
    trace, value, warn,
};

macro_rules! build_with_entity {
    ($name:ident, $macro:ident, $slvl:expr) => (
        #[test]
        fn $name() {
            let (test_tracker, tracker) = test_init!(100);

            let top = toplevel(&tracker, "top");
            test_helpers::check_and_clear(&test_tracker, &["0: created 100, top, 0, 0 bytes"]);
            assert_eq!(top.id, Id(100));

            $macro!(top ; "Loc with no args");
            test_helpers::check_and_clear(&test_tracker, &[concat!("100: ", $slvl, ": Loc with no args")]);

            $macro!(top ; "Loc with {} argument", 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100: ", $slvl, ": Loc with 1 argument")]);

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

    let top = toplevel(&tracker, "top");
    let rc = Rc::new(Entity::new(&top, "rc"));
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 10, top, 0, 0 bytes",
            "10: created 11, top::rc, 0, 0 bytes",
        ],
    );

    let link = Entity::new(&top, "pcie1");
    connect!(rc ; link);
    test_helpers::check_and_clear(
        &test_tracker,
        &["10: created 12, top::pcie1", "11: connect to 12"],
    );
}

#[test]
fn enter_exit_value_time() {
    let (test_tracker, tracker) = test_init!(40);

    let top = toplevel(&tracker, "top");
    let packet = Id(7);
    enter!(top ; packet);
    exit!(top ; packet);
    value!(top ; 3usize);
    set_time!(top ; 2.5);
    create!(top ; 9usize, 64, 1);
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 40, top",
            "40: 7 entered",
            "40: 7 exited",
            "40: value 3",
            "40: set time 2.5ns",
            "40: created 9, 9, 1, 64 bytes",
        ],
    );
}

#[test]
fn file_tracker_filters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");

    {
        let config = TrackerConfig {
            output: Output::File(&path),
            level: lanes_track::log::Level::Debug,
            filter_regex: ".*switch.*",
        };
        let tracker = setup_trackers(&[config]).unwrap();
        let top = toplevel(&tracker, "top");
        let switch = Entity::new(&top, "switch");
        let link = Entity::new(&top, "pcie1");

        debug!(switch ; "switch message");
        debug!(link ; "link message");
        error!(link ; "link error");
        tracker.shutdown();
    }

    let mut contents = String::new();
    std::fs::File::open(&path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert!(contents.contains("DEBUG: switch message"));
    assert!(!contents.contains("link message"));
    assert!(contents.contains("ERROR: link error"));
}

/// Each output of a combined tracker applies its own filter.
#[test]
fn two_files_share_ids() {
    let dir = tempfile::tempdir().unwrap();
    let all = dir.path().join("all.log");
    let errors = dir.path().join("errors.log");

    {
        let configs = [
            TrackerConfig {
                output: Output::File(&all),
                level: lanes_track::log::Level::Trace,
                filter_regex: "",
            },
            TrackerConfig {
                output: Output::File(&errors),
                level: lanes_track::log::Level::Error,
                filter_regex: "",
            },
        ];
        let tracker = setup_trackers(&configs).unwrap();
        let top = toplevel(&tracker, "top");
        let link = Entity::new(&top, "pcie1");
        info!(link ; "trained");
        error!(link ; "lost");
        tracker.shutdown();
    }

    let all = std::fs::read_to_string(&all).unwrap();
    let errors = std::fs::read_to_string(&errors).unwrap();
    assert!(all.contains("3: INFO: trained"));
    assert!(all.contains("2: created 3, top::pcie1, 0, 0 bytes"));
    assert_eq!(errors, "3: ERROR: lost\n");
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("run.log");
    let config = TrackerConfig {
        output: Output::File(&path),
        level: lanes_track::log::Level::Warn,
        filter_regex: "",
    };
    let Err(err) = setup_trackers(&[config]) else {
        panic!("expected the log file to fail");
    };
    assert!(err.to_string().starts_with("failed to create "));
}
