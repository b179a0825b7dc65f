use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;

use ledgerbox::ledger::{LedgerError, MergeOptions, RecordHandler};
use ledgerbox::ledger::schema::{compact_fields, legacy_fields};

const LEGACY_HEADER: &str = "IDENTIFIER\tSETSPEC\tCREATED\tINFO\tSTATE\tSTATE_TIME";

fn write_ledger(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::from(LEGACY_HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(&path, content).unwrap();
    path
}

/// Six records in the legacy layout, exactly one of them still open.
fn oai_record_list(dir: &Path) -> PathBuf {
    write_ledger(
        dir,
        "ocr_list",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853011\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tocr_skip\t2021-08-03_15:03:56",
            "oai:digitale.bibliothek.uni-halle.de/zd:17320046\tn.a.\t2021-09-01T15:25:43Z\t17320046,issue,ger,20\tupload_done\t2021-09-09_22:57:45",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853012\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tocr_skip\t2021-08-03_15:14:45",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853013\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tocr_skip\t2021-08-03_15:20:45",
            "oai:digitale.bibliothek.uni-halle.de/zd:9510507\tn.a.\t2015-08-25T20:00:35Z\t9510507,issue,ger\tocr_done\t2021-08-03_16:44:54",
            "oai:digitale.bibliothek.uni-halle.de/zd:9510508\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
        ],
    )
}

#[test]
fn test_explicit_fields_must_match_file_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("invalid.tsv");
    fs::write(&path, "123\t456\t789\t0\n124\t457\t790\t1\n").unwrap();

    let result = RecordHandler::builder()
        .path(&path)
        .fields(compact_fields())
        .build();

    let err = result.err().unwrap();
    assert!(err.to_string().contains("invalid fields"));
}

#[test]
fn test_lease_cycle_with_custom_lock_mark() {
    let dir = TempDir::new().unwrap();
    let path = write_ledger(
        dir.path(),
        "valid.tsv",
        &[
            "oai:myhost.de/dod:123\tdod##book\t2009-11-03T13:20:32Z\tn.a.\tn.a.\tn.a.",
            "oai:myhost.de/dod:124\tdod##book\t2009-11-04T13:20:32Z\tn.a.\tn.a.\tn.a.",
        ],
    );
    let mut handler = RecordHandler::builder()
        .path(&path)
        .mark_lock("ocr_done")
        .build()
        .unwrap();

    let first = handler.next_record(None).unwrap();
    assert_eq!(first.identifier(), "oai:myhost.de/dod:123");
    handler
        .save_record_state(first.identifier(), Some("ocr_done"), &[("INFO", "444")])
        .unwrap();

    let second = handler.next_record(None).unwrap();
    assert_eq!(second.identifier(), "oai:myhost.de/dod:124");
    handler
        .save_record_state(second.identifier(), Some("ocr_done"), &[("INFO", "555")])
        .unwrap();

    assert!(handler.next_record(None).is_none());
}

#[test]
fn test_position_markers_and_set_spec() {
    let dir = TempDir::new().unwrap();
    let path = write_ledger(
        dir.path(),
        "vl_datasets.tsv",
        &[
            "oai:menadoc.bibliothek.uni-halle.de/menalib:1416976\tmenalib\t2009-11-03T13:20:32Z\tn.a.\tn.a.\tn.a.",
            "oai:digitale.bibliothek.uni-halle.de/vd17:696\tpon##book\t2009-11-04T13:20:32Z\tn.a.\tn.a.\tn.a.",
        ],
    );
    let mut handler = RecordHandler::load(&path).unwrap();

    let first = handler.next_record(None).unwrap();
    assert_eq!(handler.position(), Some("0001/0002"));
    assert_eq!(first.local_identifier(), "1416976");
    assert_eq!(first.set_spec, "menalib");
    handler
        .save_record_state(first.identifier(), Some("busy"), &[])
        .unwrap();

    let second = handler.next_record(None).unwrap();
    assert_eq!(handler.position(), Some("0002/0002"));
    assert_eq!(second.local_identifier(), "696");
    assert_eq!(second.set_spec, "pon##book");
}

#[test]
fn test_info_override_survives_later_state_change() {
    let dir = TempDir::new().unwrap();
    let path = write_ledger(
        dir.path(),
        "vl_datasets.tsv",
        &[
            "oai:menadoc.bibliothek.uni-halle.de/menalib:1416976\tmenalib\t2009-11-03T13:20:32Z\tn.a.\tn.a.\tn.a.",
        ],
    );
    let mut handler = RecordHandler::load(&path).unwrap();
    let record = handler.next_record(None).unwrap();

    handler
        .save_record_state(record.identifier(), Some("metadata_done"), &[("INFO", "123,ger")])
        .unwrap();
    handler
        .save_record_state(record.identifier(), Some("migration_done"), &[])
        .unwrap();

    let done = handler.next_record(Some("migration_done")).unwrap();
    assert_eq!(done.local_identifier(), "1416976");
    let lines: Vec<String> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    let columns: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(columns[3], "123,ger");
}

#[test]
fn test_save_unknown_identifier_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = oai_record_list(dir.path());
    let mut handler = RecordHandler::load(&path).unwrap();

    let result = handler.save_record_state("foo", None, &[]);
    let err = result.err().unwrap();
    assert!(matches!(err, LedgerError::NotFound { .. }));
    assert!(err.to_string().contains("no record foo"));
}

#[test]
fn test_lease_exclusivity_on_single_open_record() {
    let dir = TempDir::new().unwrap();
    let path = oai_record_list(dir.path());
    let mut handler = RecordHandler::builder()
        .path(&path)
        .fields(legacy_fields())
        .build()
        .unwrap();

    let record = handler.next_record(None).unwrap();
    assert_eq!(handler.position(), Some("0006/0006"));
    assert_eq!(
        record.identifier(),
        "oai:digitale.bibliothek.uni-halle.de/zd:9510508"
    );
    assert_eq!(record.local_identifier(), "9510508");
    assert_eq!(record.created_time, "2015-08-25T20:00:35Z");
    handler.save_record_state(record.identifier(), None, &[]).unwrap();

    // no open record left, but the leased one is findable under the lock mark
    assert!(handler.next_record(None).is_none());
    assert!(handler.next_record(Some("busy")).is_some());

    // a fresh handler sees the persisted lease too
    let mut reloaded = RecordHandler::load(&path).unwrap();
    assert!(reloaded.next_record(None).is_none());
    assert!(reloaded.next_record(Some("busy")).is_some());
}

#[test]
fn test_get_exact_and_partial() {
    let dir = TempDir::new().unwrap();
    let path = oai_record_list(dir.path());
    let handler = RecordHandler::load(&path).unwrap();
    let urn = "oai:digitale.bibliothek.uni-halle.de/zd:9510508";

    let exact = handler.get(urn).unwrap();
    assert_eq!(exact.identifier(), urn);
    assert_eq!(exact.created_time, "2015-08-25T20:00:35Z");

    assert!(handler.get("9510508").is_none());
    let partial = handler.get_partial("9510508").unwrap();
    assert_eq!(partial.identifier(), urn);

    assert!(handler.get("9510509").is_none());
    assert!(handler.get_partial("9510509").is_none());
}

fn list_a(dir: &Path) -> PathBuf {
    write_ledger(
        dir,
        "oai_list_a",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853012\tn.a.\t2015-08-25T20:00:35Z\tinfo1\tupload_done\t2021-08-03_15:14:45",
        ],
    )
}

fn list_b(dir: &Path) -> PathBuf {
    write_ledger(
        dir,
        "oai_list_b",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853012\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853013\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
        ],
    )
}

#[test]
fn test_merge_dry_run_counts_without_writing() {
    let dir = TempDir::new().unwrap();
    let path_a = list_a(dir.path());
    let path_b = list_b(dir.path());
    let mut handler = RecordHandler::load(&path_a).unwrap();

    assert!(
        handler
            .next_record(Some("upload_done"))
            .unwrap()
            .identifier()
            .ends_with("8853012")
    );

    let options = MergeOptions {
        ignore_state: None,
        ..MergeOptions::default()
    };
    let outcome = handler.merges_path(&path_b, &options).unwrap();

    assert_eq!(outcome.merges, 0);
    assert_eq!(outcome.misses, 1);
    assert_eq!(outcome.appendeds, 1);
    // dry run: still only one record
    assert_eq!(handler.len(), 1);
}

#[test]
fn test_merge_preserves_local_state_via_ignore() {
    let dir = TempDir::new().unwrap();
    let path_a = list_a(dir.path());
    let path_b = list_b(dir.path());
    let mut handler = RecordHandler::load(&path_a).unwrap();

    let options = MergeOptions {
        dry_run: false,
        ..MergeOptions::default()
    };
    let outcome = handler.merges_path(&path_b, &options).unwrap();

    // candidate in the open state is ignored, the local result survives
    assert_eq!(outcome.merges, 0);
    assert_eq!(outcome.ignores, 1);
    assert_eq!(outcome.appendeds, 1);
    assert_eq!(handler.len(), 2);
    assert!(
        handler
            .next_record(Some("upload_done"))
            .unwrap()
            .identifier()
            .ends_with("8853012")
    );
    assert!(handler.next_record(None).unwrap().identifier().ends_with("8853013"));
}

#[test]
fn test_merge_overwrites_with_ignore_disabled() {
    let dir = TempDir::new().unwrap();
    let path_a = list_a(dir.path());
    let path_b = write_ledger(
        dir.path(),
        "oai_list_b",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853013\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853012\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
        ],
    );
    let mut handler = RecordHandler::load(&path_a).unwrap();

    let options = MergeOptions {
        dry_run: false,
        ignore_state: None,
        ..MergeOptions::default()
    };
    let outcome = handler.merges_path(&path_b, &options).unwrap();

    assert_eq!(outcome.merges, 1);
    assert_eq!(outcome.ignores, 0);
    assert_eq!(outcome.appendeds, 1);
    assert_eq!(handler.len(), 2);

    let first = handler.next_record(None).unwrap();
    assert!(first.identifier().ends_with("8853012"));
    handler
        .save_record_state(first.identifier(), Some("foo_bar"), &[])
        .unwrap();
    assert!(handler.next_record(None).unwrap().identifier().ends_with("8853013"));
}

#[test]
fn test_merge_cross_keeps_newer_sides() {
    let dir = TempDir::new().unwrap();
    let path_1 = write_ledger(
        dir.path(),
        "oai_list1",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853012\tn.a.\t2015-08-25T20:00:35Z\tinfo1\tupload_done\t2021-08-03_15:14:45",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853013\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
        ],
    );
    let path_2 = write_ledger(
        dir.path(),
        "oai_list2",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853012\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853013\tn.a.\t2015-08-25T20:00:35Z\tinfo2\tocr_fail\t2021-08-03_16:14:45",
        ],
    );
    let mut handler = RecordHandler::load(&path_1).unwrap();
    assert!(handler.next_record(None).unwrap().identifier().ends_with("8853013"));

    let options = MergeOptions {
        dry_run: false,
        ..MergeOptions::default()
    };
    let outcome = handler.merges_path(&path_2, &options).unwrap();

    assert_eq!(outcome.merges, 1);
    assert_eq!(outcome.ignores, 1);
    assert_eq!(outcome.appendeds, 0);
    assert!(handler.next_record(Some("n.a.")).is_none());

    let failed = handler.next_record(Some("ocr_fail")).unwrap();
    assert!(failed.identifier().ends_with("8853013"));
    assert_eq!(failed.state_time(), "2021-08-03_16:14:45");
}

#[test]
fn test_merge_combines_info_mappings() {
    let dir = TempDir::new().unwrap();
    let path_a = write_ledger(
        dir.path(),
        "oai_list_a",
        &[
            "123\tn.a.\t2015-08-25T20:00:35Z\t{'pages':23, 'ods_created':'1984-10-03'}\tu.a.\tn.a.",
            "124\tn.a.\t2015-08-25T20:00:35Z\t{'pages':24, 'ods_created':'1985-05-05'}\tn.a.\tn.a.",
        ],
    );
    let path_b = write_ledger(
        dir.path(),
        "oai_list_b",
        &["123\tn.a.\t2015-08-25T20:00:35Z\t{'pages':23, 'n_ocr':20}\tocr_done\t2024-10-18_11:12:00"],
    );
    let mut handler = RecordHandler::load(&path_a).unwrap();

    let options = MergeOptions {
        dry_run: false,
        ..MergeOptions::default()
    };
    let outcome = handler.merges_path(&path_b, &options).unwrap();

    assert_eq!(outcome.merges, 1);
    assert_eq!(outcome.ignores, 0);
    assert_eq!(outcome.appendeds, 0);
    assert_eq!(handler.len(), 2);

    let merged = handler.next_record(Some("ocr_done")).unwrap();
    let map = merged.info.as_map().unwrap();
    assert_eq!(map["pages"], json!(23));
    assert_eq!(map["n_ocr"], json!(20));
    assert_eq!(map["ods_created"], json!("1984-10-03"));
}

#[test]
fn test_merge_handles_quoted_info_and_survives_reload() {
    let dir = TempDir::new().unwrap();
    let path_a = write_ledger(
        dir.path(),
        "oai_list_a",
        &["123\tn.a.\t2015-08-25T20:00:35Z\t{'pages':23, 'ods_created':'1984-10-03'}\tu.a.\tn.a."],
    );
    let quoted_row = "123\tn.a.\t2015-08-25T20:00:35Z\t\"{'xml_invalid': \"Element 'mods:subtitle': This element is not expected.\"}\"\tocr_done\t2024-10-18_11:12:00";
    let path_b = write_ledger(dir.path(), "oai_list_b", &[quoted_row]);
    let mut handler = RecordHandler::load(&path_a).unwrap();

    let options = MergeOptions {
        dry_run: false,
        ..MergeOptions::default()
    };
    handler.merges_path(&path_b, &options).unwrap();

    let mut reloaded = RecordHandler::load(&path_a).unwrap();
    let merged = reloaded.next_record(Some("ocr_done")).unwrap();
    let map = merged.info.as_map().unwrap();
    assert_eq!(map["pages"], json!(23));
    assert_eq!(map["ods_created"], json!("1984-10-03"));
    assert_eq!(
        map["xml_invalid"],
        json!("Element 'mods:subtitle': This element is not expected.")
    );
}

#[test]
fn test_merge_rejects_different_headers() {
    let dir = TempDir::new().unwrap();
    let path_a = oai_record_list(dir.path());
    let path_b = dir.path().join("compact.tsv");
    fs::write(
        &path_b,
        "IDENTIFIER\tINFO\tSTATE\tSTATE_TIME\noai:host:1\tn.a.\tn.a.\tn.a.\n",
    )
    .unwrap();
    let mut handler = RecordHandler::load(&path_a).unwrap();

    let result = handler.merges_path(&path_b, &MergeOptions::default());
    assert!(result.err().unwrap().to_string().contains("invalid fields"));
}

#[test]
fn test_merge_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path_1 = write_ledger(
        dir.path(),
        "oai_list1",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853012\tn.a.\t2015-08-25T20:00:35Z\tinfo1\tupload_done\t2021-08-03_15:14:45",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853013\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
        ],
    );
    let path_2 = write_ledger(
        dir.path(),
        "oai_list2",
        &[
            "oai:digitale.bibliothek.uni-halle.de/zd:8853013\tn.a.\t2015-08-25T20:00:35Z\tinfo2\tocr_fail\t2021-08-03_16:14:45",
            "oai:digitale.bibliothek.uni-halle.de/zd:8853014\tn.a.\t2015-08-25T20:00:35Z\tn.a.\tn.a.\tn.a.",
        ],
    );
    let options = MergeOptions {
        dry_run: false,
        ..MergeOptions::default()
    };

    let mut handler = RecordHandler::load(&path_1).unwrap();
    handler.merges_path(&path_2, &options).unwrap();
    let after_first = fs::read_to_string(&path_1).unwrap();

    let mut handler = RecordHandler::load(&path_1).unwrap();
    handler.merges_path(&path_2, &options).unwrap();
    let after_second = fs::read_to_string(&path_1).unwrap();

    assert_eq!(after_first, after_second);
}

#[test]
fn test_frame_masks_records_outside_window() {
    let dir = TempDir::new().unwrap();
    let path = oai_record_list(dir.path());
    let handler = RecordHandler::load(&path).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let out_path = handler.frame(3, None, None, None).unwrap();

    assert!(out_path.exists());
    assert_eq!(
        out_path.file_name().unwrap().to_str().unwrap(),
        "ocr_list_03_06.csv"
    );
    // source untouched
    assert_eq!(fs::read_to_string(&path).unwrap(), before);

    let mut frame_handler = RecordHandler::load(&out_path).unwrap();
    assert_eq!(frame_handler.len(), 6);
    // first and second record were masked out
    let masked = frame_handler
        .states(
            &[ledgerbox::ledger::Criteria::state("other_load")],
            None,
            true,
            false,
        )
        .unwrap();
    assert_eq!(masked, 2);
}

#[test]
fn test_frame_window_and_sorting() {
    let dir = TempDir::new().unwrap();
    let path = oai_record_list(dir.path());
    let handler = RecordHandler::load(&path).unwrap();

    let out_path = handler
        .frame(2, Some(2), Some("elsewhere"), Some("IDENTIFIER"))
        .unwrap();
    assert_eq!(
        out_path.file_name().unwrap().to_str().unwrap(),
        "ocr_list_02_03.csv"
    );

    let mut frame_handler = RecordHandler::load(&out_path).unwrap();
    assert_eq!(frame_handler.len(), 6);
    let masked = frame_handler
        .states(
            &[ledgerbox::ledger::Criteria::state("elsewhere")],
            None,
            true,
            false,
        )
        .unwrap();
    assert_eq!(masked, 4);

    // sorted by identifier, so 17320046 leads and the first masked row is 8853011
    let leading = frame_handler.next_record(Some("upload_done")).unwrap();
    assert!(leading.identifier().ends_with("17320046"));
    assert_eq!(frame_handler.position(), Some("0001/0006"));
    let first_masked = frame_handler.next_record(Some("elsewhere")).unwrap();
    assert!(first_masked.identifier().ends_with("8853011"));

    let unknown_sort = handler.frame(1, None, None, Some("NO_SUCH_FIELD"));
    assert!(matches!(
        unknown_sort,
        Err(LedgerError::UnknownField { .. })
    ));
}

#[test]
fn test_rewrite_keeps_untouched_rows_verbatim() {
    let dir = TempDir::new().unwrap();
    let path = oai_record_list(dir.path());
    let before: Vec<String> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();

    let mut handler = RecordHandler::load(&path).unwrap();
    let record = handler.next_record(None).unwrap();
    handler.save_record_state(record.identifier(), None, &[]).unwrap();

    let after: Vec<String> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    assert_eq!(before.len(), after.len());
    // only the leased row (last one) changed
    for (line_before, line_after) in before.iter().zip(&after).take(before.len() - 1) {
        assert_eq!(line_before, line_after);
    }
    assert_ne!(before.last(), after.last());
}
