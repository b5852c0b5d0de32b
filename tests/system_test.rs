use minirel::{ColType, Context, Error, IndexScan, RecordScan, Rid, Value};

mod common;

fn decode_row(buf: &[u8]) -> (i32, i32) {
    (
        i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
    )
}

#[test]
fn test_point_lookup_and_range_scan() {
    let db = common::TestDb::new("sys_end_to_end");
    let txn = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &txn);

    db.sm.create_table("t", &common::two_int_cols()).unwrap();
    db.sm.create_index("t", "id", &ctx).unwrap();

    for (id, v) in [(1, 10), (2, 20), (3, 30)] {
        db.sm
            .insert_tuple("t", &[Value::Int(id), Value::Int(v)], &ctx)
            .unwrap();
    }

    // point lookup id = 2
    let ih = db.sm.index_handle("t", 0).unwrap();
    let rf = db.sm.record_file("t").unwrap();
    let rid = ih.get_value(&common::int_key(2), &txn).unwrap().unwrap();
    assert_eq!(decode_row(&rf.get_record(rid, &ctx).unwrap()), (2, 20));

    // range [1, 3)
    let begin = ih.lower_bound(&common::int_key(1)).unwrap();
    let end = ih.lower_bound(&common::int_key(3)).unwrap();
    let rows: Vec<(i32, i32)> = IndexScan::new(&ih, begin, end)
        .map(|rid| decode_row(&rf.get_record(rid, &ctx).unwrap()))
        .collect();
    assert_eq!(rows, vec![(1, 10), (2, 20)]);

    db.tm.commit(&txn).unwrap();
}

#[test]
fn test_catalog_round_trip_across_reopen() {
    let db = common::TestDb::new("sys_reopen");
    let txn = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &txn);

    db.sm.create_table("t", &common::two_int_cols()).unwrap();
    db.sm.create_index("t", "id", &ctx).unwrap();
    let rid = db
        .sm
        .insert_tuple("t", &[Value::Int(42), Value::Int(420)], &ctx)
        .unwrap();
    db.tm.commit(&txn).unwrap();

    db.sm.close_db().unwrap();
    db.sm.open_db("db").unwrap();

    // the catalog survived, including the index flag
    let tab = db.sm.table_meta("t").unwrap();
    assert_eq!(tab.cols.len(), 2);
    assert!(tab.cols[0].index);
    assert!(!tab.cols[1].index);
    assert_eq!(tab.cols[1].offset, 4);

    // and so did the data, in both the heap and the index
    let probe = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &probe);
    let rf = db.sm.record_file("t").unwrap();
    assert_eq!(decode_row(&rf.get_record(rid, &ctx).unwrap()), (42, 420));
    let ih = db.sm.index_handle("t", 0).unwrap();
    assert_eq!(
        ih.get_value(&common::int_key(42), &probe).unwrap(),
        Some(rid)
    );
    db.tm.commit(&probe).unwrap();
}

#[test]
fn test_create_index_over_existing_rows() {
    let db = common::TestDb::new("sys_index_backfill");
    let txn = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &txn);

    db.sm.create_table("t", &common::two_int_cols()).unwrap();
    for id in 0..50 {
        db.sm
            .insert_tuple("t", &[Value::Int(id), Value::Int(id * 10)], &ctx)
            .unwrap();
    }
    // rows first, index afterwards: the build scans the heap
    db.sm.create_index("t", "id", &ctx).unwrap();

    let ih = db.sm.index_handle("t", 0).unwrap();
    ih.check_integrity();
    let rf = db.sm.record_file("t").unwrap();
    for rid in RecordScan::new(&rf).collect::<Vec<Rid>>() {
        let rec = rf.get_record(rid, &ctx).unwrap();
        let (id, _) = decode_row(&rec);
        assert_eq!(ih.get_value(&common::int_key(id), &txn).unwrap(), Some(rid));
    }
    db.tm.commit(&txn).unwrap();
}

#[test]
fn test_index_record_consistency_through_dml() {
    let db = common::TestDb::new("sys_consistency");
    let txn = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &txn);

    db.sm.create_table("t", &common::two_int_cols()).unwrap();
    db.sm.create_index("t", "id", &ctx).unwrap();

    let mut rids = Vec::new();
    for id in 0..40 {
        rids.push(
            db.sm
                .insert_tuple("t", &[Value::Int(id), Value::Int(0)], &ctx)
                .unwrap(),
        );
    }
    for id in (0..40).step_by(3) {
        db.sm.delete_tuple("t", rids[id as usize], &ctx).unwrap();
    }
    for id in (1..40).step_by(3) {
        db.sm
            .update_tuple(
                "t",
                rids[id as usize],
                &[("id".to_string(), Value::Int(id + 1000))],
                &ctx,
            )
            .unwrap();
    }

    // every live record's key resolves back to its own rid
    let rf = db.sm.record_file("t").unwrap();
    let ih = db.sm.index_handle("t", 0).unwrap();
    ih.check_integrity();
    let mut live = 0;
    for rid in RecordScan::new(&rf).collect::<Vec<Rid>>() {
        let rec = rf.get_record(rid, &ctx).unwrap();
        let (id, _) = decode_row(&rec);
        assert_eq!(ih.get_value(&common::int_key(id), &txn).unwrap(), Some(rid));
        live += 1;
    }
    assert_eq!(live, 40 - 14);
    db.tm.commit(&txn).unwrap();
}

#[test]
fn test_catalog_errors() {
    let db = common::TestDb::new("sys_errors");
    let txn = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &txn);

    match db.sm.create_db("db") {
        Err(Error::DatabaseExists(_)) => {}
        other => panic!("expected DatabaseExists, got {:?}", other),
    }
    match db.sm.open_db("nope") {
        Err(Error::DatabaseNotFound(_)) => {}
        other => panic!("expected DatabaseNotFound, got {:?}", other),
    }

    db.sm.create_table("t", &common::two_int_cols()).unwrap();
    match db.sm.create_table("t", &common::two_int_cols()) {
        Err(Error::TableExists(_)) => {}
        other => panic!("expected TableExists, got {:?}", other),
    }
    match db.sm.table_meta("missing") {
        Err(Error::TableNotFound(_)) => {}
        other => panic!("expected TableNotFound, got {:?}", other),
    }

    db.sm.create_index("t", "id", &ctx).unwrap();
    match db.sm.create_index("t", "id", &ctx) {
        Err(Error::IndexExists { .. }) => {}
        other => panic!("expected IndexExists, got {:?}", other),
    }
    match db.sm.drop_index("t", "v", &ctx) {
        Err(Error::IndexNotFound { .. }) => {}
        other => panic!("expected IndexNotFound, got {:?}", other),
    }
    match db
        .sm
        .insert_tuple("t", &[Value::Int(1)], &ctx)
    {
        Err(Error::InvalidValueCount {
            expected: 2,
            got: 1,
        }) => {}
        other => panic!("expected InvalidValueCount, got {:?}", other),
    }
    db.tm.commit(&txn).unwrap();
}

#[test]
fn test_drop_index_and_table() {
    let db = common::TestDb::new("sys_drop");
    let txn = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &txn);

    db.sm.create_table("t", &common::two_int_cols()).unwrap();
    db.sm.create_index("t", "id", &ctx).unwrap();
    db.sm
        .insert_tuple("t", &[Value::Int(1), Value::Int(10)], &ctx)
        .unwrap();

    db.sm.drop_index("t", "id", &ctx).unwrap();
    assert!(!db.sm.table_meta("t").unwrap().cols[0].index);
    assert!(db.sm.index_handle("t", 0).is_err());

    db.sm.drop_table("t", &ctx).unwrap();
    assert!(db.sm.table_meta("t").is_err());
    assert!(db.sm.record_file("t").is_err());
    db.tm.commit(&txn).unwrap();
}

#[test]
fn test_float_and_str_columns() {
    let db = common::TestDb::new("sys_types");
    let txn = db.tm.begin(None);
    let ctx = Context::new(db.lock_manager(), &txn);

    let cols = vec![
        minirel::ColDef {
            name: "name".to_string(),
            col_type: ColType::Str,
            len: 12,
        },
        minirel::ColDef {
            name: "score".to_string(),
            col_type: ColType::Float,
            len: 4,
        },
    ];
    db.sm.create_table("s", &cols).unwrap();
    db.sm.create_index("s", "name", &ctx).unwrap();

    let rid = db
        .sm
        .insert_tuple(
            "s",
            &[Value::Str("ada".to_string()), Value::Float(9.5)],
            &ctx,
        )
        .unwrap();

    let tab = db.sm.table_meta("s").unwrap();
    let rf = db.sm.record_file("s").unwrap();
    let rec = rf.get_record(rid, &ctx).unwrap();
    assert_eq!(
        Value::from_bytes(&tab.cols[0], &rec[0..12]),
        Value::Str("ada".to_string())
    );
    assert_eq!(
        Value::from_bytes(&tab.cols[1], &rec[12..16]),
        Value::Float(9.5)
    );

    // the index key is the padded column image
    let ih = db.sm.index_handle("s", 0).unwrap();
    let mut key = b"ada".to_vec();
    key.resize(12, 0);
    assert_eq!(ih.get_value(&key, &txn).unwrap(), Some(rid));

    db.tm.commit(&txn).unwrap();
}
