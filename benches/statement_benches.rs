use std::sync::Arc;

use criterion::Criterion;
use handlite::{Bindings, Connection, OpenOptions, State};

criterion::criterion_group!(
    benches,
    read_statement,
    write_statement,
    read_blob,
    bindings_step
);
criterion::criterion_main!(benches);

fn read_statement(bencher: &mut Criterion) {
    let c = create();
    populate(&c, 100);

    let mut statement = c
        .prepare("SELECT * FROM data WHERE a > ? AND b > ?")
        .unwrap();

    bencher.bench_function("read_statement", |b| {
        b.iter(|| {
            statement.reset().unwrap();
            statement.bind_long(1, 42).unwrap();
            statement.bind_double(2, 42.0).unwrap();

            while let State::Row = statement.step().unwrap() {
                assert!(statement.column_long(0).unwrap() > 42);
                assert!(statement.column_double(1).unwrap() > 42.0);
            }
        });
    });
}

fn write_statement(bencher: &mut Criterion) {
    let c = create();

    let mut statement = c
        .prepare("INSERT INTO data (a, b, c, d) VALUES (?, ?, ?, ?)")
        .unwrap();

    bencher.bench_function("write_statement", |b| {
        b.iter(|| {
            statement.reset().unwrap();
            statement.bind_long(1, 42).unwrap();
            statement.bind_double(2, 42.0).unwrap();
            statement.bind_double(3, 42.0).unwrap();
            statement.bind_double(4, 42.0).unwrap();
            assert_eq!(statement.step().unwrap(), State::Done);
        });
    });
}

fn read_blob(bencher: &mut Criterion) {
    let c = create();
    c.execute("CREATE TABLE blobs (data BLOB)").unwrap();

    let payload: Arc<[u8]> = Arc::from(vec![0x42u8; 64 * 1024]);

    let mut insert = c.prepare("INSERT INTO blobs VALUES (?)").unwrap();
    insert
        .bind_shared_blob(1, payload.clone(), payload.len())
        .unwrap();
    insert.execute_insert().unwrap();
    insert.finalize().unwrap();

    let mut statement = c.prepare("SELECT data FROM blobs").unwrap();
    let mut buffer = vec![0u8; payload.len()];

    bencher.bench_function("read_blob_into", |b| {
        b.iter(|| {
            statement.reset().unwrap();
            assert_eq!(statement.step().unwrap(), State::Row);
            let n = statement.column_blob_into(0, &mut buffer).unwrap();
            assert_eq!(n, payload.len());
        });
    });
}

fn bindings_step(bencher: &mut Criterion) {
    let mut bindings = Bindings::new();

    let c = bindings
        .open_with(&OpenOptions::new(), ":memory:")
        .unwrap();

    bindings
        .execute(c, "CREATE TABLE data (a INTEGER, b REAL)")
        .unwrap();

    let (statement, _) = bindings
        .prepare(c, "INSERT INTO data (a, b) VALUES (?, ?)")
        .unwrap();

    bencher.bench_function("bindings_step", |b| {
        b.iter(|| {
            bindings.reset(statement).unwrap();
            bindings.bind_long(statement, 1, 42).unwrap();
            bindings.bind_double(statement, 2, 42.0).unwrap();
            assert_eq!(bindings.step(statement).unwrap(), State::Done);
        });
    });
}

fn create() -> Connection {
    let c = Connection::open_in_memory().unwrap();
    c.execute("CREATE TABLE data (a INTEGER, b REAL, c REAL, d REAL)")
        .unwrap();
    c
}

fn populate(c: &Connection, count: usize) {
    let mut statement = c
        .prepare("INSERT INTO data (a, b, c, d) VALUES (?, ?, ?, ?)")
        .unwrap();

    for i in 0..count {
        statement.reset().unwrap();
        statement.bind_long(1, i as i64).unwrap();
        statement.bind_double(2, i as f64).unwrap();
        statement.bind_double(3, i as f64).unwrap();
        statement.bind_double(4, i as f64).unwrap();
        assert_eq!(statement.step().unwrap(), State::Done);
    }
}
