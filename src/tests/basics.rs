use anyhow::Result;

use crate::{Code, Connection, Error, Phase, State, Type, Value};

use super::data;

#[test]
fn connection_change_count() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::users(&c)?;

    assert_eq!(c.changes(), 1);
    assert_eq!(c.total_changes(), 1);

    c.execute("INSERT INTO users VALUES (2, 'Bob', NULL, NULL, NULL)")?;
    assert_eq!(c.changes(), 1);
    assert_eq!(c.total_changes(), 2);

    c.execute("UPDATE users SET name = 'Bob' WHERE id = 1")?;
    assert_eq!(c.changes(), 1);
    assert_eq!(c.total_changes(), 3);

    c.execute("DELETE FROM users")?;
    assert_eq!(c.changes(), 2);
    assert_eq!(c.total_changes(), 5);
    Ok(())
}

#[test]
fn connection_error() -> Result<()> {
    let c = Connection::open_in_memory()?;
    let e = c.execute(":)").unwrap_err();
    assert!(matches!(e, Error::Execute(..)));
    assert_eq!(e.code(), Code::ERROR);
    assert!(!e.engine().unwrap().message().is_empty());
    Ok(())
}

#[test]
fn prepare_reports_parameter_count() -> Result<()> {
    let c = Connection::open_in_memory()?;

    for (sql, expected) in [
        ("SELECT 1", 0),
        ("SELECT ?", 1),
        ("SELECT ?, ?, ?", 3),
        ("SELECT :a, :b, :a", 2),
        ("SELECT ?5", 5),
    ] {
        let stmt = c.prepare(sql)?;
        assert_eq!(stmt.parameter_count(), expected, "{sql}");
        assert_eq!(stmt.phase(), Phase::Prepared);
        assert_eq!(stmt.sql(), Some(sql));
        stmt.finalize()?;
    }

    Ok(())
}

#[test]
fn prepare_failure_keeps_connection_usable() -> Result<()> {
    let c = Connection::open_in_memory()?;

    let e = c.prepare("SELEKT 1").unwrap_err();
    assert!(matches!(e, Error::Prepare(..)));
    assert_eq!(e.code(), Code::ERROR);
    assert!(e.to_string().contains("SELEKT"));

    let e = c.prepare("  -- nothing here").unwrap_err();
    assert!(matches!(e, Error::Prepare(..)));
    assert_eq!(e.code(), Code::MISUSE);

    let e = c.prepare("SELECT\0 1").unwrap_err();
    assert!(matches!(e, Error::Prepare(..)));

    let mut stmt = c.prepare("SELECT 1")?;
    assert_eq!(stmt.step()?, State::Row);
    Ok(())
}

#[test]
fn done_is_idempotent_until_reset() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::english(&c)?;

    let mut stmt = c.prepare("SELECT value FROM english WHERE value LIKE '%type'")?;

    let mut count = 0;

    while stmt.step()?.is_row() {
        count += 1;
    }

    assert_eq!(count, 6);

    for _ in 0..3 {
        assert_eq!(stmt.step()?, State::Done);
        assert_eq!(stmt.phase(), Phase::Done);
    }

    stmt.reset()?;
    assert_eq!(stmt.phase(), Phase::Prepared);
    assert_eq!(stmt.step()?, State::Row);
    Ok(())
}

#[test]
fn bind_out_of_range() -> Result<()> {
    let c = Connection::open_in_memory()?;
    let mut stmt = c.prepare("SELECT ?, ?")?;

    for index in [0, -1, 3, i32::MAX] {
        let e = stmt.bind_int(index, 1).unwrap_err();
        assert!(matches!(e, Error::Bind(..)), "{index}");
        assert_eq!(e.code(), Code::RANGE, "{index}");
    }

    assert!(matches!(stmt.bind_string(3, "x"), Err(Error::Bind(..))));
    assert!(matches!(stmt.bind_blob(0, b"x"), Err(Error::Bind(..))));
    assert!(matches!(stmt.bind_null(3), Err(Error::Bind(..))));

    stmt.bind_int(1, 1)?;
    stmt.bind_int(2, 2)?;
    assert_eq!(stmt.step()?, State::Row);
    assert_eq!(stmt.column_int(1)?, 2);
    Ok(())
}

#[test]
fn bind_while_running_is_rejected() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::english(&c)?;

    let mut stmt = c.prepare("SELECT value FROM english WHERE value LIKE ?")?;
    stmt.bind_string(1, "%type")?;
    assert_eq!(stmt.step()?, State::Row);

    let e = stmt.bind_string(1, "%").unwrap_err();
    assert!(matches!(e, Error::Bind(..)));
    assert_eq!(e.code(), Code::MISUSE);

    stmt.reset()?;
    stmt.bind_string(1, "%")?;
    assert_eq!(stmt.step()?, State::Row);
    Ok(())
}

#[test]
fn statement_bind() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::users(&c)?;

    let mut stmt = c.prepare("INSERT INTO users VALUES (?, ?, ?, ?, ?)")?;

    stmt.bind_long(1, 2)?;
    stmt.bind_string(2, "Bob")?;
    stmt.bind_double(3, 69.42)?;
    stmt.bind_blob(4, &[0x69, 0x42])?;
    stmt.bind_null(5)?;

    assert!(stmt.step()?.is_done());
    Ok(())
}

#[test]
fn statement_bind_values() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::users(&c)?;

    let mut stmt = c.prepare("INSERT INTO users VALUES (?, ?, ?, ?, ?)")?;

    let e = stmt
        .bind_values(&[Value::from(2), Value::from("Bob")])
        .unwrap_err();

    assert!(matches!(e, Error::Bind(..)));
    assert_eq!(e.code(), Code::RANGE);
    assert!(e.to_string().contains("expected 5 bind arguments but 2 were provided"));

    stmt.bind_values(&[
        Value::from(2),
        Value::from(Some("Bob")),
        Value::from(true),
        Value::from(&[0x69u8, 0x42][..]),
        Value::from(None::<i64>),
    ])?;

    assert!(stmt.step()?.is_done());

    let mut stmt = c.prepare("SELECT name, age, email FROM users WHERE id = 2")?;
    assert!(stmt.step()?.is_row());
    assert_eq!(stmt.column_value(0)?, Value::Text(String::from("Bob")));
    assert_eq!(stmt.column_value(1)?, Value::Float(1.0));
    assert_eq!(stmt.column_value(2)?, Value::Null);
    Ok(())
}

#[test]
fn statement_read() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::users(&c)?;

    let mut stmt = c.prepare("SELECT * FROM users")?;

    assert!(stmt.step()?.is_row());
    assert_eq!(stmt.column_count(), 5);
    assert_eq!(stmt.column_long(0)?, 1);
    assert_eq!(stmt.column_string(1)?, Some("Alice"));
    assert_eq!(stmt.column_double(2)?, 42.69);
    assert_eq!(stmt.column_byte_array(3)?, Some(vec![0x42, 0x69]));
    assert_eq!(stmt.column_value(4)?, Value::Null);
    assert!(stmt.step()?.is_done());
    Ok(())
}

#[test]
fn statement_column_type() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::users(&c)?;

    let mut stmt = c.prepare("SELECT * FROM users")?;

    assert!(stmt.step()?.is_row());
    assert_eq!(stmt.column_type(0)?, Type::Integer);
    assert_eq!(stmt.column_type(1)?, Type::Text);
    assert_eq!(stmt.column_type(2)?, Type::Float);
    assert_eq!(stmt.column_type(3)?, Type::Blob);
    assert_eq!(stmt.column_type(4)?, Type::Null);
    Ok(())
}

#[test]
fn statement_column_name() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::users(&c)?;

    let stmt = c.prepare("SELECT id, name, age, photo AS user_photo FROM users")?;

    let names = (0..stmt.column_count())
        .filter_map(|n| stmt.column_name(n))
        .collect::<Vec<_>>();

    assert_eq!(names, ["id", "name", "age", "user_photo"]);
    assert_eq!(stmt.column_name(4), None);
    Ok(())
}

#[test]
fn null_reads() -> Result<()> {
    let c = Connection::open_in_memory()?;
    let mut stmt = c.prepare("SELECT NULL")?;
    assert!(stmt.step()?.is_row());

    assert!(stmt.column_is_null(0)?);
    assert_eq!(stmt.column_type(0)?, Type::Null);
    assert_eq!(stmt.column_int(0)?, 0);
    assert_eq!(stmt.column_long(0)?, 0);
    assert_eq!(stmt.column_double(0)?, 0.0);
    assert_eq!(stmt.column_string(0)?, None);
    assert_eq!(stmt.column_blob(0)?, None);
    assert_eq!(stmt.column_byte_array(0)?, None);
    assert_eq!(stmt.column_bytes(0)?, 0);
    assert_eq!(stmt.column_blob_into(0, &mut [0u8; 4])?, 0);
    assert_eq!(stmt.column_value(0)?, Value::Null);
    Ok(())
}

#[test]
fn numeric_reads_coerce() -> Result<()> {
    let c = Connection::open_in_memory()?;
    let mut stmt = c.prepare("SELECT '42', 2.9, 7, 4294967297")?;
    assert!(stmt.step()?.is_row());

    assert_eq!(stmt.column_int(0)?, 42);
    assert_eq!(stmt.column_long(1)?, 2);
    assert_eq!(stmt.column_double(2)?, 7.0);
    assert_eq!(stmt.column_string(2)?, Some("7"));
    assert_eq!(stmt.column_long(3)?, 4294967297);
    assert_eq!(stmt.column_int(3)?, 1);
    Ok(())
}

#[test]
fn column_reads_require_a_row() -> Result<()> {
    let c = Connection::open_in_memory()?;
    let mut stmt = c.prepare("SELECT 1")?;

    let e = stmt.column_int(0).unwrap_err();
    assert!(matches!(e, Error::Column(..)));
    assert_eq!(e.code(), Code::MISUSE);

    assert!(stmt.step()?.is_row());

    let e = stmt.column_int(1).unwrap_err();
    assert!(matches!(e, Error::Column(..)));
    assert_eq!(e.code(), Code::RANGE);

    let e = stmt.column_type(-1).unwrap_err();
    assert_eq!(e.code(), Code::RANGE);

    assert!(stmt.step()?.is_done());
    assert_eq!(stmt.column_int(0).unwrap_err().code(), Code::MISUSE);
    Ok(())
}

#[test]
fn column_string_rejects_invalid_utf8() -> Result<()> {
    let c = Connection::open_in_memory()?;
    let mut stmt = c.prepare("SELECT CAST(X'FF' AS TEXT)")?;
    assert!(stmt.step()?.is_row());

    let e = stmt.column_string(0).unwrap_err();
    assert!(matches!(e, Error::Column(..)));
    assert_eq!(e.code(), Code::MISMATCH);
    Ok(())
}

#[test]
fn failed_step_requires_reset() -> Result<()> {
    let c = Connection::open_in_memory()?;
    c.execute("CREATE TABLE t (a INTEGER UNIQUE)")?;
    c.execute("INSERT INTO t VALUES (1)")?;

    let mut stmt = c.prepare("INSERT INTO t VALUES (?)")?;
    stmt.bind_int(1, 1)?;

    let e = stmt.step().unwrap_err();
    assert!(matches!(e, Error::Step(..)));
    assert_eq!(e.code().primary(), Code::CONSTRAINT);
    assert_eq!(stmt.phase(), Phase::Failed);

    let e = stmt.step().unwrap_err();
    assert!(matches!(e, Error::Step(..)));
    assert_eq!(e.code(), Code::MISUSE);

    stmt.reset()?;
    stmt.bind_int(1, 2)?;
    assert_eq!(stmt.step()?, State::Done);
    stmt.finalize()?;
    Ok(())
}

#[test]
fn execute_insert_and_update() -> Result<()> {
    let c = Connection::open_in_memory()?;
    c.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, a INTEGER UNIQUE)")?;

    let mut insert = c.prepare("INSERT OR IGNORE INTO t (a) VALUES (?)")?;
    insert.bind_int(1, 10)?;
    assert_eq!(insert.execute_insert()?, Some(1));

    let e = insert.execute_insert().unwrap_err();
    assert!(matches!(e, Error::Execute(..)));
    assert_eq!(e.code(), Code::MISUSE);

    insert.reset()?;
    assert_eq!(insert.execute_insert()?, None);

    insert.reset()?;
    insert.bind_int(1, 20)?;
    assert_eq!(insert.execute_insert()?, Some(2));

    let mut update = c.prepare("UPDATE t SET a = a + 1")?;
    assert_eq!(update.execute_update()?, 2);

    let mut select = c.prepare("SELECT a FROM t")?;
    let e = select.execute_update().unwrap_err();
    assert!(matches!(e, Error::Execute(..)));
    assert_eq!(e.code(), Code::MISUSE);
    Ok(())
}

#[test]
fn schema_statements_change_no_rows() -> Result<()> {
    let c = Connection::open_in_memory()?;
    c.execute("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (1);")?;
    assert_eq!(c.changes(), 1);

    let mut create = c.prepare("CREATE TABLE u (a INTEGER)")?;
    assert_eq!(create.execute_insert()?, None);

    let mut create = c.prepare("CREATE TABLE v (a INTEGER)")?;
    assert_eq!(create.execute_update()?, 0);

    // The previous insert count is still reported by the connection.
    assert_eq!(c.changes(), 1);
    Ok(())
}

#[test]
fn dropped_connection_keeps_statement_alive() -> Result<()> {
    let c = Connection::open_in_memory()?;
    data::users(&c)?;

    let mut stmt = c.prepare("SELECT name FROM users")?;
    drop(c);

    assert!(stmt.step()?.is_row());
    assert_eq!(stmt.column_string(0)?, Some("Alice"));
    stmt.finalize()?;
    Ok(())
}
