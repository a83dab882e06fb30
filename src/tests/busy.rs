use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::{Code, Connection, Error, OpenOptions, Phase, State};

use super::data;

#[test]
fn connection_open_with_flags() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("database.sqlite3");

    let c = OpenOptions::new().open(&path)?;
    data::users(&c)?;
    c.close()?;

    let c = OpenOptions::new().read_only().open(&path)?;

    let e = c
        .execute("INSERT INTO users VALUES (2, 'Bob', NULL, NULL, NULL)")
        .unwrap_err();

    assert_eq!(e.code().primary(), Code::READONLY);
    Ok(())
}

#[test]
fn read_only_missing_file() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("missing.sqlite3");

    let e = OpenOptions::new().read_only().open(&path).unwrap_err();
    assert!(matches!(e, Error::Open(..)));
    assert_eq!(e.code().primary(), Code::CANTOPEN);
    Ok(())
}

#[test]
fn failed_open_keeps_temp_directory() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("missing.sqlite3");
    let temp = dir.path().join("unused-temp");

    let e = OpenOptions::new()
        .read_only()
        .temp_directory(&temp)
        .open(&path)
        .unwrap_err();

    assert_eq!(e.code().primary(), Code::CANTOPEN);
    assert_ne!(crate::temp_directory::current(), Some(temp));
    Ok(())
}

#[test]
fn open_rejects_non_database() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("garbage.sqlite3");
    std::fs::write(&path, b"this is not a database, just some text. ".repeat(64))?;

    let e = Connection::open(&path, dir.path()).unwrap_err();
    assert!(matches!(e, Error::Open(..)));
    assert_eq!(e.code().primary(), Code::NOTADB);

    // Without validation the failure only shows up on first access.
    let c = OpenOptions::new().validate(false).open(&path)?;
    let e = c.execute("SELECT * FROM sqlite_master").unwrap_err();
    assert_eq!(e.code().primary(), Code::NOTADB);
    Ok(())
}

#[test]
fn step_reports_busy() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("database.sqlite3");

    let writer = OpenOptions::new().open(&path)?;
    data::users(&writer)?;

    let other = OpenOptions::new().open(&path)?;

    writer.execute("BEGIN IMMEDIATE")?;
    writer.execute("INSERT INTO users VALUES (2, 'Bob', NULL, NULL, NULL)")?;

    let mut stmt = other.prepare("INSERT INTO users VALUES (3, 'Carol', NULL, NULL, NULL)")?;

    assert_eq!(stmt.step()?, State::Busy);
    assert_eq!(stmt.phase(), Phase::Busy);
    assert_eq!(stmt.step()?, State::Busy);

    writer.execute("COMMIT")?;

    assert_eq!(stmt.step()?, State::Done);
    stmt.finalize()?;

    let count = other.execute_int("SELECT COUNT(*) FROM users", &[])?;
    assert_eq!(count, Some(3));
    Ok(())
}

#[test]
fn execute_reports_busy_as_error() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("database.sqlite3");

    let writer = OpenOptions::new().open(&path)?;
    data::users(&writer)?;

    let other = OpenOptions::new().open(&path)?;

    writer.execute("BEGIN IMMEDIATE")?;

    let mut stmt = other.prepare("DELETE FROM users")?;
    let e = stmt.execute_update().unwrap_err();
    assert!(matches!(e, Error::Execute(..)));
    assert_eq!(e.code().primary(), Code::BUSY);

    writer.execute("COMMIT")?;

    // A busy statement can be executed again without a reset.
    assert_eq!(stmt.execute_update()?, 1);
    Ok(())
}

#[test]
fn connection_busy_timeout() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("database.sqlite3");

    let c = OpenOptions::new().open(&path)?;
    data::users(&c)?;

    let mut guards = Vec::with_capacity(16);

    for n in 0..16 {
        let path = path.clone();

        guards.push(thread::spawn(move || -> Result<bool> {
            let c = OpenOptions::new()
                .busy_timeout(Duration::from_secs(30))
                .open(path)?;

            let mut stmt = c.prepare("INSERT INTO users VALUES (?, ?, ?, ?, ?)")?;
            stmt.bind_long(1, n + 2)?;
            stmt.bind_string(2, "Bob")?;
            stmt.bind_double(3, 69.42)?;
            stmt.bind_blob(4, &[0x69, 0x42])?;
            stmt.bind_null(5)?;
            assert!(stmt.step()?.is_done());
            stmt.finalize()?;
            c.close()?;
            Ok(true)
        }));
    }

    for guard in guards {
        assert!(guard.join().expect("thread panicked")?);
    }

    assert_eq!(c.execute_int("SELECT COUNT(*) FROM users", &[])?, Some(17));
    Ok(())
}

#[test]
fn concurrent_opens_on_distinct_files() -> Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;

    let mut guards = Vec::with_capacity(8);

    for n in 0..8 {
        let root = dir.path().to_path_buf();

        guards.push(thread::spawn(move || -> Result<i32> {
            let temp = root.join(format!("temp-{n}"));
            std::fs::create_dir_all(&temp)?;

            let c = Connection::open(root.join(format!("db-{n}.sqlite3")), &temp)?;
            c.execute("CREATE TABLE t (a INTEGER)")?;

            let mut stmt = c.prepare("INSERT INTO t VALUES (?)")?;
            stmt.bind_int(1, n)?;
            stmt.execute_insert()?;
            stmt.finalize()?;

            let value = c.execute_int("SELECT a FROM t", &[])?;
            c.close()?;
            Ok(value.unwrap_or(-1))
        }));
    }

    for (n, guard) in guards.into_iter().enumerate() {
        assert_eq!(guard.join().expect("thread panicked")?, n as i32);
    }

    assert!(crate::temp_directory::current().is_some());
    Ok(())
}

#[test]
fn statement_is_send() -> Result<()> {
    let c = Connection::open_in_memory()?;
    let mut stmt = c.prepare("SELECT 42")?;

    let value = thread::spawn(move || -> crate::Result<i32> {
        assert!(stmt.step()?.is_row());
        stmt.column_int(0)
    })
    .join()
    .expect("thread panicked")?;

    assert_eq!(value, 42);
    Ok(())
}
