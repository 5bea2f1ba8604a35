mod common;

use common::{FakeBackend, Script};
use spanner_dbapi::{
    named_params, params, ErrorKind, Param, StructType, Type, TypeCode, Value, NUMBER, STRING,
    UNSET_COUNT,
};

fn people() -> Script {
    Script::new(
        StructType::new(vec![("id", Type::Int64), ("name", Type::String)]),
        vec![
            vec![Value::Int64(1), Value::String("ferris".to_string())],
            vec![Value::Int64(2), Value::String("corro".to_string())],
            vec![Value::Int64(3), Value::Null(Type::String)],
        ],
    )
}

#[test]
fn test_query_results() {
    let backend = FakeBackend::new();
    backend.on_query("SELECT id, name FROM person", people());

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("SELECT id, name FROM person", ()).unwrap();
    assert_eq!(cursor.rowcount(), UNSET_COUNT);

    let description = cursor.description().unwrap();
    assert_eq!(description.len(), 2);
    assert_eq!(description[0].name, "id");
    assert_eq!(description[0].type_code, TypeCode::Int64);
    assert_eq!(description[0].type_code, NUMBER);
    assert_eq!(description[1].name, "name");
    assert_eq!(description[1].type_code, STRING);

    let first = cursor.fetchone().unwrap().unwrap();
    assert_eq!(first.get::<i64>(0).unwrap(), 1);
    assert_eq!(first.get_by_name::<&str>("name").unwrap(), "ferris");

    let rest = cursor.fetchall().unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[1].get::<Option<String>>(1).unwrap(), None);
    assert!(cursor.fetchone().unwrap().is_none());
}

#[test]
fn test_fetchmany() {
    let backend = FakeBackend::new();
    backend.on_query("SELECT id, name FROM person", people());

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    assert_eq!(cursor.arraysize(), 1);
    cursor.execute("SELECT id, name FROM person", ()).unwrap();

    assert_eq!(cursor.fetchmany(None).unwrap().len(), 1);
    cursor.set_arraysize(5);
    assert_eq!(cursor.fetchmany(None).unwrap().len(), 2);
    assert!(cursor.fetchmany(Some(2)).unwrap().is_empty());
}

#[test]
fn test_empty_results_are_described() {
    let backend = FakeBackend::new();
    backend.on_query("SELECT n FROM t", Script::ints("n", &[]));

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("SELECT n FROM t", ()).unwrap();
    assert_eq!(cursor.description().unwrap()[0].name, "n");
    assert!(cursor.fetchall().unwrap().is_empty());
}

#[test]
fn test_query_parameters() {
    let backend = FakeBackend::new();
    backend.on_query("SELECT n FROM t WHERE n > @a0 AND m = @a1", Script::ints("n", &[2]));
    backend.on_query("SELECT n FROM t WHERE name = @a0", Script::ints("n", &[3]));

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor
        .execute("SELECT n FROM t WHERE n > %s AND m = %s", params![1, "x"])
        .unwrap();
    assert_eq!(cursor.fetchall().unwrap().len(), 1);

    cursor
        .execute(
            "SELECT n FROM t WHERE name = %(name)s",
            named_params! { "name" => "ferris" },
        )
        .unwrap();
    assert_eq!(cursor.fetchall().unwrap().len(), 1);

    let statements = backend.statements();
    assert_eq!(statements[0].params["a0"], Param::Int64(1));
    assert_eq!(statements[0].params["a1"], Param::String("x".to_string()));
    assert_eq!(statements[0].param_types["a0"], Type::Int64);
    assert_eq!(statements[1].params["a0"], Param::String("ferris".to_string()));
}

#[test]
fn test_mismatched_parameters() {
    let backend = FakeBackend::new();
    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();

    let err = cursor
        .execute("SELECT n FROM t WHERE n > %s", params![1, 2])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert!(backend.calls().is_empty());
}

#[test]
fn test_dml_rowcount() {
    let backend = FakeBackend::new();
    backend.on_update("UPDATE t SET n = 1 WHERE id = 2", 3);

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("UPDATE t SET n = 1 WHERE id = 2", ()).unwrap();
    assert_eq!(cursor.rowcount(), 3);
    assert!(cursor.description().is_none());

    let err = cursor.fetchone().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
}

#[test]
fn test_unqualified_dml_is_qualified() {
    let backend = FakeBackend::new();
    backend.on_update("DELETE FROM t WHERE 1=1", 4);

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("DELETE FROM t", ()).unwrap();
    assert_eq!(cursor.rowcount(), 4);
}

#[test]
fn test_multi_row_insert() {
    let backend = FakeBackend::new();
    backend.on_update("INSERT INTO t (a, b) VALUES (@a0, @a1)", 1);

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor
        .execute(
            "INSERT INTO t (a, b) VALUES (%s, %s), (%s, %s)",
            params![1, "x", 2, "y"],
        )
        .unwrap();
    assert_eq!(cursor.rowcount(), 2);

    let statements = backend.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[1].params["a0"], Param::Int64(2));
    assert_eq!(statements[1].params["a1"], Param::String("y".to_string()));
}

#[test]
fn test_executemany() {
    let backend = FakeBackend::new();
    backend.on_update("UPDATE t SET n = @a0 WHERE id = @a1", 1);

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor
        .executemany(
            "UPDATE t SET n = %s WHERE id = %s",
            vec![params![1, 10], params![2, 20], params![3, 30]],
        )
        .unwrap();
    assert_eq!(cursor.rowcount(), 3);
    assert_eq!(backend.statements().len(), 3);
}

#[test]
fn test_closed_cursor() {
    let backend = FakeBackend::new();
    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor.close();
    cursor.close();
    assert!(cursor.is_closed());

    let err = cursor.execute("SELECT 1", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interface);
    assert_eq!(cursor.fetchall().unwrap_err().kind(), ErrorKind::Interface);
}

#[test]
fn test_unsupported_operations() {
    let backend = FakeBackend::new();
    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();

    assert_eq!(
        cursor.callproc("proc", ()).unwrap_err().kind(),
        ErrorKind::NotSupported
    );
    assert_eq!(cursor.nextset().unwrap_err().kind(), ErrorKind::NotSupported);
    assert_eq!(cursor.lastrowid(), None);
    cursor.setinputsizes(&[Some(10), None]);
    cursor.setoutputsize(10, None);
}

#[test]
fn test_new_statement_replaces_results() {
    let backend = FakeBackend::new();
    backend.on_query("SELECT id, name FROM person", people());
    backend.on_update("UPDATE t SET n = 1 WHERE id = 2", 1);

    let connection = backend.connect();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("SELECT id, name FROM person", ()).unwrap();
    cursor.fetchone().unwrap();

    cursor.execute("UPDATE t SET n = 1 WHERE id = 2", ()).unwrap();
    assert!(cursor.description().is_none());
    assert_eq!(cursor.rowcount(), 1);
}
