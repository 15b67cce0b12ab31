//! Compiled queries executed against the fixture loaded into DuckDB.

mod common;

use common::{car, car_id, manufacturer, registry};
use duckdb::Connection;
use odsql_compiler::{build_count_query, build_query, DuckDb, QueryOptions};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn database() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE car_rows (Data JSON NOT NULL);
         CREATE TABLE manufacturer_rows (Data JSON NOT NULL);",
    )
    .unwrap();
    for document in common::manufacturers() {
        conn.execute("INSERT INTO manufacturer_rows (Data) VALUES (?)", [document.to_string()])
            .unwrap();
    }
    for document in common::cars() {
        conn.execute("INSERT INTO car_rows (Data) VALUES (?)", [document.to_string()])
            .unwrap();
    }
    conn
}

fn query(conn: &Connection, options: &QueryOptions<'_>, is_collection: bool) -> Vec<Value> {
    let sql = build_query(&DuckDb, &registry(), "Car", options, is_collection)
        .unwrap_or_else(|err| panic!("failed to compile {:?}: {}", options, err));
    let mut stmt = conn
        .prepare(&sql)
        .unwrap_or_else(|err| panic!("failed to prepare {}: {}", sql, err));
    let rows = stmt
        .query_map([], |row| row.get::<_, Option<String>>(0))
        .unwrap();
    rows.map(|row| match row.unwrap() {
        Some(data) => serde_json::from_str(&data).unwrap(),
        None => Value::Null,
    })
    .collect()
}

fn collection(conn: &Connection, options: &QueryOptions<'_>) -> Vec<Value> {
    query(conn, options, true)
}

fn count(conn: &Connection, filter: Option<&str>) -> i64 {
    let sql = build_count_query(&DuckDb, &registry(), "Car", filter).unwrap();
    conn.query_row(&sql, [], |row| row.get(0)).unwrap()
}

fn model_names(cars: &[Value]) -> Vec<String> {
    cars.iter()
        .map(|car| car["ModelName"].as_str().unwrap().to_string())
        .collect()
}

fn models(numbers: &[usize]) -> Vec<String> {
    numbers.iter().map(|n| format!("model{}", n)).collect()
}

/// Model names of the cars matching `filter`, sorted.
fn matching(conn: &Connection, filter: &str) -> Vec<String> {
    let mut names = model_names(&collection(conn, &QueryOptions::new().filter(filter)));
    names.sort();
    names
}

fn id_filter(n: usize) -> String {
    format!("Id eq '{}'", car_id(n))
}

#[test]
fn test_no_options_returns_stored_documents() {
    let conn = database();
    let cars = collection(&conn, &QueryOptions::new().orderby("ModelName"));
    assert_eq!(cars, vec![car(1), car(2), car(3), car(4)]);
}

#[test]
fn test_comparisons_and_functions() {
    let conn = database();
    assert_eq!(matching(&conn, "ModelName eq 'model1'"), models(&[1]));
    assert_eq!(matching(&conn, "Seats gt 2"), models(&[1, 2]));
    assert_eq!(matching(&conn, "Seats le 5 and not (ModelName eq 'model4')"), models(&[2, 3]));
    assert_eq!(matching(&conn, "Id eq '\"car-4\"'"), models(&[4]));
    assert_eq!(matching(&conn, "contains(ModelName, '1')"), models(&[1]));
    assert_eq!(matching(&conn, "endswith(ModelName, '3')"), models(&[3]));
    assert_eq!(matching(&conn, "contains(ModelName, '%')"), models(&[]));
}

#[test]
fn test_booleans_and_nulls() {
    let conn = database();
    assert_eq!(matching(&conn, "Engine/Options/Supercharger eq true"), models(&[2, 4]));
    assert_eq!(matching(&conn, "not Engine/Options/Supercharger"), models(&[1, 3]));
    assert_eq!(matching(&conn, "NullComplexField eq null"), models(&[1, 2, 3, 4]));
    assert_eq!(matching(&conn, "BuiltOn eq null"), models(&[4]));
    assert_eq!(matching(&conn, "null ne BuiltOn"), models(&[1, 2, 3]));
}

#[test]
fn test_datetime_comparisons() {
    let conn = database();
    assert_eq!(matching(&conn, "BuiltOn lt 2022-03-21T08:50:00Z"), models(&[1, 2]));
    assert_eq!(matching(&conn, "BuiltOn eq 2021-03-21T07:50:00-01:00"), models(&[1, 2]));
    assert_eq!(matching(&conn, "BuiltOn eq 2023-03-21T00:50:00Z"), models(&[3]));
    assert_eq!(matching(&conn, "BuiltOn eq 2021-03-21T08:50:00.0004Z"), models(&[1, 2]));
}

#[test]
fn test_filter_through_relationships() {
    let conn = database();
    assert_eq!(matching(&conn, "Manufacturer/Name eq 'manu2'"), models(&[3]));
    assert_eq!(matching(&conn, "Manufacturer/Address/City eq 'city3'"), models(&[4]));
    assert_eq!(
        matching(&conn, "Manufacturer/Name eq Engine/Manufacturer/Name"),
        models(&[1, 2, 3, 4])
    );
    assert_eq!(matching(&conn, "MainStereo/NumberOfDisks eq 12"), models(&[1, 2, 3, 4]));
    assert_eq!(matching(&conn, "MainStereo/Frequency eq '500mhz'"), models(&[]));
}

#[test]
fn test_lambdas() {
    let conn = database();
    assert_eq!(
        matching(&conn, "Engine/Options/SubOptions/any(o:o/Manufacturer/Name eq 'manu1')"),
        models(&[1, 2])
    );
    assert_eq!(
        matching(&conn, "Engine/Options/OtherThings/any(t:t eq 'thing2')"),
        models(&[1, 2, 3, 4])
    );
    assert_eq!(matching(&conn, "Manufacturers/any()"), models(&[2]));
    assert_eq!(
        matching(
            &conn,
            "Engine/Options/SubOptions/all(o:o/Manufacturer/Id eq 'manu-1' or o/Manufacturer/Id eq 'manu-2')"
        ),
        models(&[1, 2])
    );
    assert_eq!(
        matching(&conn, "Manufacturers/all(m:m/Name eq 'manu2')"),
        models(&[1, 3, 4])
    );
    assert_eq!(
        matching(&conn, "OtherStereos/any(s:s/NumberOfDisks gt Seats)"),
        models(&[1, 2, 3, 4])
    );
    assert_eq!(matching(&conn, "length(Manufacturers) gt 0"), models(&[2]));
}

#[test]
fn test_select_shapes() {
    let conn = database();
    let filter = id_filter(1);

    let cars = collection(
        &conn,
        &QueryOptions::new().filter(&filter).select("Seats,Engine/Manufacturer"),
    );
    assert_eq!(
        cars,
        vec![json!({ "Seats": 12, "Engine": { "Manufacturer": { "Id": "manu-1" } } })]
    );

    let cars = collection(
        &conn,
        &QueryOptions::new().filter(&filter).select("NullComplexField/Options"),
    );
    assert_eq!(cars, vec![json!({ "NullComplexField": null })]);

    let cars = collection(
        &conn,
        &QueryOptions::new().filter(&filter).select("ModelName,Engine/Options/OtherThings"),
    );
    assert_eq!(
        cars,
        vec![json!({
            "ModelName": "model1",
            "Engine": { "Options": { "OtherThings": ["thing1", "thing2"] } }
        })]
    );

    let cars = collection(
        &conn,
        &QueryOptions::new().filter(&filter).select("OtherStereos($select=Brand)"),
    );
    assert_eq!(
        cars,
        vec![json!({ "OtherStereos": [
            { "ObjectType": "Radio", "Brand": "Samsung" },
            { "ObjectType": "CDPlayer", "Brand": "Unknown" },
            { "ObjectType": "CDPlayer", "Brand": "Unknown" },
        ] })]
    );
}

#[test]
fn test_filtered_collection() {
    let conn = database();
    let options = QueryOptions::new()
        .orderby("ModelName")
        .select("Engine/Options/SubOptions($select=Name;$filter=contains(Name, 'blue'))");
    let cars = collection(&conn, &options);
    assert_eq!(cars.len(), 4);
    for car in &cars {
        assert_eq!(
            car["Engine"],
            json!({ "Options": { "SubOptions": [{ "Name": "bluePaint" }, { "Name": "blueShoes" }] } })
        );
    }
}

#[test]
fn test_order_and_page_collection_elements() {
    let conn = database();
    let filter = id_filter(1);
    let radio = json!({ "ObjectType": "Radio", "Brand": "Samsung", "Frequency": "500mhz" });
    let fifty = json!({ "ObjectType": "CDPlayer", "Brand": "Unknown", "NumberOfDisks": 50 });
    let twenty = json!({ "ObjectType": "CDPlayer", "Brand": "Unknown", "NumberOfDisks": 20 });
    let stereos = |select: &str| {
        let cars = collection(&conn, &QueryOptions::new().filter(&filter).select(select));
        assert_eq!(cars.len(), 1, "{}", select);
        cars[0]["OtherStereos"].clone()
    };

    assert_eq!(
        stereos("OtherStereos($orderby=NumberOfDisks asc)"),
        json!([radio.clone(), twenty.clone(), fifty.clone()])
    );
    assert_eq!(
        stereos("OtherStereos($orderby=NumberOfDisks desc)"),
        json!([fifty.clone(), twenty.clone(), radio.clone()])
    );
    assert_eq!(
        stereos("OtherStereos($orderby=NumberOfDisks desc;$top=2)"),
        json!([fifty.clone(), twenty])
    );
    assert_eq!(stereos("OtherStereos($top=1;$skip=1)"), json!([fifty]));
    assert_eq!(stereos("OtherStereos($skip=3)"), json!([]));
    assert_eq!(stereos("OtherStereos($top=1)"), json!([radio]));
}

#[test]
fn test_expand() {
    let conn = database();

    let cars = collection(
        &conn,
        &QueryOptions::new()
            .filter(&id_filter(1))
            .select("Id,ModelName")
            .expand("Manufacturer($select=Name)"),
    );
    assert_eq!(
        cars,
        vec![json!({ "Id": "car-1", "ModelName": "model1", "Manufacturer": { "Name": "manu1" } })]
    );

    let cars = collection(
        &conn,
        &QueryOptions::new()
            .filter(&id_filter(2))
            .select("ModelName,Engine/Manufacturer")
            .expand("Engine/Manufacturer"),
    );
    assert_eq!(
        cars,
        vec![json!({ "ModelName": "model2", "Engine": { "Manufacturer": manufacturer(1) } })]
    );

    let cars = collection(&conn, &QueryOptions::new().filter(&id_filter(3)).expand("Manufacturer"));
    let mut expected = car(3);
    expected["Manufacturer"] = manufacturer(2);
    assert_eq!(cars, vec![expected]);
}

#[test]
fn test_expand_relationship_collection() {
    let conn = database();
    let expanded = |n: usize, expand: &str| {
        let cars = collection(
            &conn,
            &QueryOptions::new().filter(&id_filter(n)).select("Id").expand(expand),
        );
        assert_eq!(cars.len(), 1, "{}", expand);
        cars[0]["Manufacturers"].clone()
    };

    assert_eq!(
        expanded(2, "Manufacturers"),
        json!([manufacturer(2), manufacturer(3)])
    );
    assert_eq!(
        expanded(2, "Manufacturers($filter=Name eq 'manu3')"),
        json!([manufacturer(3)])
    );
    assert_eq!(expanded(1, "Manufacturers"), json!([]));
    assert_eq!(expanded(2, "*"), json!([manufacturer(2), manufacturer(3)]));
}

#[test]
fn test_orderby_places_nulls() {
    let conn = database();
    let order = |orderby: &str| {
        model_names(&collection(&conn, &QueryOptions::new().orderby(orderby)))
    };
    assert_eq!(order("Seats desc, ModelName asc"), models(&[1, 2, 3, 4]));
    assert_eq!(
        order("Engine/Options/Supercharger asc, ModelName desc"),
        models(&[3, 1, 4, 2])
    );
    assert_eq!(order("Manufacturer/Name desc, ModelName asc"), models(&[4, 3, 1, 2]));
    assert_eq!(order("BuiltOn desc, ModelName"), models(&[3, 1, 2, 4]));
    assert_eq!(order("BuiltOn, ModelName"), models(&[4, 1, 2, 3]));
}

#[test]
fn test_paging_and_single_object() {
    let conn = database();
    let cars = collection(&conn, &QueryOptions::new().orderby("ModelName").top(2).skip(1));
    assert_eq!(model_names(&cars), models(&[2, 3]));

    let cars = collection(&conn, &QueryOptions::new().orderby("ModelName").skip(3));
    assert_eq!(model_names(&cars), models(&[4]));

    let options = QueryOptions::new().orderby("ModelName desc").top(3).skip(2);
    assert_eq!(query(&conn, &options, false), vec![car(4)]);
}

#[test]
fn test_count() {
    let conn = database();
    assert_eq!(count(&conn, None), 4);
    assert_eq!(count(&conn, Some("Seats gt 2")), 2);
    assert_eq!(count(&conn, Some("Manufacturers/any()")), 1);
    assert_eq!(count(&conn, Some("Manufacturer/Name eq 'manu1'")), 2);
}
