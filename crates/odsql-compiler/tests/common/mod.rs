//! Shared fixture: four cars and three manufacturers, the registry
//! describing them, and an in-memory SQLite database holding them.

#![allow(dead_code)]

use odsql_compiler::{build_count_query, build_query, QueryOptions, Sqlite};
use odsql_schema::{FieldMeta, SchemaMeta, SchemaRegistry};
use rusqlite::Connection;
use serde_json::{json, Value};

pub const OLD_TIME: &str = "2021-03-21T08:50:00Z";
pub const NEW_TIME: &str = "2023-03-21T08:50:00+08:00";

pub fn registry() -> SchemaRegistry {
    let stereo = || FieldMeta::union(["CDPlayer", "Radio"], "ObjectType");
    let registry = SchemaRegistry::new()
        .with_schema(
            "Car",
            SchemaMeta::table("car_rows")
                .field("Id", FieldMeta::string())
                .field("ModelName", FieldMeta::string())
                .field("Seats", FieldMeta::number())
                .field("Engine", FieldMeta::complex("Engine"))
                .field("MainStereo", stereo())
                .field("OtherStereos", FieldMeta::collection(stereo()))
                .field("Manufacturer", FieldMeta::relationship("Manufacturer", "Id"))
                .field(
                    "Manufacturers",
                    FieldMeta::collection(FieldMeta::relationship("Manufacturer", "Id")),
                )
                .field("BuiltOn", FieldMeta::datetime())
                .field("NullComplexField", FieldMeta::complex("Engine")),
        )
        .with_schema(
            "Manufacturer",
            SchemaMeta::table("manufacturer_rows")
                .field("Id", FieldMeta::string())
                .field("Name", FieldMeta::string())
                .field("Address", FieldMeta::complex("Address"))
                .field("Source", FieldMeta::string()),
        )
        .with_schema(
            "Engine",
            SchemaMeta::nested()
                .field("Options", FieldMeta::complex("Options"))
                .field("Manufacturer", FieldMeta::relationship("Manufacturer", "Id")),
        )
        .with_schema(
            "Options",
            SchemaMeta::nested()
                .field("Supercharger", FieldMeta::boolean())
                .field("SubOptions", FieldMeta::collection(FieldMeta::complex("SubOption")))
                .field("OtherThings", FieldMeta::collection(FieldMeta::string())),
        )
        .with_schema(
            "SubOption",
            SchemaMeta::nested()
                .field("Name", FieldMeta::string())
                .field("Manufacturer", FieldMeta::relationship("Manufacturer", "Id")),
        )
        .with_schema(
            "CDPlayer",
            SchemaMeta::nested()
                .field("ObjectType", FieldMeta::string())
                .field("Brand", FieldMeta::string())
                .field("NumberOfDisks", FieldMeta::number()),
        )
        .with_schema(
            "Radio",
            SchemaMeta::nested()
                .field("ObjectType", FieldMeta::string())
                .field("Brand", FieldMeta::string())
                .field("Frequency", FieldMeta::string()),
        )
        .with_schema(
            "Address",
            SchemaMeta::nested()
                .field("City", FieldMeta::string())
                .field("Country", FieldMeta::string()),
        );
    registry.validate().unwrap();
    registry
}

pub fn manufacturer(n: u32) -> Value {
    json!({
        "Id": format!("manu-{}", n),
        "Name": format!("manu{}", n),
        "Address": { "City": format!("city{}", n), "Country": "middleofnowhere" },
    })
}

pub fn manufacturers() -> Vec<Value> {
    (1..=3).map(manufacturer).collect()
}

struct CarFixture {
    id: &'static str,
    model: &'static str,
    manufacturer: &'static str,
    others: &'static [&'static str],
    seats: u32,
    supercharger: bool,
    built_on: Option<&'static str>,
    option_makers: (&'static str, &'static str),
}

const CARS: [CarFixture; 4] = [
    CarFixture {
        id: "car-1",
        model: "model1",
        manufacturer: "manu-1",
        others: &[],
        seats: 12,
        supercharger: false,
        built_on: Some(OLD_TIME),
        option_makers: ("manu-1", "manu-2"),
    },
    CarFixture {
        id: "car-2",
        model: "model2",
        manufacturer: "manu-1",
        others: &["manu-2", "manu-3"],
        seats: 5,
        supercharger: true,
        built_on: Some(OLD_TIME),
        option_makers: ("manu-1", "manu-2"),
    },
    CarFixture {
        id: "car-3",
        model: "model3",
        manufacturer: "manu-2",
        others: &[],
        seats: 2,
        supercharger: false,
        built_on: Some(NEW_TIME),
        option_makers: ("manu-2", "manu-3"),
    },
    CarFixture {
        id: "\"car-4\"",
        model: "model4",
        manufacturer: "manu-3",
        others: &[],
        seats: 2,
        supercharger: true,
        built_on: None,
        option_makers: ("manu-2", "manu-3"),
    },
];

fn car_document(fixture: &CarFixture) -> Value {
    let (first, second) = fixture.option_makers;
    json!({
        "Id": fixture.id,
        "ModelName": fixture.model,
        "Seats": fixture.seats,
        "Engine": {
            "Options": {
                "Supercharger": fixture.supercharger,
                "SubOptions": [
                    { "Name": "bluePaint", "Manufacturer": { "Id": first } },
                    { "Name": "blueShoes", "Manufacturer": { "Id": first } },
                    { "Name": "greenPaint", "Manufacturer": { "Id": second } },
                    { "Name": "yellowPaint", "Manufacturer": { "Id": second } },
                ],
                "OtherThings": ["thing1", "thing2"],
            },
            "Manufacturer": { "Id": fixture.manufacturer },
        },
        "MainStereo": { "ObjectType": "CDPlayer", "Brand": "Sony", "NumberOfDisks": 12 },
        "OtherStereos": [
            { "ObjectType": "Radio", "Brand": "Samsung", "Frequency": "500mhz" },
            { "ObjectType": "CDPlayer", "Brand": "Unknown", "NumberOfDisks": 50 },
            { "ObjectType": "CDPlayer", "Brand": "Unknown", "NumberOfDisks": 20 },
        ],
        "Manufacturer": { "Id": fixture.manufacturer },
        "Manufacturers": fixture.others.iter().map(|id| json!({ "Id": id })).collect::<Vec<_>>(),
        "BuiltOn": fixture.built_on,
        "NullComplexField": null,
    })
}

/// Stored documents of every car, in insertion order.
pub fn cars() -> Vec<Value> {
    CARS.iter().map(car_document).collect()
}

/// Stored document of car `n` (1-based).
pub fn car(n: usize) -> Value {
    car_document(&CARS[n - 1])
}

pub fn car_id(n: usize) -> &'static str {
    CARS[n - 1].id
}

pub fn database() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE car_rows (id INTEGER PRIMARY KEY, Data TEXT NOT NULL);
         CREATE TABLE manufacturer_rows (id INTEGER PRIMARY KEY, Data TEXT NOT NULL);",
    )
    .unwrap();
    for document in manufacturers() {
        conn.execute(
            "INSERT INTO manufacturer_rows (Data) VALUES (?1)",
            [document.to_string()],
        )
        .unwrap();
    }
    for document in cars() {
        conn.execute("INSERT INTO car_rows (Data) VALUES (?1)", [document.to_string()])
            .unwrap();
    }
    conn
}

/// Run `sql` and parse the data column of every row.
pub fn fetch(conn: &Connection, sql: &str) -> Vec<Value> {
    let mut stmt = conn
        .prepare(sql)
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

pub fn query(conn: &Connection, options: &QueryOptions<'_>) -> Vec<Value> {
    let sql = build_query(&Sqlite, &registry(), "Car", options, true)
        .unwrap_or_else(|err| panic!("failed to compile {:?}: {}", options, err));
    fetch(conn, &sql)
}

pub fn count(conn: &Connection, filter: Option<&str>) -> i64 {
    let sql = build_count_query(&Sqlite, &registry(), "Car", filter).unwrap();
    conn.query_row(&sql, [], |row| row.get(0)).unwrap()
}

/// Ids of the returned cars, in order.
pub fn ids(cars: &[Value]) -> Vec<String> {
    cars.iter()
        .map(|car| car["Id"].as_str().unwrap_or_default().to_string())
        .collect()
}

pub fn car_ids(numbers: &[usize]) -> Vec<String> {
    numbers.iter().map(|n| car_id(*n).to_string()).collect()
}
