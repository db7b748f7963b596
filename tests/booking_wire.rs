use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

use slotbook::engine::Engine;
use slotbook::wire::{self, SlotbookFactory};

const PASSWORD: &str = "slotbook";
const ADMIN: &str = "admin";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("slotbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(dir.join("slotbook.wal")).unwrap());
    let factory = Arc::new(SlotbookFactory::new(
        engine.clone(),
        PASSWORD.to_string(),
        ADMIN.to_string(),
    ));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, factory, None).await;
            });
        }
    });

    (addr, engine)
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("slotbook")
        .user(user)
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Rows of a simple query, each as (column, value) lookups.
async fn rows(client: &Client, sql: &str) -> Vec<tokio_postgres::SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client
        .simple_query(sql)
        .await
        .expect_err("statement should fail");
    err.code().map(|c| c.code().to_string()).unwrap_or_default()
}

/// Trainer with two slots on 2025-03-01 (09:00 and 10:00).
async fn seed_schedule(admin: &Client) -> (Ulid, Ulid, Ulid) {
    let trainer = Ulid::new();
    let (s1, s2) = (Ulid::new(), Ulid::new());
    admin
        .batch_execute(&format!(
            "INSERT INTO trainers (id, name, specialization) VALUES ('{trainer}', 'Olena', 'boxing')"
        ))
        .await
        .unwrap();
    for (slot, start, end) in [(s1, "09:00", "10:00"), (s2, "10:00", "11:00")] {
        admin
            .batch_execute(&format!(
                "INSERT INTO slots (id, trainer_id, date, time_start, time_end) \
                 VALUES ('{slot}', '{trainer}', '2025-03-01', '{start}', '{end}')"
            ))
            .await
            .unwrap();
    }
    (trainer, s1, s2)
}

async fn book(client: &Client, name: &str, slot: Ulid) -> Ulid {
    let created = rows(
        client,
        &format!("INSERT INTO bookings (client_name, slot_id) VALUES ('{name}', '{slot}')"),
    )
    .await;
    assert_eq!(created.len(), 1);
    Ulid::from_string(created[0].get("id").unwrap()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_over_the_wire() {
    let (addr, engine) = start_test_server().await;
    let admin = connect(addr, ADMIN).await;
    let anna = connect(addr, "anna").await;
    let bohdan = connect(addr, "bohdan").await;
    let (trainer, s1, s2) = seed_schedule(&admin).await;

    let r1 = book(&anna, "Anna", s1).await;

    // slot already booked
    let code = sqlstate(
        &bohdan,
        &format!("INSERT INTO bookings (client_name, slot_id) VALUES ('Bohdan', '{s1}')"),
    )
    .await;
    assert_eq!(code, "23P01");

    // someone else's reservation
    let code = sqlstate(&bohdan, &format!("DELETE FROM bookings WHERE id = '{r1}'")).await;
    assert_eq!(code, "42501");

    anna.batch_execute(&format!("UPDATE bookings SET slot_id = '{s2}' WHERE id = '{r1}'"))
        .await
        .unwrap();
    let listing = rows(&anna, "SELECT * FROM bookings").await;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].get("id"), Some(r1.to_string().as_str()));
    assert_eq!(listing[0].get("client_name"), Some("Anna"));
    assert_eq!(listing[0].get("trainer_name"), Some("Olena"));
    assert_eq!(listing[0].get("date"), Some("2025-03-01"));
    assert_eq!(listing[0].get("time_start"), Some("10:00"));

    let free = rows(&bohdan, &format!("SELECT * FROM free_slots WHERE trainer_id = '{trainer}'")).await;
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].get("id"), Some(s1.to_string().as_str()));

    anna.batch_execute(&format!("DELETE FROM bookings WHERE id = '{r1}'"))
        .await
        .unwrap();
    assert!(rows(&anna, "SELECT * FROM bookings").await.is_empty());
    assert!(engine.verify_bindings().await.is_empty());
}

#[tokio::test]
async fn listing_is_scoped_to_session_user() {
    let (addr, _engine) = start_test_server().await;
    let admin = connect(addr, ADMIN).await;
    let anna = connect(addr, "anna").await;
    let bohdan = connect(addr, "bohdan").await;
    let (_, s1, s2) = seed_schedule(&admin).await;

    book(&anna, "Anna", s1).await;
    book(&bohdan, "Bohdan", s2).await;

    let listing = rows(&anna, "SELECT * FROM bookings").await;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].get("client_name"), Some("Anna"));
}

#[tokio::test]
async fn schedule_commands_require_admin() {
    let (addr, _engine) = start_test_server().await;
    let anna = connect(addr, "anna").await;
    let code = sqlstate(
        &anna,
        &format!("INSERT INTO trainers (id, name) VALUES ('{}', 'Mallory')", Ulid::new()),
    )
    .await;
    assert_eq!(code, "42501");
    assert!(rows(&anna, "SELECT * FROM trainers").await.is_empty());
}

#[tokio::test]
async fn booked_slot_cannot_be_removed() {
    let (addr, _engine) = start_test_server().await;
    let admin = connect(addr, ADMIN).await;
    let anna = connect(addr, "anna").await;
    let (_, s1, s2) = seed_schedule(&admin).await;
    book(&anna, "Anna", s1).await;

    let code = sqlstate(&admin, &format!("DELETE FROM slots WHERE id = '{s1}'")).await;
    assert_eq!(code, "23503");
    admin
        .batch_execute(&format!("DELETE FROM slots WHERE id = '{s2}'"))
        .await
        .unwrap();
}

#[tokio::test]
async fn move_to_unknown_slot_is_invalid() {
    let (addr, _engine) = start_test_server().await;
    let admin = connect(addr, ADMIN).await;
    let anna = connect(addr, "anna").await;
    let (_, s1, _) = seed_schedule(&admin).await;
    let r1 = book(&anna, "Anna", s1).await;

    let code = sqlstate(
        &anna,
        &format!("UPDATE bookings SET slot_id = '{}' WHERE id = '{r1}'", Ulid::new()),
    )
    .await;
    assert_eq!(code, "22023");
}

#[tokio::test]
async fn classes_and_trainers_are_listed() {
    let (addr, _engine) = start_test_server().await;
    let admin = connect(addr, ADMIN).await;
    let (trainer, _, _) = seed_schedule(&admin).await;
    admin
        .batch_execute(&format!(
            "INSERT INTO classes (id, title, trainer_id, date, time_start, time_end) \
             VALUES ('{}', 'Yoga', '{trainer}', '2025-03-02', '18:00', '19:00')",
            Ulid::new()
        ))
        .await
        .unwrap();

    let anna = connect(addr, "anna").await;
    let trainers = rows(&anna, "SELECT * FROM trainers").await;
    assert_eq!(trainers.len(), 1);
    assert_eq!(trainers[0].get("specialization"), Some("boxing"));

    let classes = rows(&anna, "SELECT * FROM classes").await;
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].get("title"), Some("Yoga"));
    assert_eq!(classes[0].get("trainer_name"), Some("Olena"));
}

#[tokio::test]
async fn syntax_errors_report_42601() {
    let (addr, _engine) = start_test_server().await;
    let anna = connect(addr, "anna").await;
    assert_eq!(sqlstate(&anna, "SELEC * FROM bookings").await, "42601");
    assert_eq!(sqlstate(&anna, "SELECT * FROM members").await, "42601");
}

#[tokio::test]
async fn extended_protocol_binds_parameters() {
    let (addr, _engine) = start_test_server().await;
    let admin = connect(addr, ADMIN).await;
    let anna = connect(addr, "anna").await;
    let (trainer, s1, _) = seed_schedule(&admin).await;

    let free = anna
        .query(
            "SELECT * FROM free_slots WHERE trainer_id = $1",
            &[&trainer.to_string()],
        )
        .await
        .unwrap();
    assert_eq!(free.len(), 2);
    let first: String = free[0].get("id");
    assert_eq!(first, s1.to_string());

    let created = anna
        .query(
            "INSERT INTO bookings (client_name, slot_id) VALUES ($1, $2)",
            &[&"O'Neil".to_string(), &s1.to_string()],
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 1);

    let listing = rows(&anna, "SELECT * FROM bookings").await;
    assert_eq!(listing[0].get("client_name"), Some("O'Neil"));
}

#[tokio::test]
async fn concurrent_bookings_over_the_wire_one_winner() {
    let (addr, engine) = start_test_server().await;
    let admin = connect(addr, ADMIN).await;
    let (_, s1, _) = seed_schedule(&admin).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(tokio::spawn(async move {
            let client = connect(addr, &format!("member{i}")).await;
            client
                .simple_query(&format!(
                    "INSERT INTO bookings (client_name, slot_id) VALUES ('m{i}', '{s1}')"
                ))
                .await
                .is_ok()
        }));
    }
    let mut wins = 0;
    for h in handles {
        if h.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
    assert!(engine.verify_bindings().await.is_empty());
}
