use sqlx::{Postgres, QueryBuilder};
use std::time::{Duration, Instant};
use stockrate_core::storage::RecordStore;
use stockrate_core::Error;

fn pg_dsn() -> Option<String> {
    std::env::var("STOCKRATE_PG_DSN").ok().filter(|v| !v.is_empty())
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set STOCKRATE_PG_DSN to run."]
async fn timed_out_statement_does_not_hold_the_only_connection() {
    let Some(dsn) = pg_dsn() else {
        eprintln!("Skipping timed_out_statement_does_not_hold_the_only_connection; set STOCKRATE_PG_DSN to run this test.");
        return;
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&dsn)
        .await
        .expect("Failed to connect to STOCKRATE_PG_DSN.");

    let slow = RecordStore::new(pool.clone(), Duration::from_millis(300));
    let mut session = slow.session().await.expect("Failed to open session.");
    let mut qb = QueryBuilder::<Postgres>::new("SELECT pg_sleep(6)");
    match session.query(&mut qb).await {
        Err(Error::StoreTimeout { op: "query", .. }) => {}
        Err(other) => panic!("expected a query timeout, got {other:?}"),
        Ok(_) => panic!("pg_sleep(6) must exceed 300ms"),
    }
    assert!(!session.is_live());

    // Later work on the same session fails fast instead of reusing the busy connection.
    let err = session.ping().await.expect_err("Session is spent after a timeout.");
    assert!(matches!(err, Error::StoreTimeout { .. }), "{err:?}");
    drop(session);

    let started = Instant::now();
    RecordStore::new(pool, Duration::from_secs(5))
        .ping()
        .await
        .expect("A fresh session must get a connection.");
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "ping waited {:?} for the pool",
        started.elapsed()
    );
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set STOCKRATE_PG_DSN to run."]
async fn server_cancels_statements_past_the_store_timeout() {
    let Some(dsn) = pg_dsn() else {
        eprintln!("Skipping server_cancels_statements_past_the_store_timeout; set STOCKRATE_PG_DSN to run this test.");
        return;
    };

    let options = stockrate_core::storage::store::connect_options(&dsn, Duration::from_millis(200))
        .expect("Failed to parse STOCKRATE_PG_DSN.");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to connect to STOCKRATE_PG_DSN.");

    // Client bound is generous; the server gives up first.
    let store = RecordStore::new(pool, Duration::from_secs(5));
    let mut session = store.session().await.expect("Failed to open session.");
    let mut qb = QueryBuilder::<Postgres>::new("SELECT pg_sleep(2)");
    match session.query(&mut qb).await {
        Err(Error::Store { op: "query", .. }) => {}
        Err(other) => panic!("expected a server-side cancel, got {other:?}"),
        Ok(_) => panic!("statement_timeout must cancel pg_sleep(2)"),
    }
    assert!(session.is_live());
    session.ping().await.expect("Connection stays usable after a server-side cancel.");
}
