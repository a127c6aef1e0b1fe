use crate::domain::rating::{next_page, NewRating, RatingPage, RatingRecord};
use crate::error::Result;
use crate::ingest::loader::RatingWriter;
use crate::query::ListQuery;
use crate::storage::store::RecordStore;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, QueryBuilder};

// Targets and timestamps are cast so NUMERIC / TIMESTAMP columns of an
// externally managed table still decode into `f64` / `DateTime<Utc>`.
const SELECT_RATINGS: &str = "SELECT code, ticker, company, brokerage, action, rating_from, rating_to, \
     target_from::FLOAT8 AS target_from, target_to::FLOAT8 AS target_to, \
     record_time::TIMESTAMPTZ AS record_time, created_at::TIMESTAMPTZ AS created_at, \
     updated_at::TIMESTAMPTZ AS updated_at \
     FROM stocks";

const INSERT_RATING: &str = "INSERT INTO stocks (code, ticker, target_from, target_to, company, action, \
     brokerage, rating_from, rating_to, record_time, created_at, updated_at) ";

pub const RECOMMENDATION_CANDIDATES: i64 = 50;

/// Read side of `stocks`: the paginated list and the recommendation candidate set.
#[derive(Debug, Clone)]
pub struct RatingsRepository {
    store: RecordStore,
}

impl RatingsRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Count + page query in one session. Takes an already compiled query, so
    /// bad input is rejected before the store is touched. Undecodable rows are
    /// dropped from the page but still counted.
    pub async fn list(&self, query: &ListQuery) -> Result<RatingPage> {
        let mut session = self.store.session().await?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stocks");
        query.predicate.push_where(&mut count_qb);
        let total: i64 = session.query_scalar(&mut count_qb).await?;

        let mut page_qb = QueryBuilder::<Postgres>::new(SELECT_RATINGS);
        query.predicate.push_where(&mut page_qb);
        query.ordering.push_order_by(&mut page_qb);
        query.page.push_limit_offset(&mut page_qb);
        let rows = session.query(&mut page_qb).await?;

        let total = u64::try_from(total).unwrap_or_default();
        let stocks = decode_rows(rows);

        tracing::debug!(
            page = query.page.number,
            total,
            returned = stocks.len(),
            filters = query.predicate.conditions.len(),
            "listed stocks"
        );

        Ok(RatingPage {
            stocks,
            current_page: query.page.number,
            next_page: next_page(query.page.number, query.page.size, total),
            total,
            per_page: query.page.size,
        })
    }

    /// Newest ratings whose target went up, fed to the ranking oracle.
    pub async fn recommendation_candidates(&self) -> Result<Vec<RatingRecord>> {
        let mut session = self.store.session().await?;
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_RATINGS);
        qb.push(" WHERE target_to > target_from ORDER BY record_time DESC NULLS LAST, code DESC LIMIT ");
        qb.push_bind(RECOMMENDATION_CANDIDATES);
        let rows = session.query(&mut qb).await?;
        Ok(decode_rows(rows))
    }
}

fn decode_rows(rows: Vec<PgRow>) -> Vec<RatingRecord> {
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        match RatingRecord::from_row(row) {
            Ok(record) => out.push(record),
            Err(err) => {
                tracing::warn!(row = idx, error = %err, "skipping undecodable stocks row");
            }
        }
    }
    out
}

/// Inserts normalized ratings, one statement per record, inside one store session.
#[derive(Debug, Clone)]
pub struct PgRatingWriter {
    store: RecordStore,
}

impl PgRatingWriter {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl RatingWriter for PgRatingWriter {
    async fn insert_all(&self, records: &[NewRating]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut session = self.store.session().await?;
        session.ping().await?;

        let mut inserted: u64 = 0;
        for record in records {
            let mut qb = insert_statement(record);
            inserted += session.exec(&mut qb).await?;
        }

        Ok(inserted)
    }
}

fn insert_statement(record: &NewRating) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(INSERT_RATING);
    qb.push_values(std::iter::once(record), |mut b, r| {
        b.push_bind(r.code)
            .push_bind(r.ticker.clone())
            .push_bind(r.target_from)
            .push_bind(r.target_to)
            .push_bind(r.company.clone())
            .push_bind(r.action.clone())
            .push_bind(r.brokerage.clone())
            .push_bind(r.rating_from.clone())
            .push_bind(r.rating_to.clone())
            .push_bind(r.record_time)
            .push_bind(r.created_at)
            .push_bind(r.updated_at);
    });
    qb
}
