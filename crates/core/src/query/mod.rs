//! Filter/sort compiler for the list endpoint.
//!
//! Untrusted query-string parameters are turned into structured descriptions
//! ([`Predicate`], [`Ordering`], [`Page`]) which render onto a
//! [`sqlx::QueryBuilder`]. Every user value travels as a bound parameter; the
//! only identifiers ever written into SQL text come from the [`FilterField`]
//! and [`SortField`] enums.

mod filter;
mod sort;

pub use filter::{Condition, FilterField, MatchOp, Predicate};
pub use sort::{Direction, Ordering, SortField};

use crate::domain::rating::PAGE_SIZE;
use crate::error::{Error, Result};
use sqlx::{Postgres, QueryBuilder};

/// Recognized list parameters. Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterParams {
    pub ticker: Option<String>,
    pub brokerage: Option<String>,
    pub action: Option<String>,
    pub rating_from: Option<String>,
    pub rating_to: Option<String>,
    pub order_by: Option<String>,
    pub asc: Option<String>,
    pub page: Option<String>,
}

impl FilterParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut out = Self::default();
        for (key, value) in pairs {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "ticker" => &mut out.ticker,
                "brokerage" => &mut out.brokerage,
                "action" => &mut out.action,
                "rating_from" => &mut out.rating_from,
                "rating_to" => &mut out.rating_to,
                "order_by" => &mut out.order_by,
                "asc" => &mut out.asc,
                "page" => &mut out.page,
                _ => continue,
            };
            *slot = Some(value);
        }
        out
    }

    pub(crate) fn get(&self, field: FilterField) -> Option<&str> {
        let value = match field {
            FilterField::Ticker => &self.ticker,
            FilterField::Brokerage => &self.brokerage,
            FilterField::Action => &self.action,
            FilterField::RatingFrom => &self.rating_from,
            FilterField::RatingTo => &self.rating_to,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let number = match raw.filter(|v| !v.is_empty()) {
            None => 1,
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| Error::validation(format!("page must be a positive integer (got {v:?})")))?,
        };
        if number == 0 {
            return Err(Error::validation("page must be >= 1"));
        }
        Ok(Self {
            number,
            size: PAGE_SIZE,
        })
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }

    pub fn push_limit_offset(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" LIMIT ");
        qb.push_bind(self.limit());
        qb.push(" OFFSET ");
        qb.push_bind(self.offset());
    }
}

/// Compiled form of a [`FilterParams`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub predicate: Predicate,
    pub ordering: Ordering,
    pub page: Page,
}

impl ListQuery {
    pub fn compile(params: &FilterParams) -> Result<Self> {
        let page = Page::parse(params.page.as_deref())?;
        Ok(Self {
            predicate: Predicate::from_params(params),
            ordering: Ordering::from_params(params.order_by.as_deref(), params.asc.as_deref()),
            page,
        })
    }
}
