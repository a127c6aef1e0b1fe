use sqlx::{Postgres, QueryBuilder};

/// Sortable columns. Parsing against this enum is the only path by which a
/// caller-supplied name can reach the ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    RecordTime,
    CreatedAt,
    Ticker,
    Company,
    Brokerage,
    Action,
    RatingFrom,
    RatingTo,
    TargetFrom,
    TargetTo,
}

impl SortField {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "record_time" => SortField::RecordTime,
            "created_at" => SortField::CreatedAt,
            "ticker" => SortField::Ticker,
            "company" => SortField::Company,
            "brokerage" => SortField::Brokerage,
            "action" => SortField::Action,
            "rating_from" => SortField::RatingFrom,
            "rating_to" => SortField::RatingTo,
            "target_from" => SortField::TargetFrom,
            "target_to" => SortField::TargetTo,
            _ => return None,
        })
    }

    pub fn column(self) -> &'static str {
        match self {
            SortField::RecordTime => "record_time",
            SortField::CreatedAt => "created_at",
            SortField::Ticker => "ticker",
            SortField::Company => "company",
            SortField::Brokerage => "brokerage",
            SortField::Action => "action",
            SortField::RatingFrom => "rating_from",
            SortField::RatingTo => "rating_to",
            SortField::TargetFrom => "target_from",
            SortField::TargetTo => "target_to",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub field: SortField,
    pub direction: Direction,
}

impl Default for Ordering {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: Direction::Desc,
        }
    }
}

impl Ordering {
    /// Unknown or missing `order_by` falls back to newest first; `asc` only
    /// counts when it is exactly `"1"`.
    pub fn from_params(order_by: Option<&str>, asc: Option<&str>) -> Self {
        let Some(field) = order_by.and_then(SortField::parse) else {
            return Self::default();
        };
        let direction = if asc == Some("1") {
            Direction::Asc
        } else {
            Direction::Desc
        };
        Self { field, direction }
    }

    pub fn push_order_by(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let dir = self.direction.keyword();
        qb.push(" ORDER BY ");
        qb.push(self.field.column());
        qb.push(" ");
        qb.push(dir);
        // Tie-break on the primary key so page boundaries are stable.
        qb.push(", code ");
        qb.push(dir);
    }
}
