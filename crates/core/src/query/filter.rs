use super::FilterParams;
use sqlx::{Postgres, QueryBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Ticker,
    Brokerage,
    Action,
    RatingFrom,
    RatingTo,
}

impl FilterField {
    pub const ALL: [FilterField; 5] = [
        FilterField::Ticker,
        FilterField::Brokerage,
        FilterField::Action,
        FilterField::RatingFrom,
        FilterField::RatingTo,
    ];

    pub fn column(self) -> &'static str {
        match self {
            FilterField::Ticker => "ticker",
            FilterField::Brokerage => "brokerage",
            FilterField::Action => "action",
            FilterField::RatingFrom => "rating_from",
            FilterField::RatingTo => "rating_to",
        }
    }

    /// Free-text fields match by substring, rating fields match exactly.
    pub fn match_op(self) -> MatchOp {
        match self {
            FilterField::Ticker | FilterField::Brokerage | FilterField::Action => MatchOp::Contains,
            FilterField::RatingFrom | FilterField::RatingTo => MatchOp::Equals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Contains,
    Equals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: FilterField,
    pub op: MatchOp,
    pub value: String,
}

impl Condition {
    /// The value actually sent to the store for this condition.
    pub fn bound_value(&self) -> String {
        match self.op {
            MatchOp::Contains => format!("%{}%", self.value),
            MatchOp::Equals => self.value.clone(),
        }
    }
}

/// Conjunction of zero or more conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    pub conditions: Vec<Condition>,
}

impl Predicate {
    pub fn from_params(params: &FilterParams) -> Self {
        let conditions = FilterField::ALL
            .into_iter()
            .filter_map(|field| {
                params.get(field).map(|value| Condition {
                    field,
                    op: field.match_op(),
                    value: value.to_string(),
                })
            })
            .collect();
        Self { conditions }
    }

    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for (idx, cond) in self.conditions.iter().enumerate() {
            qb.push(if idx == 0 { " WHERE " } else { " AND " });
            qb.push(cond.field.column());
            qb.push(match cond.op {
                MatchOp::Contains => " LIKE ",
                MatchOp::Equals => " = ",
            });
            qb.push_bind(cond.bound_value());
        }
    }
}
