use crate::domain::rating::RatingRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub stocks: Vec<RatingRecord>,
    pub message: Option<String>,
    pub priority: Option<String>,
}
