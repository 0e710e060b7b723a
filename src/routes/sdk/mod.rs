pub mod routes;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use crate::evaluation::{EvaluationContext, EvaluationReason};

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub flag_key: String,
    pub context: EvaluationContext,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub flag_key: String,
    pub enabled: bool,
    pub reason: EvaluationReason,
}

#[derive(Debug, Deserialize)]
pub struct FeaturesRequest {
    pub context: EvaluationContext,
}

#[derive(Debug, Serialize)]
pub struct FeaturesResponse {
    pub flags: BTreeSet<String>,
}
