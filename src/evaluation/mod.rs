use std::io::Cursor;

use murmur3::murmur3_32;
use serde::{Deserialize, Serialize};

use crate::store::FlagDefinition;

// Request context for evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(default)]
    pub user_id: Option<String>,
    pub environment: String,
}

impl EvaluationContext {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            user_id: None,
            environment: environment.into(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

// Why a flag came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationReason {
    NotFound,
    Disabled,
    EnvironmentMismatch,
    TargetedUser,
    FullRollout,
    ZeroRollout,
    Anonymous,
    InRollout { bucket: u8 },
    OutOfRollout { bucket: u8 },
}

// Flag evaluation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlagEvaluation {
    pub enabled: bool,
    pub reason: EvaluationReason,
}

impl FlagEvaluation {
    fn on(reason: EvaluationReason) -> Self {
        Self {
            enabled: true,
            reason,
        }
    }

    fn off(reason: EvaluationReason) -> Self {
        Self {
            enabled: false,
            reason,
        }
    }
}

/// Decides whether a flag is on for a context.
///
/// Checks run in a fixed order and the first one that decides wins:
/// 1. Missing definition is off
/// 2. Master switch off is off
/// 3. Environment not listed is off
/// 4. Targeted user is on
/// 5. 100% is on, 0% is off
/// 6. Anonymous context is off
/// 7. Bucket below the rollout percentage is on
pub fn evaluate_flag(
    flag: Option<&FlagDefinition>,
    context: &EvaluationContext,
) -> FlagEvaluation {
    let flag = match flag {
        Some(flag) => flag,
        None => return FlagEvaluation::off(EvaluationReason::NotFound),
    };

    if !flag.enabled {
        return FlagEvaluation::off(EvaluationReason::Disabled);
    }

    if !flag.environments.contains(&context.environment) {
        return FlagEvaluation::off(EvaluationReason::EnvironmentMismatch);
    }

    if let Some(ref user_id) = context.user_id {
        if flag.target_users.contains(user_id) {
            return FlagEvaluation::on(EvaluationReason::TargetedUser);
        }
    }

    let percentage = flag.rollout_percentage.value();
    if percentage >= 100 {
        return FlagEvaluation::on(EvaluationReason::FullRollout);
    }
    if percentage == 0 {
        return FlagEvaluation::off(EvaluationReason::ZeroRollout);
    }

    let user_id = match context.user_id {
        Some(ref user_id) => user_id,
        None => return FlagEvaluation::off(EvaluationReason::Anonymous),
    };

    let bucket = bucket(&flag.key, user_id);
    if bucket < percentage {
        FlagEvaluation::on(EvaluationReason::InRollout { bucket })
    } else {
        FlagEvaluation::off(EvaluationReason::OutOfRollout { bucket })
    }
}

/// Stable bucket in `0..100` for a flag/user pair.
///
/// Murmur3 with a fixed seed, so the same pair lands in the same bucket in
/// every process and after every restart.
pub fn bucket(flag_key: &str, user_id: &str) -> u8 {
    let input = format!("{}:{}", flag_key, user_id);
    let hash = murmur3_32(&mut Cursor::new(input.as_bytes()), 0).unwrap_or(0);
    (hash % 100) as u8
}
