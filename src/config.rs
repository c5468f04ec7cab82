use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};

use crate::grading::parse_timestamp;

pub const NOW_ENV: &str = "GRADE_SUMMARY_NOW";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Reference time for deciding whether an assignment is due.
    pub now: DateTime<Utc>,
}

impl Settings {
    /// `--now` wins over `GRADE_SUMMARY_NOW`, which wins over the clock.
    pub fn resolve(now_arg: Option<String>) -> anyhow::Result<Self> {
        let configured = now_arg.or_else(|| std::env::var(NOW_ENV).ok());
        let now = match configured {
            Some(value) => parse_now(&value)
                .with_context(|| format!("invalid reference time (--now or {NOW_ENV})"))?,
            None => Utc::now(),
        };
        Ok(Self { now })
    }
}

fn parse_now(value: &str) -> anyhow::Result<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| anyhow!("unrecognised timestamp '{value}'"))
}
