use std::time::Duration;

use anyhow::{Context, Result};

/// Tunables of the reservation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Safety margin kept free before and after every reservation window.
    pub cleaning_time: Duration,

    /// Minimum overlap that counts as a reserved period when the update
    /// protocol checks whether a held unit is still free.
    pub reserved_period_span: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            cleaning_time: Duration::ZERO,
            reserved_period_span: Duration::from_secs(1),
        }
    }
}

impl AllocatorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let cleaning_time = match std::env::var("RESERVA_CLEANING_TIME_MINUTES") {
            Ok(v) => parse_minutes("RESERVA_CLEANING_TIME_MINUTES", &v)?,
            Err(_) => defaults.cleaning_time,
        };

        let reserved_period_span = match std::env::var("RESERVA_RESERVED_PERIOD_SPAN_SECS") {
            Ok(v) => {
                let secs: u64 = v
                    .parse()
                    .with_context(|| format!("RESERVA_RESERVED_PERIOD_SPAN_SECS={v}"))?;
                Duration::from_secs(secs.max(1))
            }
            Err(_) => defaults.reserved_period_span,
        };

        Ok(Self {
            cleaning_time,
            reserved_period_span,
        })
    }

    /// Set the cleaning margin.
    pub fn with_cleaning_time(mut self, margin: Duration) -> Self {
        self.cleaning_time = margin;
        self
    }

    /// The cleaning margin as a chrono duration, saturating on overflow.
    pub fn margin(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cleaning_time).unwrap_or(chrono::Duration::MAX)
    }

    pub(crate) fn reserved_span(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.reserved_period_span)
            .unwrap_or_else(|_| chrono::Duration::seconds(1))
    }
}

fn parse_minutes(name: &str, value: &str) -> Result<Duration> {
    let minutes: u64 = value
        .parse()
        .with_context(|| format!("{name}={value}"))?;
    let secs = minutes
        .checked_mul(60)
        .with_context(|| format!("{name}={value} is out of range"))?;
    Ok(Duration::from_secs(secs))
}
