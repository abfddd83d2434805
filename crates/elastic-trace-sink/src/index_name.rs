// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rotating index name resolution.

use chrono::{DateTime, Utc};

/// Time unit at which the backend index name rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationGranularity {
    Hourly,
    Daily,
    Monthly,
}

impl RotationGranularity {
    /// Parses the configuration value, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "hourly" => Some(RotationGranularity::Hourly),
            "daily" => Some(RotationGranularity::Daily),
            "monthly" => Some(RotationGranularity::Monthly),
            _ => None,
        }
    }

    fn timestamp_format(self) -> &'static str {
        match self {
            RotationGranularity::Monthly => "%Y-%m",
            RotationGranularity::Daily => "%Y-%m-%d",
            RotationGranularity::Hourly => "%Y-%m-%d-%H",
        }
    }
}

/// Resolves the index a document ships to at a given instant.
///
/// Pure: the same (prefix, instant, granularity) always yields the same
/// name. Callers resolve at ship time, so a batch straddling a rotation
/// boundary ships under whichever index is current when the request is
/// built.
#[must_use]
pub fn resolve_index_name(
    prefix: &str,
    now: DateTime<Utc>,
    granularity: RotationGranularity,
) -> String {
    format!(
        "{}-{}",
        prefix.to_lowercase(),
        now.format(granularity.timestamp_format())
    )
}
