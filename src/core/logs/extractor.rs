//! COMPLETED-line extraction.
//!
//! Request completion lines look like
//!
//! ```text
//! 21 Dec 00:00:08.220 LoggingFilter INFO  [PlaysServlet:/api/v1/plays] - COMPLETED Request type: POST ...
//! ```
//!
//! Each line yields at most one [`TrafficEvent`]. Lines that are simply not of
//! interest come back as [`Extraction::Skipped`]; only a line that matched the
//! structure but carried an unusable timestamp is an error.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::endpoint::{EndpointProfile, POST_PICKER_STATUS};
use super::identity::IdentityResolver;
use super::record::TrafficEvent;
use super::timestamp::try_parse_log_timestamp;
use crate::errors::ParseResult;

static COMPLETED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,2}\s+\w{3}\s+\d{2}:\d{2}:\d{2}\.\d{3})\s+(\w+)\s+INFO\s+\[([^:]+):([^\]]+)\]\s+-\s+COMPLETED\s+Request type:\s*(\w+)",
    )
    .expect("completed-line pattern is valid")
});

/// Only request-logging filter lines describe finished HTTP requests.
pub const REQUEST_LOGGING_SERVICE: &str = "LoggingFilter";

/// Servlet that renders error pages; its lines duplicate the failed request.
pub const ERROR_SERVLET: &str = "ErrorServlet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    /// Line is not a COMPLETED request line
    NoMatch,
    /// COMPLETED line from a service other than the request filter
    ForeignService,
    ErrorServlet,
    EndpointNotAllowed,
    MissingIdentity,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatch => "no_match",
            Self::ForeignService => "foreign_service",
            Self::ErrorServlet => "error_servlet",
            Self::EndpointNotAllowed => "endpoint_not_allowed",
            Self::MissingIdentity => "missing_identity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Event(TrafficEvent),
    Skipped(SkipReason),
}

/// Turns raw log lines into candidate traffic events for one profile.
#[derive(Debug, Clone)]
pub struct EventExtractor {
    profile: EndpointProfile,
    reference_year: i32,
    resolver: IdentityResolver,
}

impl EventExtractor {
    pub fn new(profile: EndpointProfile, reference_year: i32) -> Self {
        Self {
            profile,
            reference_year,
            resolver: IdentityResolver::new(),
        }
    }

    pub fn profile(&self) -> EndpointProfile {
        self.profile
    }

    /// Extract at most one event from a raw line.
    pub fn extract(&self, line: &str) -> ParseResult<Extraction> {
        let line = line.trim();
        let Some(caps) = COMPLETED_LINE.captures(line) else {
            return Ok(Extraction::Skipped(SkipReason::NoMatch));
        };

        if &caps[2] != REQUEST_LOGGING_SERVICE {
            return Ok(Extraction::Skipped(SkipReason::ForeignService));
        }
        if caps[3].trim() == ERROR_SERVLET {
            return Ok(Extraction::Skipped(SkipReason::ErrorServlet));
        }
        let Some(endpoint) = self.profile.normalize(caps[4].trim()) else {
            return Ok(Extraction::Skipped(SkipReason::EndpointNotAllowed));
        };

        let timestamp = try_parse_log_timestamp(&caps[1], self.reference_year)?;
        let method = &caps[5];

        // picker status bodies carry only the token; anything else on the line
        // belongs to a different user context
        let identity = if endpoint == POST_PICKER_STATUS {
            self.resolver.resolve_token_only(line)
        } else {
            self.resolver.resolve(line)
        };

        if identity.is_none() && self.profile.requires_identity(endpoint) {
            return Ok(Extraction::Skipped(SkipReason::MissingIdentity));
        }

        let mut event = TrafficEvent::new(timestamp, endpoint);
        event.user_id = identity.map(|id| id.user_id);
        if self.profile.records_method() {
            event.method = Some(method.to_string());
        }
        Ok(Extraction::Event(event))
    }
}

/// Counters gathered over an extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionStats {
    pub lines_read: usize,
    pub events: usize,
    pub malformed: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub endpoints: BTreeMap<String, usize>,
    pub methods: BTreeMap<String, usize>,
    users: HashSet<String>,
}

impl ExtractionStats {
    pub fn record_event(&mut self, event: &TrafficEvent) {
        self.events += 1;
        *self.endpoints.entry(event.endpoint.clone()).or_default() += 1;
        if let Some(method) = &event.method {
            *self.methods.entry(method.clone()).or_default() += 1;
        }
        if let Some(user) = &event.user_id {
            self.users.insert(user.clone());
        }
    }

    pub fn record_skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_default() += 1;
    }

    pub fn unique_users(&self) -> usize {
        self.users.len()
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}
