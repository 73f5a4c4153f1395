use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_ASK_TIME_SECS: u32 = 10;
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// The two independent search sessions a client can run side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Stations,
    TrainCode,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Stations => "stations",
            SearchMode::TrainCode => "train_code",
        }
    }

    pub fn receive_path(self) -> &'static str {
        match self {
            SearchMode::Stations => "receive",
            SearchMode::TrainCode => "receive_by_code",
        }
    }

    pub fn stop_path(self) -> &'static str {
        match self {
            SearchMode::Stations => "stop",
            SearchMode::TrainCode => "stop_train_code",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seat classes in the order the backend reports their columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatClass {
    #[serde(rename = "商务座", alias = "businessClass")]
    Business,
    #[serde(rename = "特等座", alias = "specialClass")]
    Special,
    #[serde(rename = "一等座", alias = "firstClass")]
    First,
    #[serde(rename = "二等座", alias = "secondClass")]
    Second,
    #[serde(rename = "软卧", alias = "softSleeper")]
    SoftSleeper,
    #[serde(rename = "硬卧", alias = "hardSleeper")]
    HardSleeper,
    #[serde(rename = "硬座", alias = "hardSeat")]
    HardSeat,
    #[serde(rename = "无座", alias = "noSeat")]
    NoSeat,
}

impl SeatClass {
    pub const ALL: [SeatClass; 8] = [
        SeatClass::Business,
        SeatClass::Special,
        SeatClass::First,
        SeatClass::Second,
        SeatClass::SoftSleeper,
        SeatClass::HardSleeper,
        SeatClass::HardSeat,
        SeatClass::NoSeat,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SeatClass::Business => "商务座",
            SeatClass::Special => "特等座",
            SeatClass::First => "一等座",
            SeatClass::Second => "二等座",
            SeatClass::SoftSleeper => "软卧",
            SeatClass::HardSleeper => "硬卧",
            SeatClass::HardSeat => "硬座",
            SeatClass::NoSeat => "无座",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SeatClass::Business => "businessClass",
            SeatClass::Special => "specialClass",
            SeatClass::First => "firstClass",
            SeatClass::Second => "secondClass",
            SeatClass::SoftSleeper => "softSleeper",
            SeatClass::HardSleeper => "hardSleeper",
            SeatClass::HardSeat => "hardSeat",
            SeatClass::NoSeat => "noSeat",
        }
    }

    /// Sleeper and hard-seat classes only exist on conventional trains.
    pub fn is_conventional_only(self) -> bool {
        matches!(
            self,
            SeatClass::SoftSleeper | SeatClass::HardSleeper | SeatClass::HardSeat
        )
    }
}

impl fmt::Display for SeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SeatClass {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        SeatClass::ALL
            .into_iter()
            .find(|class| class.label() == raw || class.key().eq_ignore_ascii_case(raw))
            .ok_or_else(|| ValidationError::UnknownSeatClass(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Seats(u32),
    Available,
    SoldOut,
    Other(String),
}

impl Availability {
    /// Returns `None` for blank cells so callers never emit a zero-seat offer for them.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        Some(match raw {
            "有" => Availability::Available,
            "无" => Availability::SoldOut,
            _ => match raw.parse::<u32>() {
                Ok(count) => Availability::Seats(count),
                Err(_) => Availability::Other(raw.to_string()),
            },
        })
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Seats(count) => write!(f, "{count}"),
            Availability::Available => f.write_str("有"),
            Availability::SoldOut => f.write_str("无"),
            Availability::Other(token) => f.write_str(token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    HighSpeed,
    Conventional,
}

impl ServiceKind {
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim().eq_ignore_ascii_case("n") {
            ServiceKind::Conventional
        } else {
            ServiceKind::HighSpeed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketOffer {
    pub train_code: String,
    pub origin: String,
    pub destination: String,
    pub departs_at: String,
    pub arrives_at: String,
    pub duration: String,
    pub seat_class: SeatClass,
    pub availability: Availability,
    pub service: ServiceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Stations {
        departure: String,
        destination: String,
        high_speed: bool,
        strict_mode: bool,
    },
    TrainCode {
        train_code: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Travel date, `YYYY-MM-DD`.
    pub date: String,
    pub route: Route,
    pub seat_class: Option<SeatClass>,
    /// Backend polling interval; zero falls back to [`DEFAULT_ASK_TIME_SECS`].
    pub ask_time_secs: u32,
    pub student_ticket: bool,
    pub auto_monitor: bool,
}

impl SearchQuery {
    pub fn stations(
        date: impl Into<String>,
        departure: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            route: Route::Stations {
                departure: departure.into(),
                destination: destination.into(),
                high_speed: false,
                strict_mode: false,
            },
            seat_class: None,
            ask_time_secs: DEFAULT_ASK_TIME_SECS,
            student_ticket: false,
            auto_monitor: true,
        }
    }

    pub fn train_code(date: impl Into<String>, train_code: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            route: Route::TrainCode {
                train_code: train_code.into(),
            },
            seat_class: None,
            ask_time_secs: DEFAULT_ASK_TIME_SECS,
            student_ticket: false,
            auto_monitor: true,
        }
    }

    pub fn mode(&self) -> SearchMode {
        match self.route {
            Route::Stations { .. } => SearchMode::Stations,
            Route::TrainCode { .. } => SearchMode::TrainCode,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let date = self.date.trim();
        if date.is_empty() {
            return Err(ValidationError::MissingField("date"));
        }
        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| ValidationError::InvalidDate(date.to_string()))?;

        match &self.route {
            Route::Stations {
                departure,
                destination,
                ..
            } => {
                if departure.trim().is_empty() {
                    return Err(ValidationError::MissingField("departure"));
                }
                if destination.trim().is_empty() {
                    return Err(ValidationError::MissingField("destination"));
                }
            }
            Route::TrainCode { train_code } => {
                if train_code.trim().is_empty() {
                    return Err(ValidationError::MissingField("trainCode"));
                }
            }
        }

        Ok(())
    }

    pub fn normalized(mut self) -> Self {
        self.date = self.date.trim().to_string();
        if self.ask_time_secs == 0 {
            self.ask_time_secs = DEFAULT_ASK_TIME_SECS;
        }

        match &mut self.route {
            Route::Stations {
                departure,
                destination,
                ..
            } => {
                *departure = departure.trim().to_string();
                *destination = destination.trim().to_string();
                if self.seat_class.is_none() {
                    self.seat_class = Some(SeatClass::Second);
                }
            }
            Route::TrainCode { train_code } => {
                *train_code = train_code.trim().to_string();
            }
        }

        self
    }

    /// Request parameters for the receive endpoints, using the backend's field names.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("date", self.date.clone())];

        match &self.route {
            Route::Stations {
                departure,
                destination,
                high_speed,
                strict_mode,
            } => {
                pairs.push(("departure", departure.clone()));
                pairs.push(("destination", destination.clone()));
                pairs.push(("highSpeed", high_speed.to_string()));
                pairs.push(("studentTicket", self.student_ticket.to_string()));
                pairs.push(("askTime", self.ask_time_secs.to_string()));
                pairs.push(("strictmode", strict_mode.to_string()));
            }
            Route::TrainCode { train_code } => {
                pairs.push(("trainCode", train_code.clone()));
                pairs.push(("studentTicket", self.student_ticket.to_string()));
                pairs.push(("askTime", self.ask_time_secs.to_string()));
            }
        }

        if let Some(seat_class) = self.seat_class {
            pairs.push(("seatType", seat_class.label().to_string()));
        }
        pairs.push(("autoMonitor", self.auto_monitor.to_string()));
        pairs
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
