use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    domain::{Availability, Route, SearchMode, SearchQuery, SeatClass, ServiceKind, TicketOffer},
    error::PayloadError,
};

/// Sent by the backend when the requested route or train does not exist.
pub const NO_DATA_SENTINEL: &str = "__NO_DATA__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTicketRow {
    #[serde(default)]
    pub train_code: String,
    #[serde(default)]
    pub departure_station: String,
    #[serde(default)]
    pub destination_station: String,
    #[serde(default)]
    pub depart_time: String,
    #[serde(default)]
    pub arrive_time: String,
    #[serde(default)]
    pub during_time: String,
    #[serde(default)]
    pub hs: String,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub business_class: Option<String>,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub special_class: Option<String>,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub first_class: Option<String>,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub second_class: Option<String>,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub soft_sleeper: Option<String>,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub hard_sleeper: Option<String>,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub hard_seat: Option<String>,
    #[serde(default, deserialize_with = "seat_count", skip_serializing_if = "Option::is_none")]
    pub no_seat: Option<String>,
}

// Counts arrive as strings from the CSV-backed crawler but numbers show up too.
fn seat_count<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(raw),
        Some(other) => Some(other.to_string()),
    })
}

impl RawTicketRow {
    pub fn seat_count(&self, seat_class: SeatClass) -> Option<&str> {
        let count = match seat_class {
            SeatClass::Business => &self.business_class,
            SeatClass::Special => &self.special_class,
            SeatClass::First => &self.first_class,
            SeatClass::Second => &self.second_class,
            SeatClass::SoftSleeper => &self.soft_sleeper,
            SeatClass::HardSleeper => &self.hard_sleeper,
            SeatClass::HardSeat => &self.hard_seat,
            SeatClass::NoSeat => &self.no_seat,
        };
        count.as_deref()
    }

    /// One offer per seat class with a non-blank count on this row.
    pub fn offers(&self) -> Vec<TicketOffer> {
        let service = ServiceKind::from_flag(&self.hs);
        SeatClass::ALL
            .into_iter()
            .filter_map(|seat_class| {
                let availability = Availability::parse(self.seat_count(seat_class)?)?;
                Some(TicketOffer {
                    train_code: self.train_code.clone(),
                    origin: self.departure_station.clone(),
                    destination: self.destination_station.clone(),
                    departs_at: self.depart_time.clone(),
                    arrives_at: self.arrive_time.clone(),
                    duration: self.during_time.clone(),
                    seat_class,
                    availability,
                    service,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPayload {
    Batch(Vec<RawTicketRow>),
    NoRouteData,
    UpstreamError(String),
}

impl StreamPayload {
    /// Decodes one event's data. Blank events decode to `Ok(None)`.
    pub fn decode(data: &str) -> Result<Option<Self>, PayloadError> {
        let raw = data.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        if raw == NO_DATA_SENTINEL {
            return Ok(Some(StreamPayload::NoRouteData));
        }

        let payload = match serde_json::from_str::<Value>(raw)? {
            Value::Array(rows) => {
                StreamPayload::Batch(serde_json::from_value(Value::Array(rows))?)
            }
            Value::String(text) if text == NO_DATA_SENTINEL => StreamPayload::NoRouteData,
            Value::Object(object) => match object.get("error") {
                Some(Value::String(message)) => StreamPayload::UpstreamError(message.clone()),
                Some(Value::Null) | None => {
                    return Err(PayloadError::UnexpectedObject(raw.to_string()));
                }
                Some(other) => StreamPayload::UpstreamError(other.to_string()),
            },
            _ => return Err(PayloadError::UnexpectedShape(raw.to_string())),
        };

        Ok(Some(payload))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopStationRequest {
    pub departure: String,
    pub destination: String,
    pub date: String,
    pub student_ticket: bool,
    pub high_speed: bool,
    #[serde(rename = "strictmode")]
    pub strict_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTrainCodeRequest {
    pub train_code: String,
    pub date: String,
    pub student_ticket: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopRequest {
    Stations(StopStationRequest),
    TrainCode(StopTrainCodeRequest),
}

impl StopRequest {
    pub fn for_query(query: &SearchQuery) -> Self {
        match &query.route {
            Route::Stations {
                departure,
                destination,
                high_speed,
                strict_mode,
            } => StopRequest::Stations(StopStationRequest {
                departure: departure.clone(),
                destination: destination.clone(),
                date: query.date.clone(),
                student_ticket: query.student_ticket,
                high_speed: *high_speed,
                strict_mode: *strict_mode,
            }),
            Route::TrainCode { train_code } => StopRequest::TrainCode(StopTrainCodeRequest {
                train_code: train_code.clone(),
                date: query.date.clone(),
                student_ticket: query.student_ticket,
            }),
        }
    }

    pub fn mode(&self) -> SearchMode {
        match self {
            StopRequest::Stations(_) => SearchMode::Stations,
            StopRequest::TrainCode(_) => SearchMode::TrainCode,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    #[serde(default)]
    pub status: String,
}

impl StopResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
