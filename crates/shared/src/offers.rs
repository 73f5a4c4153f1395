//! Grouping and classification of offers for the results view.

use std::collections::HashMap;

use crate::domain::{Availability, Route, SearchQuery, SeatClass, ServiceKind, TicketOffer};

const PLENTY_THRESHOLD: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityLevel {
    Plenty,
    Few,
    None,
}

impl AvailabilityLevel {
    pub fn of(availability: &Availability) -> Self {
        match availability {
            Availability::Available => AvailabilityLevel::Plenty,
            Availability::SoldOut => AvailabilityLevel::None,
            Availability::Seats(count) if *count > PLENTY_THRESHOLD => AvailabilityLevel::Plenty,
            Availability::Seats(0) => AvailabilityLevel::None,
            Availability::Seats(_) | Availability::Other(_) => AvailabilityLevel::Few,
        }
    }
}

/// All offers for one train: the row shown up front plus the collapsible rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainGroup {
    pub train_code: String,
    pub primary: TicketOffer,
    pub others: Vec<TicketOffer>,
}

impl TrainGroup {
    pub fn offer_count(&self) -> usize {
        self.others.len() + 1
    }

    pub fn is_collapsible(&self) -> bool {
        !self.others.is_empty()
    }
}

/// Groups offers by train in first-seen order. The primary offer is the selected
/// seat class when the train has one, otherwise the train's first offer.
pub fn group_by_train(offers: &[TicketOffer], selected: Option<SeatClass>) -> Vec<TrainGroup> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_train: HashMap<&str, Vec<&TicketOffer>> = HashMap::new();
    for offer in offers {
        let entry = by_train.entry(offer.train_code.as_str()).or_default();
        if entry.is_empty() {
            order.push(offer.train_code.as_str());
        }
        entry.push(offer);
    }

    order
        .into_iter()
        .filter_map(|train_code| {
            let mut tickets = by_train.remove(train_code)?;
            let primary_index = selected
                .and_then(|seat| tickets.iter().position(|offer| offer.seat_class == seat))
                .unwrap_or(0);
            let primary = tickets.remove(primary_index).clone();
            Some(TrainGroup {
                train_code: train_code.to_string(),
                primary,
                others: tickets.into_iter().cloned().collect(),
            })
        })
        .collect()
}

/// Hides high-speed trains when a conventional-only seat class was asked for
/// without the high-speed filter.
pub fn visible_offers<'a>(query: &SearchQuery, offers: &'a [TicketOffer]) -> Vec<&'a TicketOffer> {
    let conventional_only = match (&query.route, query.seat_class) {
        (Route::Stations { high_speed, .. }, Some(seat)) => {
            !high_speed && seat.is_conventional_only()
        }
        _ => false,
    };

    offers
        .iter()
        .filter(|offer| !conventional_only || offer.service == ServiceKind::Conventional)
        .collect()
}

#[cfg(test)]
#[path = "tests/offers_tests.rs"]
mod tests;
