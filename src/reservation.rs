// Reservation desk: checks that both the hotel and the customer exist, then
// hands the stay to the hotel catalog. When either check fails both
// statuses are returned so the caller can report them together.

use tracing::{info, warn};

use crate::customer::{CustomerKey, CustomerLookup};
use crate::hotel::{CatalogError, HotelCatalog, RoomStay};
use crate::persistence::RecordStore;
use crate::status::{Durability, Outcome, Status, StatusCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub hotel_name: String,
    pub customer_key: CustomerKey,
    // 1-based
    pub room: usize,
    pub start_month: u32,
    pub start_day: u32,
    pub days: usize,
}

impl ReservationRequest {
    pub fn stay(&self) -> RoomStay {
        RoomStay {
            room: self.room,
            start_month: self.start_month,
            start_day: self.start_day,
            days: self.days,
        }
    }
}

#[derive(Debug)]
pub enum ReservationStatus {
    // Both parties exist; carries the grid operation's outcome
    Completed(Outcome<(), CatalogError>),
    // At least one existence check failed; the grid was not touched
    Rejected { hotel: Status, customer: Status },
}

impl ReservationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ReservationStatus::Completed(outcome) if outcome.is_ok())
    }

    // `[grid]` for completed requests, followed by HotelPersistenceFailure
    // when the write-back failed; `[hotel, customer]` for rejected ones
    pub fn statuses(&self) -> Vec<Status> {
        match self {
            ReservationStatus::Completed(outcome) => {
                let mut statuses = vec![outcome.status()];
                if outcome.durability.is_failed() {
                    statuses.push(Status::HotelPersistenceFailure);
                }
                statuses
            }
            ReservationStatus::Rejected { hotel, customer } => vec![*hotel, *customer],
        }
    }

    pub fn codes(&self) -> Vec<i32> {
        self.statuses().into_iter().map(Status::code).collect()
    }

    // None when the request never reached the catalog
    pub fn durability(&self) -> Option<&Durability> {
        match self {
            ReservationStatus::Completed(outcome) => Some(&outcome.durability),
            ReservationStatus::Rejected { .. } => None,
        }
    }
}

pub struct ReservationDesk<S: RecordStore, C: CustomerLookup> {
    hotels: HotelCatalog<S>,
    customers: C,
}

impl<S: RecordStore, C: CustomerLookup> ReservationDesk<S, C> {
    pub fn new(hotels: HotelCatalog<S>, customers: C) -> Self {
        Self { hotels, customers }
    }

    pub fn hotels(&self) -> &HotelCatalog<S> {
        &self.hotels
    }

    pub fn hotels_mut(&mut self) -> &mut HotelCatalog<S> {
        &mut self.hotels
    }

    pub fn customers(&self) -> &C {
        &self.customers
    }

    pub fn customers_mut(&mut self) -> &mut C {
        &mut self.customers
    }

    pub fn into_parts(self) -> (HotelCatalog<S>, C) {
        (self.hotels, self.customers)
    }

    pub fn create_reservation(&mut self, request: &ReservationRequest) -> ReservationStatus {
        if let Err(rejected) = self.check_parties(request) {
            return rejected;
        }
        let outcome =
            self.hotels
                .reserve_room(&request.hotel_name, &request.customer_key, request.stay());
        info!(
            hotel = %request.hotel_name,
            customer = %request.customer_key,
            room = request.room,
            status = %outcome.status(),
            "Reservation processed"
        );
        ReservationStatus::Completed(outcome)
    }

    pub fn cancel_reservation(&mut self, request: &ReservationRequest) -> ReservationStatus {
        if let Err(rejected) = self.check_parties(request) {
            return rejected;
        }
        let outcome = self.hotels.cancel_reservation(
            &request.hotel_name,
            &request.customer_key,
            request.stay(),
        );
        info!(
            hotel = %request.hotel_name,
            customer = %request.customer_key,
            room = request.room,
            status = %outcome.status(),
            "Cancellation processed"
        );
        ReservationStatus::Completed(outcome)
    }

    // Both lookups always run so a caller sees every missing party at once
    fn check_parties(&self, request: &ReservationRequest) -> Result<(), ReservationStatus> {
        let hotel = match self.hotels.display(&request.hotel_name) {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        };
        let customer = match self.customers.display(&request.customer_key) {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        };

        if hotel.is_ok() && customer.is_ok() {
            return Ok(());
        }
        warn!(
            hotel = %request.hotel_name,
            customer = %request.customer_key,
            hotel_status = hotel.code(),
            customer_status = customer.code(),
            "Reservation rejected before reaching the grid"
        );
        Err(ReservationStatus::Rejected { hotel, customer })
    }
}
