// Status taxonomy shared by the hotel, customer and reservation components.
// Every error kind maps to a stable numeric code so callers that speak the
// flat-file protocol can keep reporting the same values.

use std::fmt;

use crate::persistence::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    DuplicateCustomer,
    CustomerNotFound,
    // Registry write failures travel in `Durability`; the code stays in the table
    CustomerPersistenceFailure,
    CustomerInvalidField,
    DuplicateHotel,
    HotelNotFound,
    // Appended by `ReservationStatus::statuses` when the write-back failed
    HotelPersistenceFailure,
    HotelInvalidField,
    RoomNotFound,
    RoomNotAvailable,
    // Kept for code-table completeness; cancellation of an unheld range
    // reports RoomNotFound
    ReservationNotFound,
}

impl Status {
    pub const ALL: [Status; 12] = [
        Status::Ok,
        Status::DuplicateCustomer,
        Status::CustomerNotFound,
        Status::CustomerPersistenceFailure,
        Status::CustomerInvalidField,
        Status::DuplicateHotel,
        Status::HotelNotFound,
        Status::HotelPersistenceFailure,
        Status::HotelInvalidField,
        Status::RoomNotFound,
        Status::RoomNotAvailable,
        Status::ReservationNotFound,
    ];

    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::DuplicateCustomer => -101,
            Status::CustomerNotFound => -102,
            Status::CustomerPersistenceFailure => -109,
            Status::CustomerInvalidField => -110,
            Status::DuplicateHotel => -201,
            Status::HotelNotFound => -202,
            Status::HotelPersistenceFailure => -209,
            Status::HotelInvalidField => -210,
            Status::RoomNotFound => -220,
            Status::RoomNotAvailable => -230,
            Status::ReservationNotFound => -240,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.code() == code)
    }

    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::DuplicateCustomer => "Duplicate customer found.",
            Status::CustomerNotFound => "Customer not found.",
            Status::CustomerPersistenceFailure => "Error processing customer request.",
            Status::CustomerInvalidField => "Invalid field values.",
            Status::DuplicateHotel => "Duplicate hotel found.",
            Status::HotelNotFound => "Hotel not found.",
            Status::HotelPersistenceFailure => "Error processing hotel request.",
            Status::HotelInvalidField => "Invalid field values.",
            Status::RoomNotFound => "Room not found.",
            Status::RoomNotAvailable => "Room not available.",
            Status::ReservationNotFound => "Reservation not found.",
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

// Implemented by every component error so results can be reported as codes
pub trait StatusCode {
    fn status(&self) -> Status;
}

// Whether the write-back that follows an in-memory mutation reached the store.
// A failed write does not undo the mutation: the catalog keeps the new state
// and durability is simply unconfirmed.
#[derive(Debug)]
pub enum Durability {
    NotAttempted,
    Confirmed,
    Failed(PersistenceError),
}

impl Durability {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Durability::Confirmed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Durability::Failed(_))
    }

    pub fn error(&self) -> Option<&PersistenceError> {
        match self {
            Durability::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Result<(), PersistenceError>> for Durability {
    fn from(result: Result<(), PersistenceError>) -> Self {
        match result {
            Ok(()) => Durability::Confirmed,
            Err(err) => Durability::Failed(err),
        }
    }
}

// Primary result of an operation paired with the independent persistence
// outcome. The two are never folded into a single code.
#[derive(Debug)]
pub struct Outcome<T, E> {
    pub result: Result<T, E>,
    pub durability: Durability,
}

impl<T, E> Outcome<T, E> {
    pub fn new(result: Result<T, E>, durability: Durability) -> Self {
        Self { result, durability }
    }

    pub fn rejected(err: E) -> Self {
        Self::new(Err(err), Durability::NotAttempted)
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        Outcome {
            result: self.result.map(f),
            durability: self.durability,
        }
    }
}

impl<T, E: StatusCode> Outcome<T, E> {
    pub fn status(&self) -> Status {
        match &self.result {
            Ok(_) => Status::Ok,
            Err(err) => err.status(),
        }
    }
}
