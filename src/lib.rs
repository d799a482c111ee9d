// Hotel room inventory: per-hotel availability grids with atomic multi-day
// reservation and cancellation, backed by flat JSON record sets.

pub mod clock;
pub mod config;
pub mod customer;
pub mod grid;
pub mod hotel;
pub mod persistence;
pub mod reservation;
pub mod status;

// Re-export key types for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, StoreConfig};
pub use customer::{
    CustomerError, CustomerKey, CustomerLookup, CustomerPatch, CustomerRecord, CustomerRegistry,
    CUSTOMER_ENTITY,
};
pub use grid::{DaySlot, GridError, RoomCalendar, YearGrid, CALENDAR_DAYS};
pub use hotel::{
    CatalogError, HotelCatalog, HotelPatch, HotelRecord, HotelView, RoomStay, HOTEL_ENTITY,
};
pub use persistence::{InMemoryStore, JsonFileStore, PersistenceError, RecordStore};
pub use reservation::{ReservationDesk, ReservationRequest, ReservationStatus};
pub use status::{Durability, Outcome, Status, StatusCode};
