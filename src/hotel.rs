// Hotel catalog: hotel records keyed by name, each carrying one availability
// grid per year. Every successful mutation writes the whole record set back
// through the store. A failed write is reported in the outcome's durability
// and the in-memory change stays applied.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::customer::CustomerKey;
use crate::grid::{GridError, YearGrid, CALENDAR_DAYS};
use crate::persistence::{PersistenceError, RecordStore};
use crate::status::{Durability, Outcome, Status, StatusCode};

pub const HOTEL_ENTITY: &str = "hotel";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid hotel field: {0}")]
    InvalidField(String),

    #[error("Duplicate hotel: {0}")]
    DuplicateHotel(String),

    #[error("Hotel not found: {0}")]
    HotelNotFound(String),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl StatusCode for CatalogError {
    fn status(&self) -> Status {
        match self {
            CatalogError::InvalidField(_) => Status::HotelInvalidField,
            CatalogError::DuplicateHotel(_) => Status::DuplicateHotel,
            CatalogError::HotelNotFound(_) => Status::HotelNotFound,
            CatalogError::Grid(e) => e.status(),
        }
    }
}

// Stored form. Year grids sit next to the scalar fields, keyed by the year:
// `{"address": .., "rooms": 10, "2024": [[[false, ""], ..], ..]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredHotel")]
pub struct HotelRecord {
    address: String,
    #[serde(rename = "rooms")]
    room_count: usize,
    #[serde(flatten)]
    calendars: BTreeMap<String, YearGrid>,
}

#[derive(Deserialize)]
struct StoredHotel {
    address: String,
    rooms: usize,
    #[serde(flatten)]
    calendars: BTreeMap<String, YearGrid>,
}

// Every year grid must hold exactly `rooms` calendars
impl TryFrom<StoredHotel> for HotelRecord {
    type Error = String;

    fn try_from(stored: StoredHotel) -> Result<Self, Self::Error> {
        if let Some((year, grid)) = stored
            .calendars
            .iter()
            .find(|(_, grid)| grid.room_count() != stored.rooms)
        {
            return Err(format!(
                "year {} has {} room calendars, expected {}",
                year,
                grid.room_count(),
                stored.rooms
            ));
        }
        Ok(Self {
            address: stored.address,
            room_count: stored.rooms,
            calendars: stored.calendars,
        })
    }
}

impl HotelRecord {
    pub fn new(address: impl Into<String>, room_count: usize, year: i32) -> Self {
        let mut calendars = BTreeMap::new();
        calendars.insert(year.to_string(), YearGrid::new(room_count));
        Self {
            address: address.into(),
            room_count,
            calendars,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn room_count(&self) -> usize {
        self.room_count
    }

    pub fn years(&self) -> impl Iterator<Item = &str> {
        self.calendars.keys().map(String::as_str)
    }

    pub fn grid(&self, year: i32) -> Result<&YearGrid, GridError> {
        self.calendars
            .get(&year.to_string())
            .ok_or(GridError::YearNotAllocated(year))
    }

    fn grid_mut(&mut self, year: i32) -> Result<&mut YearGrid, GridError> {
        self.calendars
            .get_mut(&year.to_string())
            .ok_or(GridError::YearNotAllocated(year))
    }

    fn check_room(&self, room: usize) -> Result<(), GridError> {
        if room == 0 || room > self.room_count {
            return Err(GridError::RoomNotFound {
                room,
                room_count: self.room_count,
            });
        }
        Ok(())
    }
}

// Public projection of a hotel, without the grids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelView {
    pub name: String,
    pub address: String,
    pub rooms: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotelPatch {
    pub address: Option<String>,
}

// A stay on one room of the current year, as given by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStay {
    pub room: usize,
    pub start_month: u32,
    pub start_day: u32,
    pub days: usize,
}

pub struct HotelCatalog<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    hotels: BTreeMap<String, HotelRecord>,
}

impl<S: RecordStore> HotelCatalog<S> {
    pub fn open(store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Self, PersistenceError> {
        let hotels: BTreeMap<String, HotelRecord> = store.load(HOTEL_ENTITY)?;
        info!(count = hotels.len(), "Loaded hotel catalog");
        Ok(Self {
            store,
            clock,
            hotels,
        })
    }

    // Re-reads the backing store. Between reloads the cache does not see
    // writes made by other processes.
    pub fn reload(&mut self) -> Result<(), PersistenceError> {
        self.hotels = self.store.load(HOTEL_ENTITY)?;
        debug!(count = self.hotels.len(), "Reloaded hotel catalog");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hotels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotels.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hotels.keys().map(String::as_str).collect()
    }

    pub fn record(&self, name: &str) -> Option<&HotelRecord> {
        self.hotels.get(name)
    }

    pub fn create(&mut self, name: &str, address: &str, rooms: usize) -> Outcome<(), CatalogError> {
        if let Err(e) = validate_text("name", name)
            .and_then(|_| validate_text("address", address))
            .and_then(|_| validate_rooms(rooms))
        {
            return Outcome::rejected(e);
        }
        if self.hotels.contains_key(name) {
            return Outcome::rejected(CatalogError::DuplicateHotel(name.to_string()));
        }

        let year = self.clock.year();
        self.hotels
            .insert(name.to_string(), HotelRecord::new(address, rooms, year));
        info!(hotel = name, rooms, year, "Created hotel");
        Outcome::new(Ok(()), self.persist())
    }

    pub fn delete(&mut self, name: &str) -> Outcome<(), CatalogError> {
        if self.hotels.remove(name).is_none() {
            return Outcome::rejected(CatalogError::HotelNotFound(name.to_string()));
        }
        info!(hotel = name, "Deleted hotel");
        Outcome::new(Ok(()), self.persist())
    }

    pub fn display(&self, name: &str) -> Result<HotelView, CatalogError> {
        self.hotels
            .get(name)
            .map(|record| view(name, record))
            .ok_or_else(|| CatalogError::HotelNotFound(name.to_string()))
    }

    // Merge-patch: only supplied fields change. An invalid supplied field
    // rejects the whole patch and the record keeps its previous values.
    pub fn modify(&mut self, name: &str, patch: HotelPatch) -> Outcome<HotelView, CatalogError> {
        if let Err(e) = validate_text("name", name) {
            return Outcome::rejected(e);
        }
        if let Some(address) = &patch.address {
            if let Err(e) = validate_text("address", address) {
                return Outcome::rejected(e);
            }
        }
        let Some(record) = self.hotels.get_mut(name) else {
            return Outcome::rejected(CatalogError::HotelNotFound(name.to_string()));
        };

        match patch.address {
            Some(address) if address != record.address => {
                record.address = address;
                let updated = view(name, record);
                info!(hotel = name, "Modified hotel");
                Outcome::new(Ok(updated), self.persist())
            }
            _ => Outcome::new(Ok(view(name, record)), Durability::NotAttempted),
        }
    }

    pub fn reserve_room(
        &mut self,
        name: &str,
        customer: &CustomerKey,
        stay: RoomStay,
    ) -> Outcome<(), CatalogError> {
        self.apply_stay(name, stay, |grid, room, start, days| {
            grid.reserve(room, start, days, customer)
        })
    }

    pub fn cancel_reservation(
        &mut self,
        name: &str,
        customer: &CustomerKey,
        stay: RoomStay,
    ) -> Outcome<(), CatalogError> {
        self.apply_stay(name, stay, |grid, room, start, days| {
            grid.cancel(room, start, days, customer)
        })
    }

    // Whether the whole stay is free, without reserving it
    pub fn availability(&self, name: &str, stay: RoomStay) -> Result<bool, CatalogError> {
        let (year, start) = self.resolve(stay)?;
        let record = self
            .hotels
            .get(name)
            .ok_or_else(|| CatalogError::HotelNotFound(name.to_string()))?;
        record.check_room(stay.room)?;
        Ok(record.grid(year)?.is_available(stay.room, start, stay.days)?)
    }

    fn apply_stay(
        &mut self,
        name: &str,
        stay: RoomStay,
        op: impl FnOnce(&mut YearGrid, usize, usize, usize) -> Result<(), GridError>,
    ) -> Outcome<(), CatalogError> {
        let (year, start) = match self.resolve(stay) {
            Ok(resolved) => resolved,
            Err(e) => return Outcome::rejected(e),
        };
        let Some(record) = self.hotels.get_mut(name) else {
            return Outcome::rejected(CatalogError::HotelNotFound(name.to_string()));
        };

        let result = record.check_room(stay.room).and_then(|()| {
            let grid = record.grid_mut(year)?;
            op(grid, stay.room, start, stay.days)
        });

        match result {
            Ok(()) => Outcome::new(Ok(()), self.persist()),
            Err(e) => {
                debug!(hotel = name, room = stay.room, error = %e, "Grid operation rejected");
                Outcome::rejected(e.into())
            }
        }
    }

    // Validates the stay and turns its start date into (year, 0-based day
    // of year) for the current year
    fn resolve(&self, stay: RoomStay) -> Result<(i32, usize), CatalogError> {
        if stay.room < 1 {
            return Err(CatalogError::InvalidField("room".to_string()));
        }
        if !(1..=12).contains(&stay.start_month) {
            return Err(CatalogError::InvalidField("start_month".to_string()));
        }
        if !(1..=31).contains(&stay.start_day) {
            return Err(CatalogError::InvalidField("start_day".to_string()));
        }
        if !(1..=CALENDAR_DAYS).contains(&stay.days) {
            return Err(CatalogError::InvalidField("days".to_string()));
        }

        let year = self.clock.year();
        let date = NaiveDate::from_ymd_opt(year, stay.start_month, stay.start_day)
            .ok_or_else(|| CatalogError::InvalidField("start date".to_string()))?;
        Ok((year, date.ordinal0() as usize))
    }

    fn persist(&self) -> Durability {
        let durability = Durability::from(self.store.update(HOTEL_ENTITY, &self.hotels));
        if let Some(e) = durability.error() {
            warn!(error = %e, "Hotel change applied in memory but not persisted");
        }
        durability
    }
}

fn view(name: &str, record: &HotelRecord) -> HotelView {
    HotelView {
        name: name.to_string(),
        address: record.address.clone(),
        rooms: record.room_count,
    }
}

fn validate_text(field: &str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        Err(CatalogError::InvalidField(field.to_string()))
    } else {
        Ok(())
    }
}

fn validate_rooms(rooms: usize) -> Result<(), CatalogError> {
    if rooms == 0 {
        Err(CatalogError::InvalidField("rooms".to_string()))
    } else {
        Ok(())
    }
}
