// Room availability grid.
// A hotel keeps one `YearGrid` per calendar year: one `RoomCalendar` per room,
// each a fixed run of 366 day slots (day 366 is addressable in every year).
// Multi-day reservations and cancellations are applied as one unit: when a
// slot in the range conflicts, every slot already touched by the call is
// reverted in reverse order before the error is returned.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::customer::CustomerKey;
use crate::status::{Status, StatusCode};

pub const CALENDAR_DAYS: usize = 366;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("Room {room} not found (hotel has {room_count} rooms)")]
    RoomNotFound { room: usize, room_count: usize },

    #[error("No calendar allocated for year {0}")]
    YearNotAllocated(i32),

    #[error("Room {room} is not available on day index {day}")]
    RoomNotAvailable { room: usize, day: usize },

    #[error("Room {room} holds no reservation for this customer on day index {day}")]
    NothingToCancel { room: usize, day: usize },

    #[error("Day range starting at index {start} for {days} days is outside the calendar")]
    DayOutOfRange { start: usize, days: usize },

    #[error("Day range starting at index {start} for {days} days crosses the end of the year")]
    SpansYearBoundary { start: usize, days: usize },
}

impl StatusCode for GridError {
    fn status(&self) -> Status {
        match self {
            GridError::RoomNotFound { .. }
            | GridError::YearNotAllocated(_)
            | GridError::NothingToCancel { .. } => Status::RoomNotFound,
            GridError::RoomNotAvailable { .. } => Status::RoomNotAvailable,
            GridError::DayOutOfRange { .. } | GridError::SpansYearBoundary { .. } => {
                Status::HotelInvalidField
            }
        }
    }
}

// Persisted as `[occupied, occupant]`, with an empty occupant when free
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(bool, String)", into = "(bool, String)")]
pub struct DaySlot {
    occupant: Option<CustomerKey>,
}

impl DaySlot {
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn occupant(&self) -> Option<&CustomerKey> {
        self.occupant.as_ref()
    }

    fn occupy(&mut self, occupant: &CustomerKey) {
        self.occupant = Some(occupant.clone());
    }

    fn release(&mut self) {
        self.occupant = None;
    }
}

impl From<(bool, String)> for DaySlot {
    fn from((occupied, occupant): (bool, String)) -> Self {
        Self {
            occupant: occupied.then(|| CustomerKey::from(occupant)),
        }
    }
}

impl From<DaySlot> for (bool, String) {
    fn from(slot: DaySlot) -> Self {
        match slot.occupant {
            Some(key) => (true, key.as_str().to_string()),
            None => (false, String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DaySlot>", into = "Vec<DaySlot>")]
pub struct RoomCalendar {
    slots: Vec<DaySlot>,
}

impl Default for RoomCalendar {
    fn default() -> Self {
        Self {
            slots: vec![DaySlot::default(); CALENDAR_DAYS],
        }
    }
}

impl TryFrom<Vec<DaySlot>> for RoomCalendar {
    type Error = String;

    fn try_from(slots: Vec<DaySlot>) -> Result<Self, Self::Error> {
        if slots.len() != CALENDAR_DAYS {
            return Err(format!(
                "room calendar has {} day slots, expected {}",
                slots.len(),
                CALENDAR_DAYS
            ));
        }
        Ok(Self { slots })
    }
}

impl From<RoomCalendar> for Vec<DaySlot> {
    fn from(calendar: RoomCalendar) -> Self {
        calendar.slots
    }
}

impl RoomCalendar {
    pub fn slot(&self, day: usize) -> Option<&DaySlot> {
        self.slots.get(day)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearGrid {
    rooms: Vec<RoomCalendar>,
}

impl YearGrid {
    // All rooms free on every day
    pub fn new(room_count: usize) -> Self {
        Self {
            rooms: vec![RoomCalendar::default(); room_count],
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn calendar(&self, room: usize) -> Result<&RoomCalendar, GridError> {
        let room_count = self.rooms.len();
        room.checked_sub(1)
            .and_then(|index| self.rooms.get(index))
            .ok_or(GridError::RoomNotFound { room, room_count })
    }

    fn calendar_mut(&mut self, room: usize) -> Result<&mut RoomCalendar, GridError> {
        let room_count = self.rooms.len();
        room.checked_sub(1)
            .and_then(|index| self.rooms.get_mut(index))
            .ok_or(GridError::RoomNotFound { room, room_count })
    }

    pub fn occupied_count(&self) -> usize {
        self.rooms.iter().map(RoomCalendar::occupied_count).sum()
    }

    pub fn occupant(&self, room: usize, day: usize) -> Result<Option<&CustomerKey>, GridError> {
        check_range(day, 1)?;
        Ok(self.calendar(room)?.slots[day].occupant())
    }

    // True when no slot of the range is occupied
    pub fn is_available(&self, room: usize, start: usize, days: usize) -> Result<bool, GridError> {
        let calendar = self.calendar(room)?;
        check_range(start, days)?;
        Ok(calendar.slots[start..start + days]
            .iter()
            .all(|slot| !slot.is_occupied()))
    }

    // Marks `days` consecutive slots from `start` as held by `occupant`, or
    // leaves the calendar untouched and reports the first conflicting day.
    pub fn reserve(
        &mut self,
        room: usize,
        start: usize,
        days: usize,
        occupant: &CustomerKey,
    ) -> Result<(), GridError> {
        let calendar = self.calendar_mut(room)?;
        check_range(start, days)?;
        let end = start + days;

        let mut day = start;
        while day < end {
            if calendar.slots[day].is_occupied() {
                break;
            }
            calendar.slots[day].occupy(occupant);
            day += 1;
        }

        if day < end {
            for touched in (start..day).rev() {
                calendar.slots[touched].release();
            }
            debug!(room, start, days, conflict = day, rolled_back = day - start, "Reservation conflict");
            return Err(GridError::RoomNotAvailable { room, day });
        }

        debug!(room, start, days, occupant = %occupant, "Reserved room");
        Ok(())
    }

    // Frees the range only if every slot in it belongs to `occupant`;
    // partial overlaps are rejected, not partially cancelled.
    pub fn cancel(
        &mut self,
        room: usize,
        start: usize,
        days: usize,
        occupant: &CustomerKey,
    ) -> Result<(), GridError> {
        let calendar = self.calendar_mut(room)?;
        check_range(start, days)?;
        let end = start + days;

        let mut day = start;
        while day < end {
            if calendar.slots[day].occupant() != Some(occupant) {
                break;
            }
            calendar.slots[day].release();
            day += 1;
        }

        if day < end {
            for touched in (start..day).rev() {
                calendar.slots[touched].occupy(occupant);
            }
            debug!(room, start, days, mismatch = day, rolled_back = day - start, "Cancellation mismatch");
            return Err(GridError::NothingToCancel { room, day });
        }

        debug!(room, start, days, occupant = %occupant, "Cancelled reservation");
        Ok(())
    }
}

fn check_range(start: usize, days: usize) -> Result<(), GridError> {
    if days == 0 || start >= CALENDAR_DAYS {
        return Err(GridError::DayOutOfRange { start, days });
    }
    if start + days > CALENDAR_DAYS {
        return Err(GridError::SpansYearBoundary { start, days });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use test_case::test_case;

    fn guest() -> CustomerKey {
        CustomerKey::from("ID660616185|27832629691|1966")
    }

    fn other_guest() -> CustomerKey {
        CustomerKey::from("AB123|5551234|1980")
    }

    #[test]
    fn test_new_grid_is_free() {
        let grid = YearGrid::new(10);
        assert_eq!(grid.room_count(), 10);
        assert_eq!(grid.occupied_count(), 0);
        assert!(grid.is_available(10, 0, CALENDAR_DAYS).unwrap());
    }

    #[test]
    fn test_reserve_then_cancel() {
        let mut grid = YearGrid::new(10);

        grid.reserve(1, 0, 5, &guest()).unwrap();
        assert_eq!(grid.occupied_count(), 5);
        for day in 0..5 {
            assert_eq!(grid.occupant(1, day).unwrap(), Some(&guest()));
        }
        assert_eq!(grid.occupant(1, 5).unwrap(), None);

        grid.cancel(1, 0, 5, &guest()).unwrap();
        assert_eq!(grid.occupied_count(), 0);
        assert_eq!(grid, YearGrid::new(10));
    }

    #[test]
    fn test_reserve_twice_is_not_idempotent() {
        let mut grid = YearGrid::new(10);
        grid.reserve(1, 0, 5, &guest()).unwrap();
        let after_first = grid.clone();

        let result = grid.reserve(1, 0, 5, &guest());
        assert_eq!(result, Err(GridError::RoomNotAvailable { room: 1, day: 0 }));
        assert_eq!(grid, after_first);
    }

    #[test]
    fn test_conflict_in_middle_rolls_back() {
        let mut grid = YearGrid::new(3);
        grid.reserve(2, 10, 1, &other_guest()).unwrap();
        let before = grid.clone();

        // Days 5..=9 get marked before the scan hits day 10
        let result = grid.reserve(2, 5, 10, &guest());
        assert_eq!(result, Err(GridError::RoomNotAvailable { room: 2, day: 10 }));
        assert_eq!(grid, before);
        assert_eq!(grid.occupied_count(), 1);
        assert_eq!(grid.occupant(2, 10).unwrap(), Some(&other_guest()));
    }

    #[test]
    fn test_cancel_with_wrong_occupant_changes_nothing() {
        let mut grid = YearGrid::new(2);
        grid.reserve(1, 30, 4, &guest()).unwrap();
        let before = grid.clone();

        let result = grid.cancel(1, 30, 4, &other_guest());
        assert_eq!(result, Err(GridError::NothingToCancel { room: 1, day: 30 }));
        assert_eq!(grid, before);
    }

    #[test]
    fn test_partial_overlap_cancel_rolls_back() {
        let mut grid = YearGrid::new(2);
        grid.reserve(1, 30, 4, &guest()).unwrap();
        let before = grid.clone();

        // 30..=33 are ours, 34 is free
        let result = grid.cancel(1, 30, 6, &guest());
        assert_eq!(result, Err(GridError::NothingToCancel { room: 1, day: 34 }));
        assert_eq!(grid, before);
        assert_eq!(grid.occupied_count(), 4);
    }

    #[test]
    fn test_cancel_twice_fails() {
        let mut grid = YearGrid::new(1);
        grid.reserve(1, 0, 5, &guest()).unwrap();
        grid.cancel(1, 0, 5, &guest()).unwrap();

        let result = grid.cancel(1, 0, 5, &guest());
        assert_eq!(result.unwrap_err().status(), Status::RoomNotFound);
    }

    #[test_case(0; "room zero")]
    #[test_case(11; "one past the last room")]
    #[test_case(500; "far past the last room")]
    fn test_unknown_room(room: usize) {
        let mut grid = YearGrid::new(10);
        for (start, days) in [(0, 1), (100, 5), (365, 1), (400, 3)] {
            let result = grid.reserve(room, start, days, &guest());
            assert_eq!(
                result,
                Err(GridError::RoomNotFound {
                    room,
                    room_count: 10
                })
            );
        }
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test_case(0, 0, GridError::DayOutOfRange { start: 0, days: 0 }; "zero days")]
    #[test_case(366, 1, GridError::DayOutOfRange { start: 366, days: 1 }; "start past calendar")]
    #[test_case(360, 7, GridError::SpansYearBoundary { start: 360, days: 7 }; "crosses year end")]
    #[test_case(0, 367, GridError::SpansYearBoundary { start: 0, days: 367 }; "longer than a year")]
    fn test_bad_ranges(start: usize, days: usize, expected: GridError) {
        let mut grid = YearGrid::new(1);
        assert_eq!(grid.reserve(1, start, days, &guest()), Err(expected.clone()));
        assert_eq!(grid.cancel(1, start, days, &guest()), Err(expected));
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn test_last_day_is_addressable() {
        let mut grid = YearGrid::new(1);
        grid.reserve(1, 365, 1, &guest()).unwrap();
        grid.reserve(1, 0, 365, &other_guest()).unwrap();
        assert_eq!(grid.occupied_count(), CALENDAR_DAYS);
        assert!(!grid.is_available(1, 200, 1).unwrap());
    }

    #[test]
    fn test_rooms_are_independent() {
        let mut grid = YearGrid::new(3);
        grid.reserve(1, 0, 10, &guest()).unwrap();
        grid.reserve(2, 0, 10, &other_guest()).unwrap();

        assert_eq!(grid.calendar(1).unwrap().occupied_count(), 10);
        assert_eq!(grid.calendar(2).unwrap().occupied_count(), 10);
        assert_eq!(grid.calendar(3).unwrap().occupied_count(), 0);
    }

    #[test]
    fn test_failed_calls_preserve_occupied_count() {
        let mut rng = rand::thread_rng();
        let mut grid = YearGrid::new(4);
        let guests = [guest(), other_guest()];

        for _ in 0..2_000 {
            let room = rng.gen_range(1..=4);
            let start = rng.gen_range(0..CALENDAR_DAYS);
            let days = rng.gen_range(1..=(CALENDAR_DAYS - start).min(20));
            let occupant = &guests[rng.gen_range(0..guests.len())];
            let before = grid.clone();
            let count = grid.occupied_count();

            let result = if rng.gen_bool(0.6) {
                grid.reserve(room, start, days, occupant)
            } else {
                grid.cancel(room, start, days, occupant)
            };

            match result {
                Ok(()) => assert_ne!(grid, before),
                Err(_) => {
                    assert_eq!(grid.occupied_count(), count);
                    assert_eq!(grid, before);
                }
            }
        }
    }

    #[test]
    fn test_slot_wire_format() {
        let mut grid = YearGrid::new(1);
        grid.reserve(1, 0, 1, &guest()).unwrap();

        let json = serde_json::to_value(&grid).unwrap();
        assert_eq!(json[0][0], serde_json::json!([true, "ID660616185|27832629691|1966"]));
        assert_eq!(json[0][1], serde_json::json!([false, ""]));
        assert_eq!(json[0].as_array().unwrap().len(), CALENDAR_DAYS);

        let back: YearGrid = serde_json::from_value(json).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn test_short_calendar_is_rejected() {
        let json = serde_json::json!([[[false, ""], [true, "x"]]]);
        let result: Result<YearGrid, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
