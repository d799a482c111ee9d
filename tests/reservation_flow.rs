// End-to-end flows over the JSON file store

use chrono::NaiveDate;
use hotel_inventory::{
    Clock, CustomerKey, CustomerRecord, CustomerRegistry, FixedClock, HotelCatalog,
    JsonFileStore, ReservationDesk, ReservationRequest, Status, StoreConfig,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const PRETORIA: &str = "Pretoria Deluxe";

struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "hotel-inventory-{}-{}-{}",
            name,
            std::process::id(),
            rand::random::<u32>()
        ));
        fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    fn store(&self) -> Arc<JsonFileStore> {
        let config = StoreConfig::default().with_data_dir(&self.dir);
        Arc::new(JsonFileStore::new(config).unwrap())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 2, 17).unwrap()))
}

fn jc_romo() -> CustomerRecord {
    CustomerRecord {
        names: "JC".to_string(),
        surname: "Romo".to_string(),
        id_doc_no: "ID660616185".to_string(),
        phone_no: "27832629691".to_string(),
        year_dob: 1966,
    }
}

fn open_desk(
    store: &Arc<JsonFileStore>,
) -> ReservationDesk<JsonFileStore, CustomerRegistry<JsonFileStore>> {
    let hotels = HotelCatalog::open(Arc::clone(store), clock()).unwrap();
    let customers = CustomerRegistry::open(Arc::clone(store)).unwrap();
    ReservationDesk::new(hotels, customers)
}

fn request(customer: &CustomerKey) -> ReservationRequest {
    ReservationRequest {
        hotel_name: PRETORIA.to_string(),
        customer_key: customer.clone(),
        room: 1,
        start_month: 1,
        start_day: 1,
        days: 5,
    }
}

#[test]
fn test_pretoria_deluxe_scenario() {
    let workspace = Workspace::new("scenario");
    let store = workspace.store();
    let mut desk = open_desk(&store);

    assert!(desk
        .hotels_mut()
        .create(PRETORIA, "125 Delmas Rd", 10)
        .durability
        .is_confirmed());
    let key = desk.customers_mut().create(jc_romo()).into_result().unwrap();
    let req = request(&key);

    assert_eq!(desk.create_reservation(&req).statuses(), vec![Status::Ok]);
    assert_eq!(
        desk.create_reservation(&req).statuses(),
        vec![Status::RoomNotAvailable]
    );
    assert_eq!(desk.cancel_reservation(&req).statuses(), vec![Status::Ok]);
    assert_eq!(
        desk.cancel_reservation(&req).statuses(),
        vec![Status::RoomNotFound]
    );

    assert!(store.data_path("hotel").exists());
    assert!(store.data_path("customer").exists());
    assert!(!store.is_locked("hotel").unwrap());
    assert!(!store.is_locked("customer").unwrap());
}

#[test]
fn test_reservation_survives_reopen() {
    let workspace = Workspace::new("reopen");
    let store = workspace.store();

    let key = {
        let mut desk = open_desk(&store);
        desk.hotels_mut()
            .create(PRETORIA, "125 Delmas Rd", 10)
            .into_result()
            .unwrap();
        let key = desk.customers_mut().create(jc_romo()).into_result().unwrap();
        assert!(desk.create_reservation(&request(&key)).is_success());
        key
    };

    let mut reopened = open_desk(&store);
    let grid = reopened.hotels().record(PRETORIA).unwrap().grid(2024).unwrap();
    assert_eq!(grid.occupied_count(), 5);
    assert_eq!(grid.occupant(1, 0).unwrap(), Some(&key));

    assert_eq!(
        reopened.create_reservation(&request(&key)).statuses(),
        vec![Status::RoomNotAvailable]
    );
}

#[test]
fn test_reads_reference_file_format() {
    let workspace = Workspace::new("format");
    let store = workspace.store();

    let free = serde_json::json!([false, ""]);
    let taken = serde_json::json!([true, "ID660616185|27832629691|1966"]);
    let mut room_one = vec![free.clone(); 366];
    room_one[0] = taken.clone();
    let room_two = vec![free; 366];
    let hotels = serde_json::json!({
        PRETORIA: { "address": "125 Delmas Rd", "rooms": 2, "2024": [room_one, room_two] }
    });
    fs::write(store.data_path("hotel"), hotels.to_string()).unwrap();

    let catalog = HotelCatalog::open(Arc::clone(&store), clock()).unwrap();
    let view = catalog.display(PRETORIA).unwrap();
    assert_eq!(view.rooms, 2);
    assert_eq!(view.address, "125 Delmas Rd");

    let grid = catalog.record(PRETORIA).unwrap().grid(2024).unwrap();
    assert_eq!(grid.occupied_count(), 1);
    assert_eq!(
        grid.occupant(1, 0).unwrap().map(CustomerKey::as_str),
        Some("ID660616185|27832629691|1966")
    );
}

#[test]
fn test_zero_room_hotel_is_invalid() {
    let workspace = Workspace::new("zero-rooms");
    let store = workspace.store();
    let mut catalog = HotelCatalog::open(Arc::clone(&store), clock()).unwrap();

    assert_eq!(
        catalog.create(PRETORIA, "125 Delmas Rd", 0).status(),
        Status::HotelInvalidField
    );
    assert!(!store.data_path("hotel").exists());
}

#[test]
fn test_unknown_hotel_touches_nothing() {
    let workspace = Workspace::new("unknown-hotel");
    let store = workspace.store();
    let mut desk = open_desk(&store);
    let key = desk.customers_mut().create(jc_romo()).into_result().unwrap();

    let status = desk.create_reservation(&request(&key));
    assert_eq!(
        status.statuses(),
        vec![Status::HotelNotFound, Status::Ok]
    );
    assert!(!store.data_path("hotel").exists());
}

#[test]
fn test_reload_sees_other_writer() {
    let workspace = Workspace::new("reload");
    let store = workspace.store();
    let mut reader = HotelCatalog::open(Arc::clone(&store), clock()).unwrap();

    let mut writer = HotelCatalog::open(Arc::clone(&store), clock()).unwrap();
    writer.create(PRETORIA, "125 Delmas Rd", 10).into_result().unwrap();

    assert!(reader.display(PRETORIA).is_err());
    reader.reload().unwrap();
    assert_eq!(reader.display(PRETORIA).unwrap().rooms, 10);
}
